// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hand-off of a drawable surface between the window provider and the VM.

use crate::buffer::{copy_buffer, NativeWindowBuffer, SinkBuffer, DISPLAY_FORMAT};
use crate::error::DisplayError;
use crate::sync::Monitor;
use crate::window::NativeWindow;
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Rect {
    width: u32,
    height: u32,
}

/// Where the last locked buffer came from.
#[derive(Clone, Copy, Debug)]
enum LastBuffer {
    Sink,
    Window(NativeWindowBuffer),
}

struct SurfaceState {
    native_window: Option<Box<dyn NativeWindow>>,
    needs_configuring: bool,
    requested_dimensions: Option<Rect>,

    // Drawn onto while there is no native window, e.g. while the app is in the background. Its
    // content never reaches the screen.
    sink_buffer: SinkBuffer,

    // Buffer last handed out by `lock`.
    last_buffer: Option<LastBuffer>,

    // Copy of the last good frame, taken before the app goes to the background. It is drawn when
    // the app comes back to the foreground, until the VM emits a new frame.
    saved_frame_buffer: SinkBuffer,
}

// SAFETY: The raw pointer inside `last_buffer` refers either to memory of `native_window`, which
// moves with the state, or to nothing at all. It is only dereferenced with the mutex held.
unsafe impl Send for SurfaceState {}

impl SurfaceState {
    fn new() -> Self {
        Self {
            native_window: None,
            needs_configuring: true,
            requested_dimensions: None,
            sink_buffer: SinkBuffer::default(),
            last_buffer: None,
            saved_frame_buffer: SinkBuffer::default(),
        }
    }

    /// Returns the native window, applying the requested geometry to it if needed.
    fn configured_window(&mut self) -> Result<&mut Box<dyn NativeWindow>, DisplayError> {
        let window = self.native_window.as_mut().ok_or(DisplayError::SurfaceNotReady)?;
        if !window.is_valid() {
            return Err(DisplayError::InvalidWindow);
        }
        if self.needs_configuring {
            let dims = self.requested_dimensions.ok_or(DisplayError::NotConfigured)?;
            // Ensure locked buffers have our desired format.
            window.set_buffers_geometry(dims.width, dims.height, DISPLAY_FORMAT)?;
            self.needs_configuring = false;
            // Buffers of the old geometry may have been freed.
            if let Some(LastBuffer::Window(_)) = self.last_buffer {
                self.last_buffer = None;
            }
        }
        Ok(window)
    }

    fn replace_window(&mut self, window: Option<Box<dyn NativeWindow>>) {
        // Buffers of the old window are gone with it.
        if let Some(LastBuffer::Window(_)) = self.last_buffer {
            self.last_buffer = None;
        }
        self.native_window = window;
    }
}

/// Wrapper which contains the latest available native window from the display service, if
/// available.
///
/// A window may not always be available if, for example, the app on the other end of the display
/// service is not in the foreground. Drawing then goes to a sink buffer instead.
pub struct AndroidDisplaySurface {
    name: String,
    state: Monitor<SurfaceState>,
}

impl AndroidDisplaySurface {
    /// Creates an unconfigured surface without a native window.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), state: Monitor::new(SurfaceState::new()) }
    }

    /// Name used in log and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs `window` as the native window, replacing the current one.
    pub fn set_native_surface(&self, window: Box<dyn NativeWindow>) {
        {
            let mut state = self.state.lock();
            state.replace_window(Some(window));
            state.needs_configuring = true;
        }
        info!("Native surface set for {}", self.name);
        self.state.notify_all();
    }

    /// Drops the native window. Subsequent draws go to the sink buffer.
    pub fn remove_surface(&self) {
        self.state.lock().replace_window(None);
        info!("Native surface removed from {}", self.name);
        self.state.notify_all();
    }

    /// Returns true if a native window is installed.
    pub fn has_native_surface(&self) -> bool {
        self.state.lock().native_window.is_some()
    }

    /// Sets the dimensions of the buffers handed out by `lock`.
    pub fn configure(&self, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.lock();

        state
            .sink_buffer
            .configure(width, height, DISPLAY_FORMAT as i32)
            .context("Failed to configure sink buffer")?;
        state
            .saved_frame_buffer
            .configure(width, height, DISPLAY_FORMAT as i32)
            .context("Failed to configure saved frame buffer")?;

        state.requested_dimensions = Some(Rect { width, height });
        state.needs_configuring = true;
        debug!("Configured {} to {width}x{height}", self.name);
        Ok(())
    }

    /// Blocks until a native window is installed.
    pub fn wait_for_native_surface(&self) {
        let _state = self.state.wait_while(|state| state.native_window.is_none());
    }

    /// Like `wait_for_native_surface`, but gives up after `timeout`. Returns whether a native
    /// window is installed.
    pub fn wait_for_native_surface_timeout(&self, timeout: Duration) -> bool {
        let (_state, timed_out) =
            self.state.wait_timeout_while(timeout, |state| state.native_window.is_none());
        !timed_out
    }

    /// Returns a buffer to draw the next frame onto.
    pub fn lock(&self) -> Result<NativeWindowBuffer> {
        let mut state = self.state.lock();
        let state = &mut *state;

        if state.requested_dimensions.is_none() {
            return Err(DisplayError::NotConfigured.into());
        }

        if state.native_window.is_none() {
            // Surface not currently available but not necessarily an error if, for example, the
            // app is not in the foreground.
            state.last_buffer = Some(LastBuffer::Sink);
            return Ok(state.sink_buffer.buffer());
        }

        let buffer = state.configured_window()?.lock()?;
        state.last_buffer = Some(LastBuffer::Window(buffer));
        Ok(buffer)
    }

    /// Posts the buffer returned by the last `lock` to the screen.
    pub fn unlock_and_post(&self) -> Result<()> {
        let mut state = self.state.lock();

        let Some(window) = state.native_window.as_deref_mut() else {
            // Nothing to post while in the background.
            return Ok(());
        };
        if !window.is_valid() {
            return Err(DisplayError::InvalidWindow.into());
        }
        window.unlock_and_post()?;
        Ok(())
    }

    /// Saves the last frame drawn.
    pub fn save_frame(&self) -> Result<()> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let from = match state.last_buffer.ok_or(DisplayError::NoFrame)? {
            LastBuffer::Sink => state.sink_buffer.buffer(),
            LastBuffer::Window(buffer) => buffer,
        };
        let to = state.saved_frame_buffer.buffer();
        // SAFETY: `to` is owned by this surface. `from` is either owned too, or belongs to the
        // installed window (window buffers are forgotten as soon as the window is replaced).
        unsafe { copy_buffer(&from, &to) }.context("Failed to copy frame")?;
        debug!("Saved frame of {}", self.name);
        Ok(())
    }

    /// Draws the saved frame onto the native window.
    pub fn draw_saved_frame(&self) -> Result<()> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let from = state.saved_frame_buffer.buffer();
        let window = state.configured_window()?;
        let buffer = window.lock()?;

        // SAFETY: `from` is owned by this surface and `buffer` was just locked on the window.
        let copied = unsafe { copy_buffer(&from, &buffer) };

        // Post even if the copy failed, so the window doesn't stay locked.
        window.unlock_and_post()?;
        copied.context("Failed to copy frame")?;
        debug!("Drew saved frame of {}", self.name);
        Ok(())
    }
}
