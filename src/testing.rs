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

//! Test doubles for code that hands native windows to a display surface.

use crate::buffer::{NativeWindowBuffer, PixelFormat, BYTES_PER_PIXEL};
use crate::error::DisplayError;
use crate::window::NativeWindow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct FakeWindowState {
    bits: Vec<u8>,
    width: u32,
    height: u32,
    stride_padding: u32,
    locked: bool,
    geometry_calls: usize,
    posted_frames: Vec<Vec<u8>>,
    invalid: bool,
    fail_set_buffers_geometry: bool,
    fail_lock: bool,
    fail_unlock_and_post: bool,
}

impl FakeWindowState {
    fn stride(&self) -> u32 {
        self.width + self.stride_padding
    }

    fn row_len(&self) -> usize {
        self.stride() as usize * BYTES_PER_PIXEL
    }

    // Content of the buffer without the padding at the end of each row.
    fn packed(&self) -> Vec<u8> {
        let line = self.width as usize * BYTES_PER_PIXEL;
        (0..self.height as usize)
            .flat_map(|h| &self.bits[h * self.row_len()..h * self.row_len() + line])
            .copied()
            .collect()
    }
}

/// An in-memory `NativeWindow` with a single buffer.
///
/// Clones share the same window, so a test can keep a clone to inspect what was posted after
/// handing the window over to a surface.
#[derive(Clone, Debug, Default)]
pub struct FakeNativeWindow {
    state: Arc<Mutex<FakeWindowState>>,
}

impl FakeNativeWindow {
    /// Creates a window whose buffers are tightly packed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a window whose rows are `padding` pixels longer than its width.
    pub fn with_stride_padding(padding: u32) -> Self {
        let window = Self::default();
        window.state().stride_padding = padding;
        window
    }

    fn state(&self) -> MutexGuard<'_, FakeWindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Geometry set by the last `set_buffers_geometry`.
    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state();
        (state.width, state.height)
    }

    /// Number of successful `set_buffers_geometry` calls.
    pub fn geometry_calls(&self) -> usize {
        self.state().geometry_calls
    }

    /// Every frame posted so far, in order, without row padding.
    pub fn posted_frames(&self) -> Vec<Vec<u8>> {
        self.state().posted_frames.clone()
    }

    /// Makes `is_valid` return false from now on.
    pub fn invalidate(&self) {
        self.state().invalid = true;
    }

    /// Makes `set_buffers_geometry` fail.
    pub fn fail_set_buffers_geometry(&self, fail: bool) {
        self.state().fail_set_buffers_geometry = fail;
    }

    /// Makes `lock` fail.
    pub fn fail_lock(&self, fail: bool) {
        self.state().fail_lock = fail;
    }

    /// Makes `unlock_and_post` fail.
    pub fn fail_unlock_and_post(&self, fail: bool) {
        self.state().fail_unlock_and_post = fail;
    }
}

// SAFETY: The buffer handed out by `lock` lives in `bits`, which is only reallocated by
// `set_buffers_geometry` and is kept alive by every clone of the window.
unsafe impl NativeWindow for FakeNativeWindow {
    fn is_valid(&self) -> bool {
        !self.state().invalid
    }

    fn set_buffers_geometry(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DisplayError> {
        let mut state = self.state();
        if state.fail_set_buffers_geometry || format != PixelFormat::Bgra8888 {
            return Err(DisplayError::SetBuffersGeometry(-libc::EINVAL));
        }
        state.width = width;
        state.height = height;
        let len = state.row_len() * height as usize;
        state.bits = vec![0; len];
        state.geometry_calls += 1;
        Ok(())
    }

    fn lock(&mut self) -> Result<NativeWindowBuffer, DisplayError> {
        let mut state = self.state();
        if state.fail_lock || state.locked {
            return Err(DisplayError::Lock(-libc::EINVAL));
        }
        state.locked = true;
        Ok(NativeWindowBuffer {
            width: state.width as i32,
            height: state.height as i32,
            stride: state.stride() as i32,
            format: PixelFormat::Bgra8888 as i32,
            bits: state.bits.as_mut_ptr().cast(),
            reserved: [0; 6],
        })
    }

    fn unlock_and_post(&mut self) -> Result<(), DisplayError> {
        let mut state = self.state();
        if state.fail_unlock_and_post || !state.locked {
            return Err(DisplayError::UnlockAndPost(-libc::EINVAL));
        }
        state.locked = false;
        let frame = state.packed();
        state.posted_frames.push(frame);
        Ok(())
    }
}
