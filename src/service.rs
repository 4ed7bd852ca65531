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

//! Display service through which the app presents its surfaces to the VM.

use crate::surface::AndroidDisplaySurface;
use crate::window::NativeWindow;
use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use log::{error, info};
use std::fs::File;
use std::io::Write;
use std::os::fd::BorrowedFd;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Error code of every service-specific error returned by the display service.
pub const SERVICE_SPECIFIC_ERROR: i32 = -1;

/// A service-specific error, as carried over binder.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Service-specific error {code}: {message}")]
pub struct Status {
    /// Error code defined by the service.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl Status {
    /// Creates a service-specific error.
    pub fn new_service_specific_error(code: i32, message: String) -> Self {
        Self { code, message }
    }
}

/// Result of a display service call.
pub type ServiceResult<T> = std::result::Result<T, Status>;

/// Which of the two display surfaces a call is about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurfaceKind {
    /// The main display.
    Scanout,
    /// The mouse cursor, composed over the scanout.
    Cursor,
}

impl SurfaceKind {
    /// Decodes the `forCursor` flag used across process boundaries.
    pub fn from_cursor_flag(for_cursor: bool) -> Self {
        if for_cursor { Self::Cursor } else { Self::Scanout }
    }
}

/// Interface the app uses to hand its surfaces to the VM.
pub trait ICrosvmAndroidDisplayService: Send + Sync {
    /// Installs `surface` as the native window of the scanout or cursor surface.
    fn set_surface(&self, surface: Box<dyn NativeWindow>, for_cursor: bool) -> ServiceResult<()>;

    /// Removes the native window of the scanout or cursor surface.
    fn remove_surface(&self, for_cursor: bool) -> ServiceResult<()>;

    /// Sets the stream to which cursor positions are written. The descriptor is duplicated.
    fn set_cursor_stream(&self, stream: BorrowedFd) -> ServiceResult<()>;

    /// Saves the last frame of the scanout or cursor surface.
    fn save_frame_for_surface(&self, for_cursor: bool) -> ServiceResult<()>;

    /// Draws the saved frame onto the scanout or cursor surface.
    fn draw_saved_frame_for_surface(&self, for_cursor: bool) -> ServiceResult<()>;
}

fn service_specific_error(err: anyhow::Error, what: &str) -> Status {
    let message = format!("{what}: {err:#}");
    error!("{message}");
    Status::new_service_specific_error(SERVICE_SPECIFIC_ERROR, message)
}

/// Owns the scanout and cursor surfaces of one display.
pub struct DisplayService {
    scanout: AndroidDisplaySurface,
    cursor: AndroidDisplaySurface,
    cursor_stream: Mutex<Option<File>>,
}

impl Default for DisplayService {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayService {
    /// Creates a display service with two unconfigured surfaces.
    pub fn new() -> Self {
        Self {
            scanout: AndroidDisplaySurface::new("scanout"),
            cursor: AndroidDisplaySurface::new("cursor"),
            cursor_stream: Mutex::new(None),
        }
    }

    /// Returns the surface of the given kind.
    pub fn surface(&self, kind: SurfaceKind) -> &AndroidDisplaySurface {
        match kind {
            SurfaceKind::Scanout => &self.scanout,
            SurfaceKind::Cursor => &self.cursor,
        }
    }

    /// Returns true if a cursor stream has been set.
    pub fn has_cursor_stream(&self) -> bool {
        self.cursor_stream.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Writes the cursor position to the cursor stream, as two little-endian `u32`s.
    pub fn set_cursor_position(&self, x: u32, y: u32) -> Result<()> {
        let guard = self.cursor_stream.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stream: &File = guard.as_ref().ok_or_else(|| anyhow!("Invalid fd"))?;

        let mut pos = Vec::with_capacity(8);
        pos.write_u32::<LittleEndian>(x)?;
        pos.write_u32::<LittleEndian>(y)?;
        stream.write_all(&pos).context("Failed to write cursor position")
    }
}

impl ICrosvmAndroidDisplayService for DisplayService {
    fn set_surface(&self, surface: Box<dyn NativeWindow>, for_cursor: bool) -> ServiceResult<()> {
        self.surface(SurfaceKind::from_cursor_flag(for_cursor)).set_native_surface(surface);
        Ok(())
    }

    fn remove_surface(&self, for_cursor: bool) -> ServiceResult<()> {
        self.surface(SurfaceKind::from_cursor_flag(for_cursor)).remove_surface();
        Ok(())
    }

    fn set_cursor_stream(&self, stream: BorrowedFd) -> ServiceResult<()> {
        let stream = stream
            .try_clone_to_owned()
            .context("Failed to duplicate cursor stream")
            .map_err(|e| service_specific_error(e, "Failed to set cursor stream"))?;
        *self.cursor_stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream.into());
        info!("Cursor stream set");
        Ok(())
    }

    fn save_frame_for_surface(&self, for_cursor: bool) -> ServiceResult<()> {
        self.surface(SurfaceKind::from_cursor_flag(for_cursor))
            .save_frame()
            .map_err(|e| service_specific_error(e, "Failed to save frame"))
    }

    fn draw_saved_frame_for_surface(&self, for_cursor: bool) -> ServiceResult<()> {
        self.surface(SurfaceKind::from_cursor_flag(for_cursor))
            .draw_saved_frame()
            .map_err(|e| service_specific_error(e, "Failed to draw saved frame"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNativeWindow;
    use std::io::Read;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn calls_are_routed_by_cursor_flag() {
        let service = DisplayService::new();
        service.set_surface(Box::new(FakeNativeWindow::new()), true).unwrap();
        assert!(service.surface(SurfaceKind::Cursor).has_native_surface());
        assert!(!service.surface(SurfaceKind::Scanout).has_native_surface());

        service.set_surface(Box::new(FakeNativeWindow::new()), false).unwrap();
        service.remove_surface(true).unwrap();
        assert!(!service.surface(SurfaceKind::Cursor).has_native_surface());
        assert!(service.surface(SurfaceKind::Scanout).has_native_surface());
    }

    #[test]
    fn save_and_draw_saved_frame() {
        let service = DisplayService::new();
        let scanout = service.surface(SurfaceKind::Scanout);
        scanout.configure(2, 2).unwrap();
        let buffer = scanout.lock().unwrap();
        // SAFETY: The sink buffer is not used by anything else until the next lock.
        unsafe { buffer.as_mut_slice() }.fill(0x7f);
        scanout.unlock_and_post().unwrap();
        service.save_frame_for_surface(false).unwrap();

        let window = FakeNativeWindow::new();
        service.set_surface(Box::new(window.clone()), false).unwrap();
        service.draw_saved_frame_for_surface(false).unwrap();
        assert_eq!(window.posted_frames(), vec![vec![0x7f; 16]]);
    }

    #[test]
    fn failures_become_service_specific_errors() {
        let service = DisplayService::new();
        let status = service.save_frame_for_surface(true).unwrap_err();
        assert_eq!(status.code, SERVICE_SPECIFIC_ERROR);
        assert_eq!(status.message, "Failed to save frame: No frame has been drawn yet");

        let status = service.draw_saved_frame_for_surface(false).unwrap_err();
        assert_eq!(status.code, SERVICE_SPECIFIC_ERROR);
        assert_eq!(status.message, "Failed to draw saved frame: Surface not ready");
    }

    #[test]
    fn cursor_position_is_written_to_stream() {
        let service = DisplayService::new();
        assert!(service.set_cursor_position(1, 2).is_err());

        let (mut reader, writer) = UnixStream::pair().unwrap();
        service.set_cursor_stream(writer.as_fd()).unwrap();
        // The service keeps its own copy of the descriptor.
        drop(writer);
        assert!(service.has_cursor_stream());

        service.set_cursor_position(0x10, 0x0203).unwrap();
        let mut pos = [0u8; 8];
        reader.read_exact(&mut pos).unwrap();
        assert_eq!(pos, [0x10, 0, 0, 0, 0x03, 0x02, 0, 0]);
    }
}
