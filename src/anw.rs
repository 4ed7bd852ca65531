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

//! `NativeWindow` backed by an NDK `ANativeWindow`.

use crate::buffer::{NativeWindowBuffer, PixelFormat};
use crate::error::DisplayError;
use crate::window::NativeWindow;
use std::os::raw::c_void;
use std::ptr::{self, NonNull};

/// Opaque NDK window type.
#[repr(C)]
pub struct ANativeWindow {
    _private: [u8; 0],
}

#[link(name = "android")]
extern "C" {
    fn ANativeWindow_acquire(window: *mut ANativeWindow);
    fn ANativeWindow_release(window: *mut ANativeWindow);
    fn ANativeWindow_setBuffersGeometry(
        window: *mut ANativeWindow,
        width: i32,
        height: i32,
        format: i32,
    ) -> i32;
    fn ANativeWindow_lock(
        window: *mut ANativeWindow,
        out_buffer: *mut NativeWindowBuffer,
        in_out_dirty_bounds: *mut c_void,
    ) -> i32;
    fn ANativeWindow_unlockAndPost(window: *mut ANativeWindow) -> i32;
}

/// Owns one reference to an `ANativeWindow`.
pub struct AndroidNativeWindow(NonNull<ANativeWindow>);

// SAFETY: ANativeWindow is reference counted and its functions may be called from any thread.
unsafe impl Send for AndroidNativeWindow {}

impl AndroidNativeWindow {
    /// Takes ownership of a reference to `window`. Returns `None` if `window` is null.
    ///
    /// # Safety
    ///
    /// `window` must be null or a valid `ANativeWindow` whose reference is transferred to the
    /// returned object.
    pub unsafe fn from_raw(window: *mut ANativeWindow) -> Option<Self> {
        NonNull::new(window).map(Self)
    }

    /// Acquires a new reference to `window`. Returns `None` if `window` is null.
    ///
    /// # Safety
    ///
    /// `window` must be null or a valid `ANativeWindow`.
    pub unsafe fn acquire(window: *mut ANativeWindow) -> Option<Self> {
        let window = NonNull::new(window)?;
        // SAFETY: The caller guarantees that `window` is valid. The new reference is released
        // when the returned object is dropped.
        unsafe { ANativeWindow_acquire(window.as_ptr()) };
        Some(Self(window))
    }
}

impl Drop for AndroidNativeWindow {
    fn drop(&mut self) {
        // SAFETY: We own one reference to the window.
        unsafe { ANativeWindow_release(self.0.as_ptr()) };
    }
}

fn to_i32(value: u32) -> Result<i32, DisplayError> {
    i32::try_from(value).map_err(|_| DisplayError::SetBuffersGeometry(-libc::EINVAL))
}

// SAFETY: The NDK only guarantees that a locked buffer is mapped until
// `ANativeWindow_unlockAndPost`. Reading a posted buffer back, as `save_frame` does, relies on the
// platform keeping queued buffers mapped while we hold a reference to the window and its geometry
// is unchanged.
unsafe impl NativeWindow for AndroidNativeWindow {
    fn is_valid(&self) -> bool {
        // Null windows are rejected by the constructors.
        true
    }

    fn set_buffers_geometry(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DisplayError> {
        let (width, height) = (to_i32(width)?, to_i32(height)?);
        // SAFETY: The window is valid while we hold a reference to it.
        let ret = unsafe {
            ANativeWindow_setBuffersGeometry(self.0.as_ptr(), width, height, format as i32)
        };
        match ret {
            0 => Ok(()),
            status => Err(DisplayError::SetBuffersGeometry(status)),
        }
    }

    fn lock(&mut self) -> Result<NativeWindowBuffer, DisplayError> {
        let mut buffer = NativeWindowBuffer::default();
        // SAFETY: The window is valid, `buffer` is valid for writes and the dirty bounds are
        // optional.
        let ret = unsafe { ANativeWindow_lock(self.0.as_ptr(), &mut buffer, ptr::null_mut()) };
        match ret {
            0 => Ok(buffer),
            status => Err(DisplayError::Lock(status)),
        }
    }

    fn unlock_and_post(&mut self) -> Result<(), DisplayError> {
        // SAFETY: The window is valid while we hold a reference to it.
        let ret = unsafe { ANativeWindow_unlockAndPost(self.0.as_ptr()) };
        match ret {
            0 => Ok(()),
            status => Err(DisplayError::UnlockAndPost(status)),
        }
    }
}
