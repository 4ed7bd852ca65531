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

use crate::buffer::{NativeWindowBuffer, PixelFormat};
use crate::error::DisplayError;

/// A window, backed by a buffer queue, that the producer draws into.
///
/// # Safety
///
/// A buffer returned by `lock` must stay valid for reads and writes of `len()` bytes until the
/// next `set_buffers_geometry` call or until the window is dropped, whichever comes first. Its
/// `width`, `height` and `stride` must describe that memory.
pub unsafe trait NativeWindow: Send {
    /// Returns false if the window can no longer be drawn to.
    fn is_valid(&self) -> bool;

    /// Changes the geometry of the buffers returned by subsequent `lock` calls.
    fn set_buffers_geometry(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DisplayError>;

    /// Dequeues the next buffer and maps it for CPU writes.
    fn lock(&mut self) -> Result<NativeWindowBuffer, DisplayError>;

    /// Unmaps the buffer returned by the last `lock` and queues it for display.
    fn unlock_and_post(&mut self) -> Result<(), DisplayError>;
}
