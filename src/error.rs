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

use thiserror::Error;

/// An error from the display backend.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DisplayError {
    /// The requested pixel format is not the one the display uses.
    #[error("Pixel format {0} is not BGRA_8888.")]
    UnsupportedPixelFormat(i32),
    /// The requested dimensions don't fit in memory.
    #[error("Buffer of {width}x{height} is too large.")]
    DimensionOverflow {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },
    /// Source and destination of a copy have different dimensions.
    #[error("dimension mismatch. from={from:?} to={to:?}")]
    DimensionMismatch {
        /// Width and height of the source buffer.
        from: (i32, i32),
        /// Width and height of the destination buffer.
        to: (i32, i32),
    },
    /// The surface has not been configured yet.
    #[error("Surface dimension is not configured yet!")]
    NotConfigured,
    /// There is no native surface to draw to.
    #[error("Surface not ready")]
    SurfaceNotReady,
    /// Nothing has been drawn since the surface was configured or its window went away.
    #[error("No frame has been drawn yet")]
    NoFrame,
    /// The native surface doesn't hold a usable window.
    #[error("Failed to get ANativeWindow")]
    InvalidWindow,
    /// `ANativeWindow_setBuffersGeometry` failed.
    #[error("Failed to set buffer geometry. (status {0})")]
    SetBuffersGeometry(i32),
    /// `ANativeWindow_lock` failed.
    #[error("Failed to lock window. (status {0})")]
    Lock(i32),
    /// `ANativeWindow_unlockAndPost` failed.
    #[error("Failed to unlock and post window. (status {0})")]
    UnlockAndPost(i32),
}
