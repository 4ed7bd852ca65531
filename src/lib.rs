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

//! Display backend letting crosvm draw onto surfaces presented by an Android app.
//!
//! The app hands its surfaces to a [`DisplayService`], which the VM process registers with the
//! virtualization service. The VM draws through the C interface in [`client`]. While the app is
//! in the background, frames go to a sink buffer so the VM never has to stop drawing.

#[cfg(target_os = "android")]
pub mod anw;
mod buffer;
pub mod client;
mod error;
mod registry;
mod service;
mod surface;
mod sync;
pub mod testing;
mod window;

pub use buffer::{
    copy_buffer, NativeWindowBuffer, PixelFormat, SinkBuffer, BYTES_PER_PIXEL, DISPLAY_FORMAT,
};
pub use error::DisplayError;
pub use registry::{
    virtualization_service, DisplayServiceRegistry, VirtualizationServiceInternal,
    VIRTUALIZATION_SERVICE_NAME,
};
pub use service::{
    DisplayService, ICrosvmAndroidDisplayService, ServiceResult, Status, SurfaceKind,
    SERVICE_SPECIFIC_ERROR,
};
pub use surface::AndroidDisplaySurface;
pub use window::NativeWindow;

const LOG_TAG: &str = "crosvm_android_display_client";
