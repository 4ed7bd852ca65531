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

//! C interface used by crosvm's Android display backend.
//!
//! Failures are never returned to the caller as faults. They are reported through the error
//! callback the caller supplied when creating the context.

use crate::buffer::NativeWindowBuffer;
use crate::registry::{virtualization_service, DisplayServiceRegistry, VIRTUALIZATION_SERVICE_NAME};
use crate::service::{DisplayService, SurfaceKind};
use crate::surface::AndroidDisplaySurface;
use crate::LOG_TAG;
use log::{error, info, LevelFilter};
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

/// Callback receiving a NUL-terminated, human-readable error message.
pub type ErrorCallback = Option<unsafe extern "C" fn(message: *const c_char)>;

/// Make sure our logging goes to logcat. It is harmless to call this more than once.
fn initialize_logging() {
    android_logger::init_once(
        android_logger::Config::default().with_tag(LOG_TAG).with_max_level(LevelFilter::Info),
    );
}

/// Connection between one VM display and the app presenting it.
pub struct AndroidDisplayContext {
    virt_service: Option<Arc<dyn DisplayServiceRegistry>>,
    disp_service: Option<Arc<DisplayService>>,
    error_callback: ErrorCallback,
}

impl AndroidDisplayContext {
    /// Creates a display service and registers it with `virt_service`, so that the app can find
    /// it. On failure, the error is reported and the context is left without a display service.
    pub fn new(
        virt_service: Arc<dyn DisplayServiceRegistry>,
        error_callback: ErrorCallback,
    ) -> Self {
        let mut ctx = Self { virt_service: None, disp_service: None, error_callback };

        let disp_service = Arc::new(DisplayService::new());
        if let Err(e) = virt_service.set_display_service(disp_service.clone()) {
            ctx.errorf(format!("Failed to register display service: {e:#}"));
            return ctx;
        }

        ctx.virt_service = Some(virt_service);
        ctx.disp_service = Some(disp_service);
        ctx
    }

    /// Returns the display service, unless it could not be registered.
    pub fn display_service(&self) -> Option<&Arc<DisplayService>> {
        self.disp_service.as_ref()
    }

    /// Logs `message` and passes it to the error callback.
    pub fn errorf(&self, message: String) {
        error!("{message}");
        let Some(callback) = self.error_callback else {
            return;
        };
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        // SAFETY: The message is a valid C string that outlives the call.
        unsafe { callback(message.as_ptr()) };
    }

    /// Configures the surface of the given kind, then blocks until the app gives it a native
    /// window.
    pub fn create_surface(
        &self,
        width: u32,
        height: u32,
        kind: SurfaceKind,
    ) -> Option<&AndroidDisplaySurface> {
        let Some(disp_service) = &self.disp_service else {
            self.errorf("Display service was not created".to_owned());
            return None;
        };

        let surface = disp_service.surface(kind);
        if let Err(e) = surface.configure(width, height) {
            self.errorf(format!("Failed to configure surface {}: {e:#}", surface.name()));
        }

        surface.wait_for_native_surface(); // this can block
        Some(surface)
    }

    /// Returns a buffer to draw the next frame of `surface` onto.
    pub fn lock_surface(&self, surface: &AndroidDisplaySurface) -> Option<NativeWindowBuffer> {
        match surface.lock() {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                self.errorf(format!("Failed to lock surface {}: {e:#}", surface.name()));
                None
            }
        }
    }

    /// Posts the buffer last returned by `lock_surface`.
    pub fn post_surface(&self, surface: &AndroidDisplaySurface) {
        if let Err(e) = surface.unlock_and_post() {
            self.errorf(format!(
                "Failed to unlock and post for surface {}: {e:#}",
                surface.name()
            ));
        }
    }

    /// Tells the app where to draw the cursor surface.
    pub fn set_cursor_position(&self, x: u32, y: u32) {
        let Some(disp_service) = &self.disp_service else {
            self.errorf("Display service was not created".to_owned());
            return;
        };
        if let Err(e) = disp_service.set_cursor_position(x, y) {
            self.errorf(format!("{e:#}"));
        }
    }
}

impl Drop for AndroidDisplayContext {
    fn drop(&mut self) {
        let Some(virt_service) = &self.virt_service else {
            self.errorf("Not connected to virtualization service".to_owned());
            return;
        };
        if let Err(e) = virt_service.clear_display_service() {
            self.errorf(format!("Failed to clear display service: {e:#}"));
        }
    }
}

/// Creates a display context and registers its display service with the virtualization service.
///
/// The returned context must be destroyed with `destroy_android_display_context`.
#[no_mangle]
pub extern "C" fn create_android_display_context(
    _service_name: *const c_char,
    error_callback: ErrorCallback,
) -> *mut AndroidDisplayContext {
    initialize_logging();
    info!("Registering display service with {VIRTUALIZATION_SERVICE_NAME}");

    let virt_service: Arc<dyn DisplayServiceRegistry> = virtualization_service();
    Box::into_raw(Box::new(AndroidDisplayContext::new(virt_service, error_callback)))
}

/// Destroys a display context, invalidating all surfaces created from it.
///
/// # Safety
///
/// `ctx` must be null or have been returned by `create_android_display_context`, and must not be
/// used afterwards.
#[no_mangle]
pub unsafe extern "C" fn destroy_android_display_context(ctx: *mut AndroidDisplayContext) {
    if !ctx.is_null() {
        // SAFETY: The caller guarantees that `ctx` came from `Box::into_raw` and is not reused.
        drop(unsafe { Box::from_raw(ctx) });
    }
}

/// Configures the scanout or cursor surface and blocks until the app presents a window for it.
///
/// Returns null if the context has no display service. The returned surface is valid until the
/// context is destroyed.
///
/// # Safety
///
/// `ctx` must be null or a live context returned by `create_android_display_context`.
#[no_mangle]
pub unsafe extern "C" fn create_android_surface(
    ctx: *mut AndroidDisplayContext,
    width: u32,
    height: u32,
    for_cursor: bool,
) -> *const AndroidDisplaySurface {
    // SAFETY: See the requirements on `ctx` above.
    let Some(ctx) = (unsafe { ctx.as_ref() }) else {
        return ptr::null();
    };
    ctx.create_surface(width, height, SurfaceKind::from_cursor_flag(for_cursor))
        .map_or(ptr::null(), ptr::from_ref)
}

/// Does nothing: surfaces are owned by the context and their windows are released when the app
/// removes them or when the context is destroyed.
#[no_mangle]
pub extern "C" fn destroy_android_surface(
    _ctx: *mut AndroidDisplayContext,
    _surface: *const AndroidDisplaySurface,
) {
}

/// Locks a buffer of `surface` to draw the next frame onto, and stores it to `out_buffer`.
///
/// Returns false, after reporting the error, if no buffer could be locked.
///
/// # Safety
///
/// * `ctx` must be null or a live context returned by `create_android_display_context`.
/// * `surface` must be null or have been returned by `create_android_surface` for `ctx`.
/// * `out_buffer` must be null or [valid] for writes.
///
/// [valid]: ptr#safety
#[no_mangle]
pub unsafe extern "C" fn get_android_surface_buffer(
    ctx: *mut AndroidDisplayContext,
    surface: *const AndroidDisplaySurface,
    out_buffer: *mut NativeWindowBuffer,
) -> bool {
    // SAFETY: See the requirements on `ctx` above.
    let Some(ctx) = (unsafe { ctx.as_ref() }) else {
        return false;
    };
    if out_buffer.is_null() {
        ctx.errorf("out_buffer is null".to_owned());
        return false;
    }
    // SAFETY: See the requirements on `surface` above.
    let Some(surface) = (unsafe { surface.as_ref() }) else {
        ctx.errorf("Invalid AndroidDisplaySurface provided".to_owned());
        return false;
    };

    let Some(buffer) = ctx.lock_surface(surface) else {
        return false;
    };
    // SAFETY: `out_buffer` is non-null and the caller guarantees that it is valid for writes.
    unsafe { out_buffer.write(buffer) };
    true
}

/// Writes the position of the cursor surface to the cursor stream.
///
/// # Safety
///
/// `ctx` must be null or a live context returned by `create_android_display_context`.
#[no_mangle]
pub unsafe extern "C" fn set_android_surface_position(
    ctx: *mut AndroidDisplayContext,
    x: u32,
    y: u32,
) {
    // SAFETY: See the requirements on `ctx` above.
    if let Some(ctx) = unsafe { ctx.as_ref() } {
        ctx.set_cursor_position(x, y);
    }
}

/// Posts the buffer last locked with `get_android_surface_buffer`.
///
/// # Safety
///
/// * `ctx` must be null or a live context returned by `create_android_display_context`.
/// * `surface` must be null or have been returned by `create_android_surface` for `ctx`.
#[no_mangle]
pub unsafe extern "C" fn post_android_surface_buffer(
    ctx: *mut AndroidDisplayContext,
    surface: *const AndroidDisplaySurface,
) {
    // SAFETY: See the requirements on `ctx` above.
    let Some(ctx) = (unsafe { ctx.as_ref() }) else {
        return;
    };
    // SAFETY: See the requirements on `surface` above.
    let Some(surface) = (unsafe { surface.as_ref() }) else {
        ctx.errorf("Invalid AndroidDisplaySurface provided".to_owned());
        return;
    };
    ctx.post_surface(surface);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VirtualizationServiceInternal;
    use crate::service::ICrosvmAndroidDisplayService;
    use crate::testing::FakeNativeWindow;
    use anyhow::{bail, Result};
    use std::ffi::CStr;
    use std::sync::Mutex;
    use std::time::Duration;

    // Registry whose registration always fails.
    struct BrokenRegistry;

    impl DisplayServiceRegistry for BrokenRegistry {
        fn set_display_service(&self, _: Arc<dyn ICrosvmAndroidDisplayService>) -> Result<()> {
            bail!("permission denied")
        }

        fn clear_display_service(&self) -> Result<()> {
            bail!("permission denied")
        }

        fn wait_display_service(&self) -> Result<Arc<dyn ICrosvmAndroidDisplayService>> {
            bail!("permission denied")
        }
    }

    // Only used by `reports_errors_through_callback`.
    static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    unsafe extern "C" fn record_error(message: *const c_char) {
        // SAFETY: The context always passes a valid C string.
        let message = unsafe { CStr::from_ptr(message) };
        MESSAGES.lock().unwrap().push(message.to_string_lossy().into_owned());
    }

    #[test]
    fn reports_errors_through_callback() {
        let ctx = AndroidDisplayContext::new(Arc::new(BrokenRegistry), Some(record_error));
        assert!(ctx.display_service().is_none());
        assert!(ctx.create_surface(2, 2, SurfaceKind::Scanout).is_none());
        ctx.set_cursor_position(1, 1);
        drop(ctx);

        assert_eq!(
            *MESSAGES.lock().unwrap(),
            vec![
                "Failed to register display service: permission denied",
                "Display service was not created",
                "Display service was not created",
                "Not connected to virtualization service",
            ]
        );
    }

    #[test]
    fn registers_and_clears_display_service() {
        let registry = Arc::new(VirtualizationServiceInternal::new());
        let ctx = AndroidDisplayContext::new(registry.clone(), None);
        assert!(ctx.display_service().is_some());
        assert!(registry.wait_display_service_timeout(Duration::from_millis(10)).is_some());

        drop(ctx);
        assert!(registry.wait_display_service_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn create_surface_waits_for_window() {
        let registry = Arc::new(VirtualizationServiceInternal::new());
        let ctx = AndroidDisplayContext::new(registry.clone(), None);

        let window = FakeNativeWindow::new();
        let disp_service = registry.wait_display_service().unwrap();
        disp_service.set_surface(Box::new(window.clone()), true).unwrap();

        let surface = ctx.create_surface(3, 1, SurfaceKind::Cursor).unwrap();
        assert_eq!(surface.name(), "cursor");
        let buffer = ctx.lock_surface(surface).unwrap();
        assert_eq!(buffer.dimensions(), (3, 1));
        ctx.post_surface(surface);
        assert_eq!(window.posted_frames().len(), 1);
    }

    #[test]
    fn null_arguments_are_rejected() {
        // SAFETY: Null pointers are allowed for every argument.
        unsafe {
            assert!(create_android_surface(ptr::null_mut(), 1, 1, false).is_null());
            assert!(!get_android_surface_buffer(ptr::null_mut(), ptr::null(), ptr::null_mut()));
            post_android_surface_buffer(ptr::null_mut(), ptr::null());
            set_android_surface_position(ptr::null_mut(), 0, 0);
            destroy_android_display_context(ptr::null_mut());
        }
    }
}
