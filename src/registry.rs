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

//! Rendezvous between the VM process, which creates the display service, and the app, which
//! presents its surfaces through it.
//!
//! The VM runs as an app and is not allowed to register services with the service manager, so
//! the display service is handed to the virtualization service instead.

use crate::service::ICrosvmAndroidDisplayService;
use crate::sync::Monitor;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Name under which the virtualization service is registered.
pub const VIRTUALIZATION_SERVICE_NAME: &str = "android.system.virtualizationservice";

/// The display service part of the internal virtualization service interface.
pub trait DisplayServiceRegistry: Send + Sync {
    /// Registers `service`, replacing any previously registered one.
    fn set_display_service(&self, service: Arc<dyn ICrosvmAndroidDisplayService>) -> Result<()>;

    /// Unregisters the current display service, if any.
    fn clear_display_service(&self) -> Result<()>;

    /// Blocks until a display service is registered and returns it.
    fn wait_display_service(&self) -> Result<Arc<dyn ICrosvmAndroidDisplayService>>;
}

/// In-process implementation of `DisplayServiceRegistry`.
#[derive(Default)]
pub struct VirtualizationServiceInternal {
    display_service: Monitor<Option<Arc<dyn ICrosvmAndroidDisplayService>>>,
}

impl VirtualizationServiceInternal {
    /// Creates a registry without a display service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Like `wait_display_service`, but gives up after `timeout`.
    pub fn wait_display_service_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Arc<dyn ICrosvmAndroidDisplayService>> {
        let (display_service, _) =
            self.display_service.wait_timeout_while(timeout, |service| service.is_none());
        display_service.clone()
    }
}

impl DisplayServiceRegistry for VirtualizationServiceInternal {
    fn set_display_service(&self, service: Arc<dyn ICrosvmAndroidDisplayService>) -> Result<()> {
        *self.display_service.lock() = Some(service);
        info!("Display service set");
        self.display_service.notify_all();
        Ok(())
    }

    fn clear_display_service(&self) -> Result<()> {
        *self.display_service.lock() = None;
        info!("Display service cleared");
        self.display_service.notify_all();
        Ok(())
    }

    fn wait_display_service(&self) -> Result<Arc<dyn ICrosvmAndroidDisplayService>> {
        let display_service = self.display_service.wait_while(|service| service.is_none());
        display_service.clone().ok_or_else(|| anyhow!("Display service cannot be None here"))
    }
}

lazy_static! {
    static ref VIRTUALIZATION_SERVICE: Arc<VirtualizationServiceInternal> =
        Arc::new(VirtualizationServiceInternal::new());
}

/// Returns the process-wide virtualization service.
pub fn virtualization_service() -> Arc<VirtualizationServiceInternal> {
    VIRTUALIZATION_SERVICE.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DisplayService;
    use std::thread;

    #[test]
    fn wait_returns_registered_service() {
        let registry = Arc::new(VirtualizationServiceInternal::new());
        assert!(registry.wait_display_service_timeout(Duration::from_millis(10)).is_none());

        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || registry.wait_display_service().map(|_| ()))
        };
        let service: Arc<dyn ICrosvmAndroidDisplayService> = Arc::new(DisplayService::new());
        registry.set_display_service(service.clone()).unwrap();
        waiter.join().unwrap().unwrap();

        let found = registry.wait_display_service().unwrap();
        assert!(Arc::ptr_eq(&found, &service));
    }

    #[test]
    fn cleared_service_is_gone() {
        let registry = VirtualizationServiceInternal::new();
        registry.set_display_service(Arc::new(DisplayService::new())).unwrap();
        registry.clear_display_service().unwrap();
        assert!(registry.wait_display_service_timeout(Duration::from_millis(10)).is_none());
    }
}
