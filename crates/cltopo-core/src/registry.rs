//! Process-wide cache of platforms and devices
//!
//! The registry detects the topology once per epoch and publishes it as an
//! immutable [`Epoch`]. Readers of a published epoch never take the lock;
//! only the first detection and forced re-detections serialise on it.
//!
//! ```text
//! Empty --get_all()--> Detecting --ok--> Populated
//!   ^                      |                 |
//!   +------- error --------+    redetect() --+--> Detecting
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ComputeApi, DeviceId, DeviceType, PlatformId};
use crate::device::Device;
use crate::error::{Error, NativeCode, Result};
use crate::platform::Platform;

/// Detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOptions {
    /// Device classes enumerated on every platform
    #[serde(default = "default_device_types")]
    pub device_types: Vec<DeviceType>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            device_types: default_device_types(),
        }
    }
}

fn default_device_types() -> Vec<DeviceType> {
    vec![DeviceType::ALL]
}

impl RegistryOptions {
    /// Union of the configured classes; an empty list means all devices
    pub fn device_filter(&self) -> DeviceType {
        self.device_types
            .iter()
            .copied()
            .reduce(|a, b| a | b)
            .unwrap_or(DeviceType::ALL)
    }
}

/// One published detection result
#[derive(Debug)]
pub struct Epoch {
    number: u64,
    detected_at: DateTime<Utc>,
    platforms: Vec<Platform>,
}

impl Epoch {
    /// Monotonic epoch counter, starting at 1 for the first detection
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Platforms in enumeration order
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Root devices of every platform, platform by platform
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.platforms.iter().flat_map(|p| p.devices().iter())
    }

    pub fn device_count(&self) -> usize {
        self.platforms.iter().map(Platform::device_count).sum()
    }

    pub fn find_platform(&self, id: PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.id() == id)
    }

    /// Root device lookup; sub-devices are never part of an epoch
    pub fn find_device(&self, id: DeviceId) -> Option<&Device> {
        self.devices().find(|d| d.id() == id)
    }
}

/// Shared platform/device registry
///
/// Cloning is cheap and every clone sees the same cache.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    api: Arc<dyn ComputeApi>,
    options: RegistryOptions,
    published: ArcSwapOption<Epoch>,
    detect_lock: Mutex<()>,
    epochs: AtomicU64,
}

/// Non-owning link from a device back to the registry that created it
#[derive(Clone, Default)]
pub(crate) struct RegistryHandle(Weak<RegistryInner>);

impl RegistryHandle {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self::with_options(api, RegistryOptions::default())
    }

    pub fn with_options(api: Arc<dyn ComputeApi>, options: RegistryOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                api,
                options,
                published: ArcSwapOption::empty(),
                detect_lock: Mutex::new(()),
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Install the process-wide registry
    ///
    /// Fails if one is already installed (including the native fallback
    /// created by an earlier [`Registry::global`] call).
    pub fn install_global(registry: Registry) -> Result<&'static Registry> {
        GLOBAL
            .set(registry)
            .map_err(|_| Error::generic("global registry already installed"))?;
        Self::global()
    }

    /// The process-wide registry
    ///
    /// Without an installed registry this falls back to the native OpenCL
    /// collaborator when the `opencl` feature is enabled.
    pub fn global() -> Result<&'static Registry> {
        if let Some(registry) = GLOBAL.get() {
            return Ok(registry);
        }
        Self::native_fallback()
    }

    #[cfg(feature = "opencl")]
    fn native_fallback() -> Result<&'static Registry> {
        Ok(GLOBAL.get_or_init(|| Registry::new(Arc::new(crate::native::OpenClApi::new()))))
    }

    #[cfg(not(feature = "opencl"))]
    fn native_fallback() -> Result<&'static Registry> {
        Err(Error::generic(
            "no global registry installed and native OpenCL support is disabled",
        ))
    }

    pub fn api(&self) -> &Arc<dyn ComputeApi> {
        &self.inner.api
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.inner.options
    }

    /// Current epoch, detecting first if the cache is empty
    pub fn get_all(&self) -> Result<Arc<Epoch>> {
        if let Some(epoch) = self.inner.published.load_full() {
            return Ok(epoch);
        }

        let _guard = self.inner.detect_lock.lock();
        if let Some(epoch) = self.inner.published.load_full() {
            return Ok(epoch);
        }
        self.detect_and_publish()
    }

    /// Discard the cache and detect again, starting a new epoch
    ///
    /// Platform and device values from earlier epochs stay usable as plain
    /// data but lookups only see the new epoch.
    pub fn redetect(&self) -> Result<Arc<Epoch>> {
        let _guard = self.inner.detect_lock.lock();
        self.inner.published.store(None);
        self.detect_and_publish()
    }

    /// `get_all` or `redetect` depending on `force`
    pub fn get_all_forced(&self, force: bool) -> Result<Arc<Epoch>> {
        if force {
            self.redetect()
        } else {
            self.get_all()
        }
    }

    /// Drop the cache; the next access detects again
    pub fn reset(&self) {
        let _guard = self.inner.detect_lock.lock();
        self.inner.published.store(None);
        debug!("Registry cache cleared");
    }

    /// Published epoch, if any, without triggering detection
    pub fn current(&self) -> Option<Arc<Epoch>> {
        self.inner.published.load_full()
    }

    /// Must be called with `detect_lock` held
    fn detect_and_publish(&self) -> Result<Arc<Epoch>> {
        match self.detect() {
            Ok(platforms) => {
                let number = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
                let epoch = Arc::new(Epoch {
                    number,
                    detected_at: Utc::now(),
                    platforms,
                });
                info!(
                    epoch = number,
                    platforms = epoch.len(),
                    devices = epoch.device_count(),
                    "Compute topology detected"
                );
                self.inner.published.store(Some(Arc::clone(&epoch)));
                Ok(epoch)
            }
            Err(e) => {
                warn!(error = %e, "Compute topology detection failed");
                Err(e)
            }
        }
    }

    fn detect(&self) -> Result<Vec<Platform>> {
        let api = &self.inner.api;
        let handle = RegistryHandle(Arc::downgrade(&self.inner));
        let filter = self.inner.options.device_filter();

        let ids = match api.platform_ids() {
            Ok(ids) => ids,
            Err(code) if code == NativeCode::PLATFORM_NOT_FOUND_KHR => {
                debug!("No compute platforms installed");
                Vec::new()
            }
            Err(code) => return Err(Error::InvalidPlatform(code)),
        };

        let mut platforms: Vec<Platform> = ids
            .into_iter()
            .map(|id| Platform::new(id, Arc::clone(api)))
            .collect();

        for platform in &mut platforms {
            let device_ids = match api.device_ids(platform.id(), filter) {
                Ok(ids) => ids,
                Err(code) if code == NativeCode::DEVICE_NOT_FOUND => Vec::new(),
                Err(code) => return Err(Error::InvalidDevice(code)),
            };
            debug!(platform = %platform.id(), devices = device_ids.len(), "Enumerated platform");
            let devices = device_ids
                .into_iter()
                .map(|id| {
                    debug!(platform = %platform.id(), device = %id, "Enumerated device");
                    Device::root(id, platform.id(), Arc::clone(api), handle.clone())
                })
                .collect();
            platform.attach_devices(devices);
        }

        Ok(platforms)
    }

    pub fn find_platform(&self, id: PlatformId) -> Result<Option<Platform>> {
        Ok(self.get_all()?.find_platform(id).cloned())
    }

    pub fn find_device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.get_all()?.find_device(id).cloned())
    }

    /// Root devices across all platforms whose type matches `ty`
    ///
    /// An empty result is not an error.
    pub fn find_devices_by_type(&self, ty: DeviceType) -> Result<Vec<Device>> {
        let epoch = self.get_all()?;
        let mut matches = Vec::new();
        for device in epoch.devices() {
            if device.is_devtype(ty)? {
                matches.push(device.clone());
            }
        }
        Ok(matches)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.get_all()?.len())
    }

    pub fn device_count(&self) -> Result<usize> {
        Ok(self.get_all()?.device_count())
    }

    /// The runtime's default platform, resolved in the current epoch
    pub fn default_platform(&self) -> Result<Platform> {
        let id = self.inner.api.default_platform().map_err(Error::InvalidPlatform)?;
        self.find_platform(id)?.ok_or_else(|| {
            warn!(platform = %id, "Default platform not present in registry");
            Error::InvalidPlatform(NativeCode::INVALID_PLATFORM)
        })
    }

    pub fn set_default_platform(&self, platform: &Platform) -> Result<()> {
        if platform.id().is_null() {
            return Err(Error::InvalidPlatform(NativeCode::INVALID_PLATFORM));
        }
        self.inner
            .api
            .set_default_platform(platform.id())
            .map_err(Error::InvalidPlatform)
    }

    /// The runtime's default device, resolved in the current epoch
    pub fn default_device(&self) -> Result<Device> {
        let id = self.inner.api.default_device().map_err(Error::InvalidDevice)?;
        self.find_device(id)?.ok_or_else(|| {
            warn!(device = %id, "Default device not present in registry");
            Error::InvalidDevice(NativeCode::INVALID_DEVICE)
        })
    }

    pub fn set_default_device(&self, device: &Device) -> Result<()> {
        if device.id().is_null() {
            return Err(Error::InvalidDevice(NativeCode::INVALID_DEVICE));
        }
        self.inner
            .api
            .set_default_device(device.id())
            .map_err(Error::InvalidDevice)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.inner.options)
            .field("epoch", &self.current().map(|e| e.number()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureApi, Operation};

    const TOPOLOGY: &str = include_str!("../fixtures/two_platforms.toml");

    fn fixture() -> Arc<FixtureApi> {
        Arc::new(FixtureApi::from_toml(TOPOLOGY).unwrap())
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logs_each_enumerated_device() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let registry = Registry::new(fixture());
        let epoch = tracing::subscriber::with_default(subscriber, || registry.get_all().unwrap());

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert_eq!(output.matches("Enumerated device").count(), epoch.device_count());
        for device in epoch.devices() {
            assert!(output.contains(&format!("device={}", device.id())), "{}", output);
        }
    }

    #[test]
    fn test_detects_lazily() {
        let api = fixture();
        let registry = Registry::new(api.clone());
        assert!(registry.current().is_none());
        assert_eq!(api.enumerations(), 0);

        let epoch = registry.get_all().unwrap();
        assert_eq!(epoch.number(), 1);
        assert_eq!(epoch.len(), 2);
        assert_eq!(epoch.device_count(), 3);
        assert_eq!(api.enumerations(), 1);
    }

    #[test]
    fn test_cached_within_epoch() {
        let api = fixture();
        let registry = Registry::new(api.clone());
        let first = registry.get_all().unwrap();
        let second = registry.get_all().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let ids: Vec<_> = first.platforms().iter().map(Platform::id).collect();
        let again: Vec<_> = second.platforms().iter().map(Platform::id).collect();
        assert_eq!(ids, again);
        assert_eq!(api.enumerations(), 1);
    }

    #[test]
    fn test_platform_invariants() {
        let registry = Registry::new(fixture());
        let epoch = registry.get_all().unwrap();
        for platform in epoch.platforms() {
            assert!(!platform.id().is_null());
            assert_eq!(registry.find_platform(platform.id()).unwrap().as_ref(), Some(platform));
            for device in platform.devices() {
                assert!(!device.is_subdevice());
                assert_eq!(device.get_platform().unwrap().id(), platform.id());
            }
        }
    }

    #[test]
    fn test_redetect_starts_new_epoch() {
        let api = fixture();
        let registry = Registry::new(api.clone());
        let first = registry.get_all().unwrap();
        let second = registry.redetect().unwrap();
        assert_eq!(second.number(), first.number() + 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(api.enumerations(), 2);
        assert!(Arc::ptr_eq(&registry.get_all().unwrap(), &second));
        assert_eq!(registry.get_all_forced(true).unwrap().number(), 3);
        assert_eq!(registry.get_all_forced(false).unwrap().number(), 3);
    }

    #[test]
    fn test_failed_detection_publishes_nothing() {
        let api = fixture();
        api.inject_failure(Operation::DeviceIds, NativeCode::OUT_OF_HOST_MEMORY);
        let registry = Registry::new(api.clone());

        let err = registry.get_all().unwrap_err();
        assert_eq!(err, Error::InvalidDevice(NativeCode::OUT_OF_HOST_MEMORY));
        assert!(registry.current().is_none());

        api.clear_failures();
        let epoch = registry.get_all().unwrap();
        assert_eq!(epoch.len(), 2);
        assert_eq!(epoch.number(), 1);
    }

    #[test]
    fn test_platform_enumeration_failure_is_platform_error() {
        let api = fixture();
        api.inject_failure(Operation::PlatformIds, NativeCode::OUT_OF_RESOURCES);
        let registry = Registry::new(api);
        assert_eq!(
            registry.get_all().unwrap_err(),
            Error::InvalidPlatform(NativeCode::OUT_OF_RESOURCES)
        );
    }

    #[test]
    fn test_no_platforms_is_empty_epoch() {
        let api = fixture();
        api.inject_failure(Operation::PlatformIds, NativeCode::PLATFORM_NOT_FOUND_KHR);
        let registry = Registry::new(api);
        let epoch = registry.get_all().unwrap();
        assert!(epoch.is_empty());
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let api = fixture();
        let registry = Registry::new(api.clone());
        registry.get_all().unwrap();
        registry.reset();
        assert!(registry.current().is_none());
        assert_eq!(registry.get_all().unwrap().number(), 2);
        assert_eq!(api.enumerations(), 2);
    }

    #[test]
    fn test_device_filter() {
        let options = RegistryOptions {
            device_types: vec![DeviceType::CPU],
        };
        let registry = Registry::with_options(fixture(), options);
        let epoch = registry.get_all().unwrap();
        assert_eq!(epoch.len(), 2);
        assert_eq!(epoch.platforms()[0].device_count(), 0);
        assert_eq!(epoch.platforms()[1].device_count(), 1);
    }

    #[test]
    fn test_options_filter_union() {
        let options: RegistryOptions = toml::from_str(r#"device_types = ["gpu", "accelerator"]"#).unwrap();
        assert_eq!(options.device_filter(), DeviceType::GPU | DeviceType::ACCELERATOR);
        assert_eq!(RegistryOptions::default().device_filter(), DeviceType::ALL);
        let empty = RegistryOptions { device_types: Vec::new() };
        assert_eq!(empty.device_filter(), DeviceType::ALL);
    }

    #[test]
    fn test_find_by_type() {
        let registry = Registry::new(fixture());
        assert_eq!(registry.find_devices_by_type(DeviceType::GPU).unwrap().len(), 1);
        assert_eq!(registry.find_devices_by_type(DeviceType::CPU).unwrap().len(), 1);
        assert_eq!(registry.find_devices_by_type(DeviceType::ACCELERATOR).unwrap().len(), 1);
        assert!(registry.find_devices_by_type(DeviceType::CUSTOM).unwrap().is_empty());
        assert_eq!(registry.find_devices_by_type(DeviceType::ALL).unwrap().len(), 3);
    }

    #[test]
    fn test_defaults() {
        let registry = Registry::new(fixture());
        let epoch = registry.get_all().unwrap();

        let platform = registry.default_platform().unwrap();
        assert_eq!(&platform, &epoch.platforms()[0]);
        let device = registry.default_device().unwrap();
        assert_eq!(&device, &epoch.platforms()[0].devices()[0]);

        let pocl = &epoch.platforms()[1];
        registry.set_default_platform(pocl).unwrap();
        assert_eq!(&registry.default_platform().unwrap(), pocl);

        let cpu = &pocl.devices()[0];
        registry.set_default_device(cpu).unwrap();
        assert_eq!(&registry.default_device().unwrap(), cpu);

        assert_eq!(
            registry.set_default_device(&Device::default()).unwrap_err(),
            Error::InvalidDevice(NativeCode::INVALID_DEVICE)
        );
    }

    #[test]
    fn test_stale_ids_after_topology_change() {
        let api = fixture();
        let registry = Registry::new(api.clone());
        let old = registry.get_all().unwrap();
        let old_device = old.platforms()[0].devices()[0].clone();

        api.replace_topology_toml(TOPOLOGY).unwrap();
        let new = registry.redetect().unwrap();

        assert!(new.find_platform(old.platforms()[0].id()).is_none());
        assert_eq!(old_device.name().unwrap(), "Fixture GPU");
        assert_eq!(
            old_device.get_platform().unwrap_err(),
            Error::InvalidDevice(NativeCode::INVALID_DEVICE)
        );
        assert_eq!(new.len(), old.len());
    }

    // Unit tests never install a global registry
    #[cfg(not(feature = "opencl"))]
    #[test]
    fn test_global_requires_install_without_native() {
        assert!(Registry::global().is_err());
    }
}
