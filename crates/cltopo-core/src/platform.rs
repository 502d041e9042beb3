//! Compute platforms and their version strings

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{ComputeApi, DetachedApi, PlatformId};
use crate::device::{split_list, Device};
use crate::error::{Error, NativeCode, Result};
use crate::info::{self, query_platform, PlatformInfo};
use crate::registry::Registry;

/// Prefix every conforming version string starts with
pub const VERSION_PREFIX: &str = "OpenCL ";

/// Parsed `"OpenCL <major>.<minor> <suffix>"` version string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    /// Implementation-specific text after the numeric version
    pub suffix: String,
}

impl Version {
    /// Parse a platform or device version string
    ///
    /// Returns `None` when the prefix is missing or the numeric part is
    /// not `major.minor`.
    pub fn parse(version: &str) -> Option<Self> {
        let rest = version.strip_prefix(VERSION_PREFIX)?;
        let (numeric, suffix) = rest.split_once(' ').unwrap_or((rest, ""));
        let (major, minor) = numeric.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
            suffix: suffix.to_string(),
        })
    }

    /// Lexicographic `(major, minor)` comparison, accepting equal or greater
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", VERSION_PREFIX, self.major, self.minor)?;
        if !self.suffix.is_empty() {
            write!(f, " {}", self.suffix)?;
        }
        Ok(())
    }
}

/// Platform profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Full,
    Embedded,
    Other(String),
}

impl Profile {
    pub fn parse(profile: &str) -> Self {
        match profile.trim() {
            "FULL_PROFILE" => Self::Full,
            "EMBEDDED_PROFILE" => Self::Embedded,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One compute platform and the devices it enumerated
///
/// The device list is filled once during detection and never changes
/// afterwards. Attribute accessors query the runtime on every call.
/// Two platforms are equal when their ids are equal.
#[derive(Clone)]
pub struct Platform {
    id: PlatformId,
    devices: Vec<Device>,
    api: Arc<dyn ComputeApi>,
}

impl Platform {
    pub(crate) fn new(id: PlatformId, api: Arc<dyn ComputeApi>) -> Self {
        Self {
            id,
            devices: Vec::new(),
            api,
        }
    }

    pub(crate) fn attach_devices(&mut self, devices: Vec<Device>) {
        self.devices = devices;
    }

    pub fn id(&self) -> PlatformId {
        self.id
    }

    /// Root devices in enumeration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Query any platform attribute by its marker type
    pub fn info<P: PlatformInfo>(&self) -> Result<P::Output> {
        query_platform::<P>(self.api.as_ref(), self.id)
    }

    pub fn name(&self) -> Result<String> {
        self.info::<info::platform::Name>()
    }

    pub fn vendor(&self) -> Result<String> {
        self.info::<info::platform::Vendor>()
    }

    pub fn profile(&self) -> Result<Profile> {
        Ok(Profile::parse(&self.info::<info::platform::Profile>()?))
    }

    pub fn is_full_profile(&self) -> Result<bool> {
        Ok(self.profile()? == Profile::Full)
    }

    pub fn is_embedded_profile(&self) -> Result<bool> {
        Ok(self.profile()? == Profile::Embedded)
    }

    /// Full version string, e.g. `"OpenCL 3.0 CUDA 12.2.140"`
    pub fn version(&self) -> Result<String> {
        self.info::<info::platform::Version>()
    }

    /// Version string parsed on every call
    pub fn version_info(&self) -> Result<Version> {
        Version::parse(&self.version()?).ok_or(Error::InvalidPlatform(NativeCode::INVALID_VALUE))
    }

    pub fn major_version(&self) -> Result<u32> {
        Ok(self.version_info()?.major)
    }

    pub fn minor_version(&self) -> Result<u32> {
        Ok(self.version_info()?.minor)
    }

    /// Implementation-specific part of the version string
    pub fn version_suffix(&self) -> Result<String> {
        Ok(self.version_info()?.suffix)
    }

    /// True when the platform supports at least `major.minor`
    pub fn check_version(&self, major: u32, minor: u32) -> Result<bool> {
        Ok(self.version_info()?.is_at_least(major, minor))
    }

    pub fn extensions(&self) -> Result<Vec<String>> {
        Ok(split_list(&self.info::<info::platform::Extensions>()?, ' '))
    }

    pub fn has_extension(&self, name: &str) -> Result<bool> {
        Ok(self.extensions()?.iter().any(|ext| ext == name))
    }

    /// Host timer resolution in nanoseconds (0 when unsupported)
    pub fn host_timer_resolution(&self) -> Result<u64> {
        self.info::<info::platform::HostTimerResolution>()
    }

    /// ICD loader suffix, from the `cl_khr_icd` extension
    pub fn icd_suffix(&self) -> Result<String> {
        self.info::<info::platform::IcdSuffixKhr>()
    }

    /// Ask the runtime to release compiler resources
    ///
    /// Returns whether the request succeeded; failures are logged, not raised.
    pub fn unload_compiler(&self) -> bool {
        match self.api.unload_compiler(self.id) {
            Ok(()) => true,
            Err(code) => {
                warn!(platform = %self.id, %code, "Compiler unload failed");
                false
            }
        }
    }

    // Process-wide lookups

    /// All platforms of the global registry, detecting on first use
    pub fn get_all() -> Result<Vec<Platform>> {
        Ok(Registry::global()?.get_all()?.platforms().to_vec())
    }

    pub fn find_by_id(id: PlatformId) -> Result<Option<Platform>> {
        Registry::global()?.find_platform(id)
    }

    pub fn get_default() -> Result<Platform> {
        Registry::global()?.default_platform()
    }

    pub fn set_default(platform: &Platform) -> Result<()> {
        Registry::global()?.set_default_platform(platform)
    }

    pub fn count() -> Result<usize> {
        Ok(Registry::global()?.get_all()?.len())
    }
}

/// Placeholder with a null id; every query fails with `INVALID_PLATFORM`
impl Default for Platform {
    fn default() -> Self {
        Self::new(PlatformId::NULL, Arc::new(DetachedApi))
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Platform {}

impl std::hash::Hash for Platform {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("id", &self.id)
            .field("devices", &self.devices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureApi;

    fn registry() -> Registry {
        let api = FixtureApi::from_toml(include_str!("../fixtures/two_platforms.toml")).unwrap();
        Registry::new(Arc::new(api))
    }

    #[test]
    fn test_version_parse() {
        let version = Version::parse("OpenCL 3.0 CUDA 12.2.140").unwrap();
        assert_eq!(version.major, 3);
        assert_eq!(version.minor, 0);
        assert_eq!(version.suffix, "CUDA 12.2.140");
        assert_eq!(version.to_string(), "OpenCL 3.0 CUDA 12.2.140");

        let bare = Version::parse("OpenCL 1.2").unwrap();
        assert_eq!((bare.major, bare.minor), (1, 2));
        assert!(bare.suffix.is_empty());

        assert!(Version::parse("CUDA 12.2").is_none());
        assert!(Version::parse("OpenCL three").is_none());
    }

    #[test]
    fn test_version_ordering() {
        let version = Version::parse("OpenCL 2.1 pocl").unwrap();
        assert!(version.is_at_least(2, 1));
        assert!(version.is_at_least(1, 9));
        assert!(version.is_at_least(0, 0));
        assert!(!version.is_at_least(2, 2));
        assert!(!version.is_at_least(3, 0));
    }

    #[test]
    fn test_check_version_properties() {
        let registry = registry();
        for platform in registry.get_all().unwrap().platforms() {
            let version = platform.version_info().unwrap();
            let (major, minor) = (version.major, version.minor);
            assert!(platform.check_version(major, minor).unwrap());
            assert!(!platform.check_version(major + 1, 0).unwrap());
            assert!(!platform.check_version(major, minor + 1).unwrap());
            assert!(platform.check_version(0, 0).unwrap());
        }
    }

    #[test]
    fn test_named_accessors() {
        let registry = registry();
        let snapshot = registry.get_all().unwrap();
        let platform = &snapshot.platforms()[0];
        assert_eq!(platform.name().unwrap(), "Fixture CUDA");
        assert_eq!(platform.vendor().unwrap(), "NVIDIA Corporation");
        assert!(platform.is_full_profile().unwrap());
        assert!(!platform.is_embedded_profile().unwrap());
        assert_eq!(platform.version_suffix().unwrap(), "CUDA 12.2.140");
        assert!(platform.has_extension("cl_khr_icd").unwrap());
        assert!(!platform.has_extension("cl_khr_missing").unwrap());
        assert_eq!(platform.icd_suffix().unwrap(), "NV");
        assert_eq!(platform.device_count(), 1);

        let pocl = &snapshot.platforms()[1];
        assert!(pocl.is_embedded_profile().unwrap());
        assert_eq!(pocl.host_timer_resolution().unwrap(), 1);
    }

    #[test]
    fn test_unload_compiler_reports_bool() {
        let registry = registry();
        let snapshot = registry.get_all().unwrap();
        assert!(snapshot.platforms()[0].unload_compiler());
        assert!(!Platform::default().unload_compiler());
    }

    #[test]
    fn test_placeholder_platform() {
        let platform = Platform::default();
        assert!(platform.id().is_null());
        assert_eq!(
            platform.name(),
            Err(Error::InvalidPlatform(NativeCode::INVALID_PLATFORM))
        );
        assert!(platform.devices().is_empty());
        assert_eq!(platform, Platform::default());
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("FULL_PROFILE"), Profile::Full);
        assert_eq!(Profile::parse("EMBEDDED_PROFILE "), Profile::Embedded);
        assert_eq!(Profile::parse("CUSTOM"), Profile::Other("CUSTOM".to_string()));
    }
}
