//! Boundary with the external compute runtime
//!
//! The registry never talks to a driver directly. Everything it needs
//! (enumeration, attribute queries, sub-device creation, default selection)
//! goes through [`ComputeApi`], so the native OpenCL backend and the
//! in-memory fixture are interchangeable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::error::NativeCode;
use crate::info::{DeviceParam, InfoValue, PlatformParam};

/// Opaque platform handle supplied by the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub usize);

impl PlatformId {
    pub const NULL: Self = Self(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque device handle supplied by the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub usize);

impl DeviceId {
    pub const NULL: Self = Self(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Device classification bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType(pub u64);

impl DeviceType {
    pub const DEFAULT: Self = Self(1 << 0);
    pub const CPU: Self = Self(1 << 1);
    pub const GPU: Self = Self(1 << 2);
    pub const ACCELERATOR: Self = Self(1 << 3);
    pub const CUSTOM: Self = Self(1 << 4);
    pub const ALL: Self = Self(0xFFFF_FFFF);

    const NAMES: [(&'static str, DeviceType); 6] = [
        ("all", Self::ALL),
        ("default", Self::DEFAULT),
        ("cpu", Self::CPU),
        ("gpu", Self::GPU),
        ("accelerator", Self::ACCELERATOR),
        ("custom", Self::CUSTOM),
    ];

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True when every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Canonical names of the classes present in this bitfield
    pub fn names(self) -> Vec<&'static str> {
        if self == Self::ALL {
            return vec!["all"];
        }
        Self::NAMES
            .iter()
            .skip(1)
            .filter(|(_, ty)| self.intersects(*ty))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Bits outside every named class, such as vendor-specific types
    pub const fn unnamed_bits(self) -> u64 {
        if self.0 == Self::ALL.0 {
            return 0;
        }
        self.0 & !Self::NAMED_MASK
    }

    const NAMED_MASK: u64 = Self::DEFAULT.0 | Self::CPU.0 | Self::GPU.0 | Self::ACCELERATOR.0 | Self::CUSTOM.0;
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for DeviceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Named classes joined by `|`, with any unnamed bits as a trailing hex part
impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.names().into_iter().map(String::from).collect();
        let unnamed = self.unnamed_bits();
        if unnamed != 0 || parts.is_empty() {
            parts.push(format!("{:#x}", unnamed));
        }
        write!(f, "{}", parts.join("|"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDeviceType(pub String);

impl fmt::Display for UnknownDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device type: {}", self.0)
    }
}

impl std::error::Error for UnknownDeviceType {}

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    /// Parse one name or a `|`-separated combination (`"gpu|cpu"`); hex
    /// parts (`"gpu|0x20"`) carry bits that have no name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0;
        for part in s.split('|').map(str::trim) {
            let hex = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X"));
            if let Some(digits) = hex {
                bits |= u64::from_str_radix(digits, 16).map_err(|_| UnknownDeviceType(part.to_string()))?;
                continue;
            }
            let (_, ty) = Self::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| UnknownDeviceType(part.to_string()))?;
            bits |= ty.0;
        }
        Ok(Self(bits))
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a device should be split into sub-devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSpec {
    /// As many sub-devices as possible, each with this many compute units
    Equally(u32),
    /// One sub-device per entry, each with the given number of compute units
    ByCounts(Vec<u32>),
}

/// Operations consumed from the compute runtime
///
/// Every call reports failure as the runtime's numeric status. Implementors
/// must be shareable across threads; the registry calls into them without
/// holding its lock except during detection.
pub trait ComputeApi: Send + Sync {
    /// All platform handles, in runtime enumeration order
    fn platform_ids(&self) -> Result<Vec<PlatformId>, NativeCode>;

    /// Device handles of `platform` matching `filter`, in enumeration order
    fn device_ids(&self, platform: PlatformId, filter: DeviceType) -> Result<Vec<DeviceId>, NativeCode>;

    /// Typed accessor for a platform attribute
    fn platform_info(&self, platform: PlatformId, param: PlatformParam) -> Result<InfoValue, NativeCode>;

    /// Raw query of up to `capacity` bytes for a platform attribute
    fn platform_info_raw(&self, platform: PlatformId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode>;

    /// Typed accessor for a device attribute
    fn device_info(&self, device: DeviceId, param: DeviceParam) -> Result<InfoValue, NativeCode>;

    /// Raw query of up to `capacity` bytes for a device attribute
    fn device_info_raw(&self, device: DeviceId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode>;

    fn create_subdevices(&self, device: DeviceId, spec: &PartitionSpec) -> Result<Vec<DeviceId>, NativeCode>;

    fn default_platform(&self) -> Result<PlatformId, NativeCode>;

    fn set_default_platform(&self, platform: PlatformId) -> Result<(), NativeCode>;

    fn default_device(&self) -> Result<DeviceId, NativeCode>;

    fn set_default_device(&self, device: DeviceId) -> Result<(), NativeCode>;

    /// Hint that the platform's compiler resources may be released
    fn unload_compiler(&self, platform: PlatformId) -> Result<(), NativeCode>;
}

/// Collaborator behind placeholder platforms and devices
///
/// Every call fails with the "invalid" status of the entity it concerns.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DetachedApi;

impl ComputeApi for DetachedApi {
    fn platform_ids(&self) -> Result<Vec<PlatformId>, NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn device_ids(&self, _: PlatformId, _: DeviceType) -> Result<Vec<DeviceId>, NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn platform_info(&self, _: PlatformId, _: PlatformParam) -> Result<InfoValue, NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn platform_info_raw(&self, _: PlatformId, _: u32, _: usize) -> Result<Vec<u8>, NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn device_info(&self, _: DeviceId, _: DeviceParam) -> Result<InfoValue, NativeCode> {
        Err(NativeCode::INVALID_DEVICE)
    }

    fn device_info_raw(&self, _: DeviceId, _: u32, _: usize) -> Result<Vec<u8>, NativeCode> {
        Err(NativeCode::INVALID_DEVICE)
    }

    fn create_subdevices(&self, _: DeviceId, _: &PartitionSpec) -> Result<Vec<DeviceId>, NativeCode> {
        Err(NativeCode::INVALID_DEVICE)
    }

    fn default_platform(&self) -> Result<PlatformId, NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn set_default_platform(&self, _: PlatformId) -> Result<(), NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }

    fn default_device(&self) -> Result<DeviceId, NativeCode> {
        Err(NativeCode::INVALID_DEVICE)
    }

    fn set_default_device(&self, _: DeviceId) -> Result<(), NativeCode> {
        Err(NativeCode::INVALID_DEVICE)
    }

    fn unload_compiler(&self, _: PlatformId) -> Result<(), NativeCode> {
        Err(NativeCode::INVALID_PLATFORM)
    }
}
