//! Attribute query protocol for platforms and devices
//!
//! Each queryable attribute is a variant of [`PlatformParam`] or
//! [`DeviceParam`] and also a zero-sized marker type in [`platform`] or
//! [`device`]. The marker fixes the Rust result type at compile time:
//!
//! ```ignore
//! let units: u32 = device.info::<info::device::MaxComputeUnits>()?;
//! ```
//!
//! Every parameter has exactly one [`QueryStrategy`]. Most go through the
//! runtime's typed accessor; the few it does not expose (vendor extension
//! attributes) are fetched as a fixed-size raw buffer and reinterpreted.
//! Results are never cached: each call goes back to the runtime.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::api::{ComputeApi, DeviceId, DeviceType, PlatformId};
use crate::error::{Error, NativeCode, Result};

/// Capacity of the raw buffer used for string attributes
pub const RAW_STRING_CAPACITY: usize = 1024;

/// Maximum number of entries read for raw size arrays
pub const RAW_SIZES_CAPACITY: usize = 16;

/// How an attribute is fetched from the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStrategy {
    /// Through the runtime's typed accessor
    Typed,
    /// As a fixed-size byte buffer reinterpreted as the target type
    Raw,
}

/// Shape of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    UInt,
    ULong,
    Size,
    Bool,
    Sizes,
    Bitfield,
    Handle,
    Properties,
}

impl ValueKind {
    /// Buffer size used when this kind is fetched with [`QueryStrategy::Raw`]
    pub const fn raw_capacity(self) -> usize {
        match self {
            Self::String => RAW_STRING_CAPACITY,
            Self::UInt | Self::Bool => 4,
            Self::ULong | Self::Bitfield => 8,
            Self::Size | Self::Handle => std::mem::size_of::<usize>(),
            Self::Sizes | Self::Properties => RAW_SIZES_CAPACITY * std::mem::size_of::<usize>(),
        }
    }
}

/// A decoded attribute value as returned by a typed accessor
///
/// Serialised as `{"kind": ..., "value": ...}` using the [`ValueKind`] name,
/// so values of the same shape keep their kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum InfoValue {
    String(String),
    UInt(u32),
    ULong(u64),
    Size(usize),
    Bool(bool),
    Sizes(Vec<usize>),
    Bitfield(u64),
    Handle(usize),
    Properties(Vec<isize>),
}

impl InfoValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::UInt(_) => ValueKind::UInt,
            Self::ULong(_) => ValueKind::ULong,
            Self::Size(_) => ValueKind::Size,
            Self::Bool(_) => ValueKind::Bool,
            Self::Sizes(_) => ValueKind::Sizes,
            Self::Bitfield(_) => ValueKind::Bitfield,
            Self::Handle(_) => ValueKind::Handle,
            Self::Properties(_) => ValueKind::Properties,
        }
    }

    /// Native-endian byte image, as a raw query would return it
    ///
    /// Strings are NUL-terminated and booleans are 32-bit, matching the
    /// runtime's C representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::String(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            Self::UInt(v) => v.to_ne_bytes().to_vec(),
            Self::ULong(v) | Self::Bitfield(v) => v.to_ne_bytes().to_vec(),
            Self::Size(v) | Self::Handle(v) => v.to_ne_bytes().to_vec(),
            Self::Bool(v) => u32::from(*v).to_ne_bytes().to_vec(),
            Self::Sizes(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            Self::Properties(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
        }
    }

    /// Decode a raw byte image of the given kind
    pub fn from_bytes(kind: ValueKind, bytes: &[u8]) -> Option<Self> {
        let value = match kind {
            ValueKind::String => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Self::String(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            ValueKind::UInt => Self::UInt(u32::from_ne_bytes(bytes.get(..4)?.try_into().ok()?)),
            ValueKind::Bool => Self::Bool(u32::from_ne_bytes(bytes.get(..4)?.try_into().ok()?) != 0),
            ValueKind::ULong => Self::ULong(u64::from_ne_bytes(bytes.get(..8)?.try_into().ok()?)),
            ValueKind::Bitfield => Self::Bitfield(u64::from_ne_bytes(bytes.get(..8)?.try_into().ok()?)),
            ValueKind::Size => Self::Size(read_usize(bytes)?),
            ValueKind::Handle => Self::Handle(read_usize(bytes)?),
            ValueKind::Sizes => Self::Sizes(
                bytes
                    .chunks_exact(std::mem::size_of::<usize>())
                    .filter_map(read_usize)
                    .collect(),
            ),
            ValueKind::Properties => Self::Properties(
                bytes
                    .chunks_exact(std::mem::size_of::<isize>())
                    .filter_map(|chunk| Some(isize::from_ne_bytes(chunk.try_into().ok()?)))
                    .collect(),
            ),
        };
        Some(value)
    }
}

fn read_usize(bytes: &[u8]) -> Option<usize> {
    let width = std::mem::size_of::<usize>();
    Some(usize::from_ne_bytes(bytes.get(..width)?.try_into().ok()?))
}

/// Conversion from a runtime value into an attribute's Rust type
pub trait FromInfo: Sized {
    fn from_info(value: InfoValue) -> Option<Self>;
}

impl FromInfo for String {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromInfo for u32 {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::UInt(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for u64 {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::ULong(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for usize {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Size(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for bool {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for Vec<usize> {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Sizes(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for Vec<isize> {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Properties(v) => Some(v),
            _ => None,
        }
    }
}

impl FromInfo for DeviceType {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Bitfield(v) => Some(DeviceType(v)),
            _ => None,
        }
    }
}

impl FromInfo for PlatformId {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Handle(v) => Some(PlatformId(v)),
            _ => None,
        }
    }
}

/// A null parent handle decodes to `None`
impl FromInfo for Option<DeviceId> {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Handle(0) => Some(None),
            InfoValue::Handle(v) => Some(Some(DeviceId(v))),
            _ => None,
        }
    }
}

/// Floating-point capability bits of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FpConfig(pub u64);

impl FpConfig {
    pub const DENORM: Self = Self(1 << 0);
    pub const INF_NAN: Self = Self(1 << 1);
    pub const ROUND_TO_NEAREST: Self = Self(1 << 2);
    pub const ROUND_TO_ZERO: Self = Self(1 << 3);
    pub const ROUND_TO_INF: Self = Self(1 << 4);
    pub const FMA: Self = Self(1 << 5);
    pub const SOFT_FLOAT: Self = Self(1 << 6);
    pub const CORRECTLY_ROUNDED_DIVIDE_SQRT: Self = Self(1 << 7);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromInfo for FpConfig {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Bitfield(v) => Some(FpConfig(v)),
            _ => None,
        }
    }
}

/// Kernel execution capability bits of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecCapabilities(pub u64);

impl ExecCapabilities {
    pub const KERNEL: Self = Self(1 << 0);
    pub const NATIVE_KERNEL: Self = Self(1 << 1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl FromInfo for ExecCapabilities {
    fn from_info(value: InfoValue) -> Option<Self> {
        match value {
            InfoValue::Bitfield(v) => Some(ExecCapabilities(v)),
            _ => None,
        }
    }
}

/// Compile-time binding of a platform marker type to its parameter
pub trait PlatformInfo {
    type Output: FromInfo;
    const PARAM: PlatformParam;
}

/// Compile-time binding of a device marker type to its parameter
pub trait DeviceInfo {
    type Output: FromInfo;
    const PARAM: DeviceParam;
}

macro_rules! info_params {
    (
        $(#[$meta:meta])*
        $param:ident: $binding:ident in $module:ident {
            $( $variant:ident = $id:literal => $output:ty, $kind:ident, $strategy:ident, $name:literal; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $param {
            $( $variant, )+
        }

        impl $param {
            /// Every parameter, in table order
            pub const ALL: &'static [$param] = &[ $( $param::$variant, )+ ];

            /// Native parameter identifier
            pub const fn id(self) -> u32 {
                match self {
                    $( $param::$variant => $id, )+
                }
            }

            pub const fn kind(self) -> ValueKind {
                match self {
                    $( $param::$variant => ValueKind::$kind, )+
                }
            }

            pub const fn strategy(self) -> QueryStrategy {
                match self {
                    $( $param::$variant => QueryStrategy::$strategy, )+
                }
            }

            /// snake_case name used in fixture files and reports
            pub const fn name(self) -> &'static str {
                match self {
                    $( $param::$variant => $name, )+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|param| param.name() == name)
            }

            pub fn from_id(id: u32) -> Option<Self> {
                Self::ALL.iter().copied().find(|param| param.id() == id)
            }
        }

        impl std::fmt::Display for $param {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        /// Marker types binding each parameter to its result type
        pub mod $module {
            use super::*;

            $(
                #[derive(Debug, Clone, Copy, Default)]
                pub struct $variant;

                impl $binding for $variant {
                    type Output = $output;
                    const PARAM: $param = $param::$variant;
                }
            )+
        }
    };
}

info_params! {
    /// Queryable platform attributes
    PlatformParam: PlatformInfo in platform {
        Profile = 0x0900 => String, String, Typed, "profile";
        Version = 0x0901 => String, String, Typed, "version";
        Name = 0x0902 => String, String, Typed, "name";
        Vendor = 0x0903 => String, String, Typed, "vendor";
        Extensions = 0x0904 => String, String, Typed, "extensions";
        HostTimerResolution = 0x0905 => u64, ULong, Typed, "host_timer_resolution";
        IcdSuffixKhr = 0x0920 => String, String, Raw, "icd_suffix_khr";
    }
}

info_params! {
    /// Queryable device attributes
    DeviceParam: DeviceInfo in device {
        Type = 0x1000 => DeviceType, Bitfield, Typed, "type";
        VendorId = 0x1001 => u32, UInt, Typed, "vendor_id";
        MaxComputeUnits = 0x1002 => u32, UInt, Typed, "max_compute_units";
        MaxWorkItemDimensions = 0x1003 => u32, UInt, Typed, "max_work_item_dimensions";
        MaxWorkGroupSize = 0x1004 => usize, Size, Typed, "max_work_group_size";
        MaxWorkItemSizes = 0x1005 => Vec<usize>, Sizes, Typed, "max_work_item_sizes";
        PreferredVectorWidthChar = 0x1006 => u32, UInt, Typed, "preferred_vector_width_char";
        PreferredVectorWidthShort = 0x1007 => u32, UInt, Typed, "preferred_vector_width_short";
        PreferredVectorWidthInt = 0x1008 => u32, UInt, Typed, "preferred_vector_width_int";
        PreferredVectorWidthLong = 0x1009 => u32, UInt, Typed, "preferred_vector_width_long";
        PreferredVectorWidthFloat = 0x100A => u32, UInt, Typed, "preferred_vector_width_float";
        PreferredVectorWidthDouble = 0x100B => u32, UInt, Typed, "preferred_vector_width_double";
        MaxClockFrequency = 0x100C => u32, UInt, Typed, "max_clock_frequency";
        AddressBits = 0x100D => u32, UInt, Typed, "address_bits";
        MaxMemAllocSize = 0x1010 => u64, ULong, Typed, "max_mem_alloc_size";
        ImageSupport = 0x1016 => bool, Bool, Typed, "image_support";
        MaxParameterSize = 0x1017 => usize, Size, Typed, "max_parameter_size";
        MaxSamplers = 0x1018 => u32, UInt, Typed, "max_samplers";
        MemBaseAddrAlign = 0x1019 => u32, UInt, Typed, "mem_base_addr_align";
        SingleFpConfig = 0x101B => FpConfig, Bitfield, Typed, "single_fp_config";
        GlobalMemCachelineSize = 0x101D => u32, UInt, Typed, "global_mem_cacheline_size";
        GlobalMemCacheSize = 0x101E => u64, ULong, Typed, "global_mem_cache_size";
        GlobalMemSize = 0x101F => u64, ULong, Typed, "global_mem_size";
        MaxConstantBufferSize = 0x1020 => u64, ULong, Typed, "max_constant_buffer_size";
        MaxConstantArgs = 0x1021 => u32, UInt, Typed, "max_constant_args";
        LocalMemSize = 0x1023 => u64, ULong, Typed, "local_mem_size";
        ErrorCorrectionSupport = 0x1024 => bool, Bool, Typed, "error_correction_support";
        ProfilingTimerResolution = 0x1025 => usize, Size, Typed, "profiling_timer_resolution";
        EndianLittle = 0x1026 => bool, Bool, Typed, "endian_little";
        Available = 0x1027 => bool, Bool, Typed, "available";
        CompilerAvailable = 0x1028 => bool, Bool, Typed, "compiler_available";
        ExecutionCapabilities = 0x1029 => ExecCapabilities, Bitfield, Typed, "execution_capabilities";
        Name = 0x102B => String, String, Typed, "name";
        Vendor = 0x102C => String, String, Typed, "vendor";
        DriverVersion = 0x102D => String, String, Typed, "driver_version";
        Profile = 0x102E => String, String, Typed, "profile";
        Version = 0x102F => String, String, Typed, "version";
        Extensions = 0x1030 => String, String, Typed, "extensions";
        Platform = 0x1031 => PlatformId, Handle, Typed, "platform";
        DoubleFpConfig = 0x1032 => FpConfig, Bitfield, Typed, "double_fp_config";
        HalfFpConfig = 0x1033 => FpConfig, Bitfield, Raw, "half_fp_config";
        PreferredVectorWidthHalf = 0x1034 => u32, UInt, Typed, "preferred_vector_width_half";
        HostUnifiedMemory = 0x1035 => bool, Bool, Typed, "host_unified_memory";
        NativeVectorWidthChar = 0x1036 => u32, UInt, Typed, "native_vector_width_char";
        NativeVectorWidthShort = 0x1037 => u32, UInt, Typed, "native_vector_width_short";
        NativeVectorWidthInt = 0x1038 => u32, UInt, Typed, "native_vector_width_int";
        NativeVectorWidthLong = 0x1039 => u32, UInt, Typed, "native_vector_width_long";
        NativeVectorWidthFloat = 0x103A => u32, UInt, Typed, "native_vector_width_float";
        NativeVectorWidthDouble = 0x103B => u32, UInt, Typed, "native_vector_width_double";
        NativeVectorWidthHalf = 0x103C => u32, UInt, Typed, "native_vector_width_half";
        OpenclCVersion = 0x103D => String, String, Typed, "opencl_c_version";
        LinkerAvailable = 0x103E => bool, Bool, Typed, "linker_available";
        BuiltInKernels = 0x103F => String, String, Typed, "built_in_kernels";
        ParentDevice = 0x1042 => Option<DeviceId>, Handle, Typed, "parent_device";
        PartitionMaxSubDevices = 0x1043 => u32, UInt, Typed, "partition_max_sub_devices";
        PartitionProperties = 0x1044 => Vec<isize>, Properties, Typed, "partition_properties";
        ComputeCapabilityMajorNv = 0x4000 => u32, UInt, Raw, "compute_capability_major_nv";
        ComputeCapabilityMinorNv = 0x4001 => u32, UInt, Raw, "compute_capability_minor_nv";
        RegistersPerBlockNv = 0x4002 => u32, UInt, Raw, "registers_per_block_nv";
        WarpSizeNv = 0x4003 => u32, UInt, Raw, "warp_size_nv";
        BoardNameAmd = 0x4038 => String, String, Raw, "board_name_amd";
        GlobalFreeMemoryAmd = 0x4039 => Vec<usize>, Sizes, Raw, "global_free_memory_amd";
    }
}

/// Query a platform attribute with the strategy registered for it
///
/// Failures (including a value of the wrong shape) are platform errors.
pub fn query_platform<P: PlatformInfo>(api: &dyn ComputeApi, id: PlatformId) -> Result<P::Output> {
    if id.is_null() {
        return Err(Error::InvalidPlatform(NativeCode::INVALID_PLATFORM));
    }
    let param = P::PARAM;
    let value = match param.strategy() {
        QueryStrategy::Typed => api.platform_info(id, param).map_err(Error::InvalidPlatform)?,
        QueryStrategy::Raw => {
            trace!(platform = %id, param = %param, "Raw platform query");
            let bytes = api
                .platform_info_raw(id, param.id(), param.kind().raw_capacity())
                .map_err(Error::InvalidPlatform)?;
            InfoValue::from_bytes(param.kind(), &bytes)
                .ok_or(Error::InvalidPlatform(NativeCode::INVALID_VALUE))?
        }
    };
    P::Output::from_info(value).ok_or(Error::InvalidPlatform(NativeCode::INVALID_VALUE))
}

/// Query a device attribute with the strategy registered for it
///
/// Failures (including a value of the wrong shape) are device errors.
pub fn query_device<P: DeviceInfo>(api: &dyn ComputeApi, id: DeviceId) -> Result<P::Output> {
    if id.is_null() {
        return Err(Error::InvalidDevice(NativeCode::INVALID_DEVICE));
    }
    let param = P::PARAM;
    let value = match param.strategy() {
        QueryStrategy::Typed => api.device_info(id, param).map_err(Error::InvalidDevice)?,
        QueryStrategy::Raw => {
            trace!(device = %id, param = %param, "Raw device query");
            let bytes = api
                .device_info_raw(id, param.id(), param.kind().raw_capacity())
                .map_err(Error::InvalidDevice)?;
            InfoValue::from_bytes(param.kind(), &bytes)
                .ok_or(Error::InvalidDevice(NativeCode::INVALID_VALUE))?
        }
    };
    P::Output::from_info(value).ok_or(Error::InvalidDevice(NativeCode::INVALID_VALUE))
}

/// Scalar element types with native/preferred vector width attributes
pub trait VectorElement {
    type Native: DeviceInfo<Output = u32>;
    type Preferred: DeviceInfo<Output = u32>;
}

/// Marker for the 16-bit floating-point element type
#[derive(Debug, Clone, Copy, Default)]
pub struct Half;

macro_rules! vector_elements {
    ($( $ty:ty => $native:ident, $preferred:ident; )+) => {
        $(
            impl VectorElement for $ty {
                type Native = device::$native;
                type Preferred = device::$preferred;
            }
        )+
    };
}

vector_elements! {
    i8 => NativeVectorWidthChar, PreferredVectorWidthChar;
    u8 => NativeVectorWidthChar, PreferredVectorWidthChar;
    i16 => NativeVectorWidthShort, PreferredVectorWidthShort;
    u16 => NativeVectorWidthShort, PreferredVectorWidthShort;
    i32 => NativeVectorWidthInt, PreferredVectorWidthInt;
    u32 => NativeVectorWidthInt, PreferredVectorWidthInt;
    i64 => NativeVectorWidthLong, PreferredVectorWidthLong;
    u64 => NativeVectorWidthLong, PreferredVectorWidthLong;
    f32 => NativeVectorWidthFloat, PreferredVectorWidthFloat;
    f64 => NativeVectorWidthDouble, PreferredVectorWidthDouble;
    Half => NativeVectorWidthHalf, PreferredVectorWidthHalf;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_param_tables_are_unique() {
        let ids: HashSet<u32> = DeviceParam::ALL.iter().map(|p| p.id()).collect();
        assert_eq!(ids.len(), DeviceParam::ALL.len());
        let names: HashSet<&str> = DeviceParam::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), DeviceParam::ALL.len());

        let ids: HashSet<u32> = PlatformParam::ALL.iter().map(|p| p.id()).collect();
        assert_eq!(ids.len(), PlatformParam::ALL.len());
    }

    #[test]
    fn test_param_lookup() {
        assert_eq!(DeviceParam::from_name("max_compute_units"), Some(DeviceParam::MaxComputeUnits));
        assert_eq!(DeviceParam::from_id(0x102B), Some(DeviceParam::Name));
        assert_eq!(PlatformParam::from_name("icd_suffix_khr"), Some(PlatformParam::IcdSuffixKhr));
        assert_eq!(DeviceParam::from_name("no_such_attribute"), None);
    }

    #[test]
    fn test_raw_subset() {
        let raw: Vec<DeviceParam> = DeviceParam::ALL
            .iter()
            .copied()
            .filter(|p| p.strategy() == QueryStrategy::Raw)
            .collect();
        assert!(raw.contains(&DeviceParam::HalfFpConfig));
        assert!(raw.contains(&DeviceParam::WarpSizeNv));
        assert!(!raw.contains(&DeviceParam::Name));
        assert_eq!(PlatformParam::IcdSuffixKhr.strategy(), QueryStrategy::Raw);
        assert_eq!(PlatformParam::Name.strategy(), QueryStrategy::Typed);
    }

    #[test]
    fn test_marker_binding() {
        assert_eq!(<device::GlobalMemSize as DeviceInfo>::PARAM, DeviceParam::GlobalMemSize);
        assert_eq!(<platform::Vendor as PlatformInfo>::PARAM, PlatformParam::Vendor);
        assert_eq!(
            <<f64 as VectorElement>::Native as DeviceInfo>::PARAM,
            DeviceParam::NativeVectorWidthDouble
        );
    }

    #[test]
    fn test_raw_string_stops_at_nul() {
        let mut bytes = b"NV".to_vec();
        bytes.extend_from_slice(&[0, b'x', b'y']);
        assert_eq!(
            InfoValue::from_bytes(ValueKind::String, &bytes),
            Some(InfoValue::String("NV".to_string()))
        );
    }

    #[test]
    fn test_raw_scalar_needs_enough_bytes() {
        assert_eq!(InfoValue::from_bytes(ValueKind::UInt, &[1, 0]), None);
        let bytes = InfoValue::Bool(true).to_bytes();
        assert_eq!(bytes.len(), 4);
        assert_eq!(InfoValue::from_bytes(ValueKind::Bool, &bytes), Some(InfoValue::Bool(true)));
    }

    #[test]
    fn test_from_info_rejects_wrong_shape() {
        assert_eq!(u32::from_info(InfoValue::ULong(3)), None);
        assert_eq!(<Option<DeviceId>>::from_info(InfoValue::Handle(0)), Some(None));
        assert_eq!(
            <Option<DeviceId>>::from_info(InfoValue::Handle(7)),
            Some(Some(DeviceId(7)))
        );
    }

    #[test]
    fn test_info_value_serde_keeps_kind() {
        let values = vec![
            InfoValue::String("pocl".to_string()),
            InfoValue::UInt(5),
            InfoValue::ULong(5),
            InfoValue::Size(5),
            InfoValue::Bool(true),
            InfoValue::Sizes(vec![1024, 64]),
            InfoValue::Bitfield(4),
            InfoValue::Handle(0x1000),
            InfoValue::Properties(vec![0x1086, 0x1087]),
            InfoValue::ULong(u64::MAX),
        ];
        for value in values {
            let json = serde_json::to_string(&value).unwrap();
            let back: InfoValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), value.kind(), "{}", json);
            assert_eq!(back, value);
        }
        assert_eq!(
            serde_json::to_string(&InfoValue::ULong(5)).unwrap(),
            r#"{"kind":"ulong","value":5}"#
        );
    }

    #[test]
    fn test_fp_config_bits() {
        let cfg = FpConfig::INF_NAN.union(FpConfig::ROUND_TO_NEAREST);
        assert!(cfg.contains(FpConfig::INF_NAN));
        assert!(!cfg.contains(FpConfig::DENORM.union(FpConfig::INF_NAN)));
        assert!(FpConfig::default().is_empty());
    }
}
