//! Compute devices and sub-devices

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::api::{ComputeApi, DetachedApi, DeviceId, DeviceType, PartitionSpec, PlatformId};
use crate::error::{Error, NativeCode, Result};
use crate::info::{self, query_device, DeviceInfo, ExecCapabilities, FpConfig, VectorElement};
use crate::platform::{Platform, Version};
use crate::registry::{Registry, RegistryHandle};

/// One compute device, either enumerated by a platform or created by
/// partitioning another device
///
/// Only the identity is stored; every attribute accessor queries the
/// runtime again. Two devices are equal when their ids are equal.
#[derive(Clone)]
pub struct Device {
    id: DeviceId,
    parent_id: Option<DeviceId>,
    platform_id: PlatformId,
    api: Arc<dyn ComputeApi>,
    registry: RegistryHandle,
}

impl Device {
    /// Device enumerated directly by a platform
    pub(crate) fn root(
        id: DeviceId,
        platform_id: PlatformId,
        api: Arc<dyn ComputeApi>,
        registry: RegistryHandle,
    ) -> Self {
        Self {
            id,
            parent_id: None,
            platform_id,
            api,
            registry,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Id of the device this one was partitioned from
    pub fn parent_id(&self) -> Option<DeviceId> {
        self.parent_id
    }

    pub fn platform_id(&self) -> PlatformId {
        self.platform_id
    }

    pub fn is_subdevice(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Query any device attribute by its marker type
    pub fn info<P: DeviceInfo>(&self) -> Result<P::Output> {
        query_device::<P>(self.api.as_ref(), self.id)
    }

    /// Resolve the owning platform through the registry's published epoch
    ///
    /// Never detects. Fails with `INVALID_DEVICE` when the registry is gone,
    /// has nothing published, or no longer knows the platform (for example
    /// after a forced re-detection).
    pub fn get_platform(&self) -> Result<Platform> {
        self.registry
            .upgrade()
            .and_then(|registry| registry.current())
            .and_then(|epoch| epoch.find_platform(self.platform_id).cloned())
            .ok_or(Error::InvalidDevice(NativeCode::INVALID_DEVICE))
    }

    // Identification

    pub fn name(&self) -> Result<String> {
        self.info::<info::device::Name>()
    }

    pub fn vendor(&self) -> Result<String> {
        self.info::<info::device::Vendor>()
    }

    pub fn vendor_id(&self) -> Result<u32> {
        self.info::<info::device::VendorId>()
    }

    /// Full version string, e.g. `"OpenCL 3.0 CUDA"`
    pub fn version(&self) -> Result<String> {
        self.info::<info::device::Version>()
    }

    /// Parsed version; device version strings share the platform format
    pub fn version_info(&self) -> Result<Version> {
        Version::parse(&self.version()?).ok_or(Error::InvalidDevice(NativeCode::INVALID_VALUE))
    }

    /// True when the device supports at least `major.minor`
    pub fn check_version(&self, major: u32, minor: u32) -> Result<bool> {
        Ok(self.version_info()?.is_at_least(major, minor))
    }

    pub fn driver_version(&self) -> Result<String> {
        self.info::<info::device::DriverVersion>()
    }

    pub fn opencl_c_version(&self) -> Result<String> {
        self.info::<info::device::OpenclCVersion>()
    }

    pub fn profile(&self) -> Result<String> {
        self.info::<info::device::Profile>()
    }

    /// Space-separated extension list split into names
    pub fn extensions(&self) -> Result<Vec<String>> {
        Ok(split_list(&self.info::<info::device::Extensions>()?, ' '))
    }

    pub fn has_extension(&self, name: &str) -> Result<bool> {
        Ok(self.extensions()?.iter().any(|ext| ext == name))
    }

    /// Semicolon-separated built-in kernel list split into names
    pub fn built_in_kernels(&self) -> Result<Vec<String>> {
        Ok(split_list(&self.info::<info::device::BuiltInKernels>()?, ';'))
    }

    // Classification

    pub fn devtype(&self) -> Result<DeviceType> {
        self.info::<info::device::Type>()
    }

    /// True when the device belongs to class `ty`; `DeviceType::ALL` always matches
    pub fn is_devtype(&self, ty: DeviceType) -> Result<bool> {
        if ty == DeviceType::ALL {
            return Ok(true);
        }
        Ok(self.devtype()?.intersects(ty))
    }

    pub fn is_cpu(&self) -> Result<bool> {
        self.is_devtype(DeviceType::CPU)
    }

    pub fn is_gpu(&self) -> Result<bool> {
        self.is_devtype(DeviceType::GPU)
    }

    pub fn is_accelerator(&self) -> Result<bool> {
        self.is_devtype(DeviceType::ACCELERATOR)
    }

    // Availability

    pub fn is_available(&self) -> Result<bool> {
        self.info::<info::device::Available>()
    }

    pub fn is_compiler_available(&self) -> Result<bool> {
        self.info::<info::device::CompilerAvailable>()
    }

    pub fn is_linker_available(&self) -> Result<bool> {
        self.info::<info::device::LinkerAvailable>()
    }

    pub fn is_little_endian(&self) -> Result<bool> {
        self.info::<info::device::EndianLittle>()
    }

    pub fn has_error_correction(&self) -> Result<bool> {
        self.info::<info::device::ErrorCorrectionSupport>()
    }

    pub fn has_unified_memory(&self) -> Result<bool> {
        self.info::<info::device::HostUnifiedMemory>()
    }

    pub fn has_image_support(&self) -> Result<bool> {
        self.info::<info::device::ImageSupport>()
    }

    pub fn can_execute_native_kernels(&self) -> Result<bool> {
        Ok(self
            .info::<info::device::ExecutionCapabilities>()?
            .contains(ExecCapabilities::NATIVE_KERNEL))
    }

    // Compute resources

    pub fn address_bits(&self) -> Result<u32> {
        self.info::<info::device::AddressBits>()
    }

    pub fn max_compute_units(&self) -> Result<u32> {
        self.info::<info::device::MaxComputeUnits>()
    }

    /// Clock frequency in MHz
    pub fn max_clock_frequency(&self) -> Result<u32> {
        self.info::<info::device::MaxClockFrequency>()
    }

    pub fn max_work_item_dimensions(&self) -> Result<u32> {
        self.info::<info::device::MaxWorkItemDimensions>()
    }

    pub fn max_work_group_size(&self) -> Result<usize> {
        self.info::<info::device::MaxWorkGroupSize>()
    }

    pub fn max_work_item_sizes(&self) -> Result<Vec<usize>> {
        self.info::<info::device::MaxWorkItemSizes>()
    }

    pub fn max_parameter_size(&self) -> Result<usize> {
        self.info::<info::device::MaxParameterSize>()
    }

    pub fn max_samplers(&self) -> Result<u32> {
        self.info::<info::device::MaxSamplers>()
    }

    /// Timer resolution in nanoseconds
    pub fn profiling_timer_resolution(&self) -> Result<usize> {
        self.info::<info::device::ProfilingTimerResolution>()
    }

    // Memory

    pub fn global_mem_size(&self) -> Result<u64> {
        self.info::<info::device::GlobalMemSize>()
    }

    pub fn global_mem_cache_size(&self) -> Result<u64> {
        self.info::<info::device::GlobalMemCacheSize>()
    }

    pub fn global_mem_cacheline_size(&self) -> Result<u32> {
        self.info::<info::device::GlobalMemCachelineSize>()
    }

    pub fn local_mem_size(&self) -> Result<u64> {
        self.info::<info::device::LocalMemSize>()
    }

    pub fn max_mem_alloc_size(&self) -> Result<u64> {
        self.info::<info::device::MaxMemAllocSize>()
    }

    pub fn max_constant_buffer_size(&self) -> Result<u64> {
        self.info::<info::device::MaxConstantBufferSize>()
    }

    /// Alignment in bits
    pub fn mem_base_addr_align(&self) -> Result<u32> {
        self.info::<info::device::MemBaseAddrAlign>()
    }

    // Floating point

    pub fn single_fp_config(&self) -> Result<FpConfig> {
        self.info::<info::device::SingleFpConfig>()
    }

    pub fn double_fp_config(&self) -> Result<FpConfig> {
        self.info::<info::device::DoubleFpConfig>()
    }

    pub fn half_fp_config(&self) -> Result<FpConfig> {
        self.info::<info::device::HalfFpConfig>()
    }

    /// Round-to-nearest and inf/NaN support for `f32`
    pub fn has_single_precision(&self) -> Result<bool> {
        Ok(self.single_fp_config()?.contains(SINGLE_PRECISION_REQUIRED))
    }

    /// Full IEEE 754 double support: correctly rounded divide/sqrt,
    /// round-to-nearest, inf/NaN and denormals
    pub fn has_double_precision(&self) -> Result<bool> {
        Ok(self.double_fp_config()?.contains(DOUBLE_PRECISION_REQUIRED))
    }

    pub fn has_half_precision(&self) -> Result<bool> {
        Ok(self.half_fp_config()?.contains(SINGLE_PRECISION_REQUIRED))
    }

    pub fn native_vector_width<T: VectorElement>(&self) -> Result<u32> {
        self.info::<T::Native>()
    }

    pub fn preferred_vector_width<T: VectorElement>(&self) -> Result<u32> {
        self.info::<T::Preferred>()
    }

    // Vendor extensions

    /// NVIDIA compute capability as `(major, minor)`
    pub fn compute_capability_nv(&self) -> Result<(u32, u32)> {
        Ok((
            self.info::<info::device::ComputeCapabilityMajorNv>()?,
            self.info::<info::device::ComputeCapabilityMinorNv>()?,
        ))
    }

    pub fn warp_size_nv(&self) -> Result<u32> {
        self.info::<info::device::WarpSizeNv>()
    }

    pub fn board_name_amd(&self) -> Result<String> {
        self.info::<info::device::BoardNameAmd>()
    }

    /// Free global memory in KiB, per memory pool
    pub fn global_free_memory_amd(&self) -> Result<Vec<usize>> {
        self.info::<info::device::GlobalFreeMemoryAmd>()
    }

    // Partitioning

    pub fn max_subdevices(&self) -> Result<u32> {
        self.info::<info::device::PartitionMaxSubDevices>()
    }

    /// Parent handle as reported by the runtime
    pub fn parent_device(&self) -> Result<Option<DeviceId>> {
        self.info::<info::device::ParentDevice>()
    }

    /// Split into as many sub-devices as possible with `units` compute
    /// units each
    ///
    /// `subdevices_equally(1)` yields `max_subdevices()` sub-devices on a
    /// device whose compute units are not the limiting factor.
    pub fn subdevices_equally(&self, units: u32) -> Result<Vec<Device>> {
        self.check_partitionable()?;
        if units == 0 {
            return Err(partition_count_error());
        }
        self.partition(PartitionSpec::Equally(units))
    }

    /// Split into one sub-device per entry of `counts`, each with that
    /// many compute units
    pub fn subdevices(&self, counts: &[u32]) -> Result<Vec<Device>> {
        let max = self.check_partitionable()?;
        if counts.is_empty() || counts.len() > max as usize || counts.contains(&0) {
            return Err(partition_count_error());
        }
        self.partition(PartitionSpec::ByCounts(counts.to_vec()))
    }

    /// Root device that can be split into at least two sub-devices;
    /// returns `max_subdevices()`
    fn check_partitionable(&self) -> Result<u32> {
        if self.id.is_null() {
            return Err(Error::InvalidDevice(NativeCode::INVALID_DEVICE));
        }
        if self.is_subdevice() {
            return Err(partition_count_error());
        }
        let max = self.max_subdevices()?;
        if max < 2 {
            return Err(partition_count_error());
        }
        Ok(max)
    }

    fn partition(&self, spec: PartitionSpec) -> Result<Vec<Device>> {
        let ids = self
            .api
            .create_subdevices(self.id, &spec)
            .map_err(Error::InvalidDevice)?;
        debug!(device = %self.id, ?spec, created = ids.len(), "Partitioned device");
        Ok(ids
            .into_iter()
            .map(|id| Device {
                id,
                parent_id: Some(self.id),
                platform_id: self.platform_id,
                api: Arc::clone(&self.api),
                registry: self.registry.clone(),
            })
            .collect())
    }

    // Process-wide defaults and lookups

    /// Default device of the global registry's runtime
    pub fn get_default() -> Result<Device> {
        Registry::global()?.default_device()
    }

    pub fn set_default(device: &Device) -> Result<()> {
        Registry::global()?.set_default_device(device)
    }

    /// Every device of the global registry whose type matches `ty`
    pub fn find_by_type(ty: DeviceType) -> Result<Vec<Device>> {
        Registry::global()?.find_devices_by_type(ty)
    }
}

const SINGLE_PRECISION_REQUIRED: FpConfig = FpConfig::ROUND_TO_NEAREST.union(FpConfig::INF_NAN);

const DOUBLE_PRECISION_REQUIRED: FpConfig = FpConfig::CORRECTLY_ROUNDED_DIVIDE_SQRT
    .union(FpConfig::ROUND_TO_NEAREST)
    .union(FpConfig::INF_NAN)
    .union(FpConfig::DENORM);

fn partition_count_error() -> Error {
    Error::InvalidDevice(NativeCode::INVALID_DEVICE_PARTITION_COUNT)
}

pub(crate) fn split_list(list: &str, separator: char) -> Vec<String> {
    list.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Placeholder with a null id; every query fails with `INVALID_DEVICE`
impl Default for Device {
    fn default() -> Self {
        Self {
            id: DeviceId::NULL,
            parent_id: None,
            platform_id: PlatformId::NULL,
            api: Arc::new(DetachedApi),
            registry: RegistryHandle::default(),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("platform_id", &self.platform_id)
            .finish()
    }
}
