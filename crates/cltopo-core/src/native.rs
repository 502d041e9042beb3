//! Collaborator backed by the system OpenCL ICD loader
//!
//! Enumeration and partitioning go through `opencl3`; attribute queries use
//! the lower-level `cl3` calls so both query strategies map directly onto a
//! runtime entry point.

use cl3::info_type::InfoType;
use cl3::types::{cl_device_id, cl_device_partition_property, cl_platform_id};
use opencl3::device::{Device as ClDevice, CL_DEVICE_TYPE_DEFAULT};
use opencl3::error_codes::ClError;
use opencl3::platform::{get_platforms, Platform as ClPlatform};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::api::{ComputeApi, DeviceId, DeviceType, PartitionSpec, PlatformId};
use crate::error::NativeCode;
use crate::info::{DeviceParam, InfoValue, PlatformParam, ValueKind};

const PARTITION_EQUALLY: cl_device_partition_property = 0x1086;
const PARTITION_BY_COUNTS: cl_device_partition_property = 0x1087;
const PARTITION_BY_COUNTS_LIST_END: cl_device_partition_property = 0;
const PARTITION_PROPERTIES_END: cl_device_partition_property = 0;

/// Process-level default selection; OpenCL itself has none
#[derive(Debug, Default)]
struct Defaults {
    platform: Option<PlatformId>,
    device: Option<DeviceId>,
}

/// [`ComputeApi`] over the installed OpenCL runtime
#[derive(Debug, Default)]
pub struct OpenClApi {
    defaults: Mutex<Defaults>,
}

impl OpenClApi {
    pub fn new() -> Self {
        Self::default()
    }
}

fn platform_handle(id: PlatformId) -> cl_platform_id {
    id.0 as cl_platform_id
}

fn device_handle(id: DeviceId) -> cl_device_id {
    id.0 as cl_device_id
}

fn native(err: ClError) -> NativeCode {
    NativeCode(err.0)
}

impl ComputeApi for OpenClApi {
    fn platform_ids(&self) -> Result<Vec<PlatformId>, NativeCode> {
        let platforms = get_platforms().map_err(native)?;
        Ok(platforms.iter().map(|p| PlatformId(p.id() as usize)).collect())
    }

    fn device_ids(&self, platform: PlatformId, filter: DeviceType) -> Result<Vec<DeviceId>, NativeCode> {
        let ids = ClPlatform::new(platform_handle(platform))
            .get_devices(filter.bits())
            .map_err(native)?;
        Ok(ids.into_iter().map(|id| DeviceId(id as usize)).collect())
    }

    fn platform_info(&self, platform: PlatformId, param: PlatformParam) -> Result<InfoValue, NativeCode> {
        let info = cl3::platform::get_platform_info(platform_handle(platform), param.id()).map_err(NativeCode)?;
        decode(param.kind(), info)
    }

    fn platform_info_raw(&self, platform: PlatformId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode> {
        let bytes = cl3::platform::get_platform_data(platform_handle(platform), param_id).map_err(NativeCode)?;
        fit_capacity(bytes, param_id, capacity)
    }

    fn device_info(&self, device: DeviceId, param: DeviceParam) -> Result<InfoValue, NativeCode> {
        let info = cl3::device::get_device_info(device_handle(device), param.id()).map_err(NativeCode)?;
        decode(param.kind(), info)
    }

    fn device_info_raw(&self, device: DeviceId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode> {
        let bytes = cl3::device::get_device_data(device_handle(device), param_id).map_err(NativeCode)?;
        fit_capacity(bytes, param_id, capacity)
    }

    fn create_subdevices(&self, device: DeviceId, spec: &PartitionSpec) -> Result<Vec<DeviceId>, NativeCode> {
        let properties = partition_properties(spec);
        let ids = ClDevice::new(device_handle(device))
            .create_sub_devices(&properties)
            .map_err(native)?;
        debug!(device = %device, created = ids.len(), "Native sub-devices created");
        Ok(ids.into_iter().map(|id| DeviceId(id as usize)).collect())
    }

    fn default_platform(&self) -> Result<PlatformId, NativeCode> {
        if let Some(platform) = self.defaults.lock().platform {
            return Ok(platform);
        }
        self.platform_ids()?
            .first()
            .copied()
            .ok_or(NativeCode::PLATFORM_NOT_FOUND_KHR)
    }

    fn set_default_platform(&self, platform: PlatformId) -> Result<(), NativeCode> {
        let mut defaults = self.defaults.lock();
        defaults.platform = Some(platform);
        defaults.device = None;
        Ok(())
    }

    /// First `CL_DEVICE_TYPE_DEFAULT` device of the default platform unless
    /// one was set
    fn default_device(&self) -> Result<DeviceId, NativeCode> {
        if let Some(device) = self.defaults.lock().device {
            return Ok(device);
        }
        let platform = self.default_platform()?;
        self.device_ids(platform, DeviceType(CL_DEVICE_TYPE_DEFAULT))?
            .first()
            .copied()
            .ok_or(NativeCode::DEVICE_NOT_FOUND)
    }

    fn set_default_device(&self, device: DeviceId) -> Result<(), NativeCode> {
        self.defaults.lock().device = Some(device);
        Ok(())
    }

    fn unload_compiler(&self, platform: PlatformId) -> Result<(), NativeCode> {
        // SAFETY: the handle came from platform enumeration and platforms
        // are never released by the ICD loader
        unsafe { ClPlatform::new(platform_handle(platform)).unload_compiler() }.map_err(native)
    }
}

/// The runtime refuses a buffer smaller than the value with `INVALID_VALUE`
fn fit_capacity(bytes: Vec<u8>, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode> {
    if bytes.len() > capacity {
        trace!(param = param_id, size = bytes.len(), capacity, "Raw value exceeds buffer");
        return Err(NativeCode::INVALID_VALUE);
    }
    Ok(bytes)
}

fn partition_properties(spec: &PartitionSpec) -> Vec<cl_device_partition_property> {
    match spec {
        PartitionSpec::Equally(units) => vec![
            PARTITION_EQUALLY,
            *units as cl_device_partition_property,
            PARTITION_PROPERTIES_END,
        ],
        PartitionSpec::ByCounts(counts) => {
            let mut properties = Vec::with_capacity(counts.len() + 3);
            properties.push(PARTITION_BY_COUNTS);
            properties.extend(counts.iter().map(|&c| c as cl_device_partition_property));
            properties.push(PARTITION_BY_COUNTS_LIST_END);
            properties.push(PARTITION_PROPERTIES_END);
            properties
        }
    }
}

/// Map a typed-accessor result onto the parameter's value kind
fn decode(kind: ValueKind, info: InfoType) -> Result<InfoValue, NativeCode> {
    let value = match (kind, info) {
        (ValueKind::String, InfoType::VecUchar(bytes)) => InfoValue::from_bytes(ValueKind::String, &bytes),
        (ValueKind::UInt, InfoType::Uint(v)) => Some(InfoValue::UInt(v)),
        (ValueKind::Bool, InfoType::Uint(v)) => Some(InfoValue::Bool(v != 0)),
        (ValueKind::ULong, InfoType::Ulong(v)) => Some(InfoValue::ULong(v)),
        (ValueKind::Bitfield, InfoType::Ulong(v)) => Some(InfoValue::Bitfield(v)),
        (ValueKind::Size, InfoType::Size(v)) => Some(InfoValue::Size(v)),
        (ValueKind::Handle, InfoType::Ptr(v)) => Some(InfoValue::Handle(v as usize)),
        (ValueKind::Sizes, InfoType::VecSize(v)) => Some(InfoValue::Sizes(v)),
        (ValueKind::Properties, InfoType::VecIntPtr(v)) => Some(InfoValue::Properties(v)),
        _ => None,
    };
    value.ok_or(NativeCode::INVALID_VALUE)
}
