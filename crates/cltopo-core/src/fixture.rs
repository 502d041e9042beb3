//! In-memory compute runtime described by a TOML topology file
//!
//! [`FixtureApi`] implements [`ComputeApi`] without any driver. It backs the
//! test suites and the `--fixture` mode of the command-line tool. Failures can
//! be injected per operation and the whole topology can be swapped at runtime
//! to exercise re-detection.
//!
//! ```toml
//! [[platform]]
//! name = "Fixture CUDA"
//! version = "OpenCL 3.0 CUDA 12.2.140"
//!
//! [[platform.device]]
//! type = "gpu|default"
//! max_compute_units = 16
//! single_fp_config = ["inf_nan", "round_to_nearest"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::api::{ComputeApi, DeviceId, DeviceType, PartitionSpec, PlatformId};
use crate::error::NativeCode;
use crate::info::{DeviceParam, FpConfig, InfoValue, PlatformParam, QueryStrategy, ValueKind};

/// First handle value handed out; keeps fixture ids visibly non-null
const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read fixture: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse fixture: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Unknown {entity} attribute: {name}")]
    UnknownAttribute { entity: &'static str, name: String },
    #[error("Attribute {name} does not hold a valid {kind:?} value")]
    InvalidValue { name: String, kind: ValueKind },
    #[error("Default {0} index out of range")]
    InvalidDefault(&'static str),
}

/// Parsed topology file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureIndex {
    /// Index of the default platform; the first platform when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_platform: Option<usize>,
    /// Index of the default device within the default platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_device: Option<usize>,
    #[serde(default)]
    pub platform: Vec<FixturePlatform>,
}

/// One `[[platform]]` table: attributes plus its `[[platform.device]]` list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixturePlatform {
    #[serde(default)]
    pub device: Vec<FixtureDevice>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureDevice {
    pub attributes: BTreeMap<String, toml::Value>,
}

impl FixtureIndex {
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, FixtureError> {
        let index: FixtureIndex = toml::from_str(content)?;
        Ok(index)
    }
}

/// Runtime entry points that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PlatformIds,
    DeviceIds,
    PlatformInfo,
    DeviceInfo,
    CreateSubdevices,
    Defaults,
    UnloadCompiler,
}

struct PlatformEntry {
    attributes: HashMap<PlatformParam, InfoValue>,
    devices: Vec<DeviceId>,
}

#[derive(Default)]
struct State {
    /// Platforms returned by enumeration, in order
    order: Vec<PlatformId>,
    /// Every platform ever loaded, including replaced ones
    platforms: HashMap<PlatformId, PlatformEntry>,
    /// Every device ever loaded or created, including sub-devices
    devices: HashMap<DeviceId, HashMap<DeviceParam, InfoValue>>,
    default_platform: Option<PlatformId>,
    default_device: Option<DeviceId>,
    failures: HashMap<Operation, NativeCode>,
}

impl State {
    fn fail_on(&self, operation: Operation) -> Result<(), NativeCode> {
        match self.failures.get(&operation) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }

    fn platform(&self, id: PlatformId) -> Result<&PlatformEntry, NativeCode> {
        self.platforms.get(&id).ok_or(NativeCode::INVALID_PLATFORM)
    }

    fn device(&self, id: DeviceId) -> Result<&HashMap<DeviceParam, InfoValue>, NativeCode> {
        self.devices.get(&id).ok_or(NativeCode::INVALID_DEVICE)
    }

    fn device_type(&self, id: DeviceId) -> DeviceType {
        match self.devices.get(&id).and_then(|attrs| attrs.get(&DeviceParam::Type)) {
            Some(InfoValue::Bitfield(bits)) => DeviceType(*bits),
            _ => DeviceType(0),
        }
    }

    fn resolved_default_platform(&self) -> Option<PlatformId> {
        self.default_platform.or_else(|| self.order.first().copied())
    }
}

/// Driverless [`ComputeApi`] with a configurable topology
pub struct FixtureApi {
    state: Mutex<State>,
    next_handle: AtomicUsize,
    enumerations: AtomicUsize,
    enumeration_delay: Mutex<Duration>,
}

impl FixtureApi {
    pub fn from_index(index: &FixtureIndex) -> Result<Self, FixtureError> {
        let api = Self {
            state: Mutex::new(State::default()),
            next_handle: AtomicUsize::new(FIRST_HANDLE),
            enumerations: AtomicUsize::new(0),
            enumeration_delay: Mutex::new(Duration::ZERO),
        };
        api.replace_topology(index)?;
        Ok(api)
    }

    pub fn from_toml(content: &str) -> Result<Self, FixtureError> {
        Self::from_index(&FixtureIndex::from_toml(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        Self::from_index(&FixtureIndex::from_file(path)?)
    }

    /// Install a new topology with fresh handles
    ///
    /// Handles from earlier topologies stay queryable but are no longer
    /// enumerated. Defaults are taken from the new index.
    pub fn replace_topology(&self, index: &FixtureIndex) -> Result<(), FixtureError> {
        let mut order = Vec::with_capacity(index.platform.len());
        let mut platforms = HashMap::new();
        let mut devices = HashMap::new();

        for entry in &index.platform {
            let id = PlatformId(self.allocate());
            let attributes = platform_attributes(&entry.attributes)?;
            let mut device_ids = Vec::with_capacity(entry.device.len());
            for device in &entry.device {
                let device_id = DeviceId(self.allocate());
                let mut attrs = device_attributes(&device.attributes)?;
                attrs.insert(DeviceParam::Platform, InfoValue::Handle(id.0));
                attrs.insert(DeviceParam::ParentDevice, InfoValue::Handle(0));
                devices.insert(device_id, attrs);
                device_ids.push(device_id);
            }
            platforms.insert(
                id,
                PlatformEntry {
                    attributes,
                    devices: device_ids,
                },
            );
            order.push(id);
        }

        let default_platform = match index.default_platform {
            Some(i) => Some(*order.get(i).ok_or(FixtureError::InvalidDefault("platform"))?),
            None => None,
        };
        let default_device = match index.default_device {
            Some(i) => {
                let device = default_platform
                    .or_else(|| order.first().copied())
                    .and_then(|platform| platforms.get(&platform))
                    .and_then(|entry: &PlatformEntry| entry.devices.get(i).copied())
                    .ok_or(FixtureError::InvalidDefault("device"))?;
                Some(device)
            }
            None => None,
        };

        debug!(platforms = order.len(), devices = devices.len(), "Fixture topology loaded");
        let mut state = self.state.lock();
        state.order = order;
        state.platforms.extend(platforms);
        state.devices.extend(devices);
        state.default_platform = default_platform;
        state.default_device = default_device;
        Ok(())
    }

    pub fn replace_topology_toml(&self, content: &str) -> Result<(), FixtureError> {
        self.replace_topology(&FixtureIndex::from_toml(content)?)
    }

    /// Number of platform enumerations performed so far
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Make every later call of `operation` fail with `code`
    pub fn inject_failure(&self, operation: Operation, code: NativeCode) {
        self.state.lock().failures.insert(operation, code);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Sleep this long inside every platform enumeration
    pub fn set_enumeration_delay(&self, delay: Duration) {
        *self.enumeration_delay.lock() = delay;
    }

    fn allocate(&self) -> usize {
        self.next_handle.fetch_add(HANDLE_STRIDE, Ordering::SeqCst)
    }
}

impl ComputeApi for FixtureApi {
    fn platform_ids(&self) -> Result<Vec<PlatformId>, NativeCode> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.enumeration_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let state = self.state.lock();
        state.fail_on(Operation::PlatformIds)?;
        if state.order.is_empty() {
            return Err(NativeCode::PLATFORM_NOT_FOUND_KHR);
        }
        Ok(state.order.clone())
    }

    fn device_ids(&self, platform: PlatformId, filter: DeviceType) -> Result<Vec<DeviceId>, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::DeviceIds)?;
        let ids: Vec<DeviceId> = state
            .platform(platform)?
            .devices
            .iter()
            .copied()
            .filter(|&id| filter == DeviceType::ALL || state.device_type(id).intersects(filter))
            .collect();
        if ids.is_empty() {
            return Err(NativeCode::DEVICE_NOT_FOUND);
        }
        Ok(ids)
    }

    fn platform_info(&self, platform: PlatformId, param: PlatformParam) -> Result<InfoValue, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::PlatformInfo)?;
        let entry = state.platform(platform)?;
        // The typed accessor only knows the core attributes
        if param.strategy() == QueryStrategy::Raw {
            return Err(NativeCode::INVALID_VALUE);
        }
        entry.attributes.get(&param).cloned().ok_or(NativeCode::INVALID_VALUE)
    }

    fn platform_info_raw(&self, platform: PlatformId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::PlatformInfo)?;
        let entry = state.platform(platform)?;
        let param = PlatformParam::from_id(param_id).ok_or(NativeCode::INVALID_VALUE)?;
        let value = entry.attributes.get(&param).ok_or(NativeCode::INVALID_VALUE)?;
        raw_image(value, capacity)
    }

    fn device_info(&self, device: DeviceId, param: DeviceParam) -> Result<InfoValue, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::DeviceInfo)?;
        let attrs = state.device(device)?;
        if param.strategy() == QueryStrategy::Raw {
            return Err(NativeCode::INVALID_VALUE);
        }
        attrs.get(&param).cloned().ok_or(NativeCode::INVALID_VALUE)
    }

    fn device_info_raw(&self, device: DeviceId, param_id: u32, capacity: usize) -> Result<Vec<u8>, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::DeviceInfo)?;
        let attrs = state.device(device)?;
        let param = DeviceParam::from_id(param_id).ok_or(NativeCode::INVALID_VALUE)?;
        let value = attrs.get(&param).ok_or(NativeCode::INVALID_VALUE)?;
        raw_image(value, capacity)
    }

    fn create_subdevices(&self, device: DeviceId, spec: &PartitionSpec) -> Result<Vec<DeviceId>, NativeCode> {
        let mut state = self.state.lock();
        state.fail_on(Operation::CreateSubdevices)?;
        let parent = state.device(device)?.clone();
        let units = uint_attribute(&parent, DeviceParam::MaxComputeUnits);
        let max = uint_attribute(&parent, DeviceParam::PartitionMaxSubDevices);
        if max < 2 {
            return Err(NativeCode::DEVICE_PARTITION_FAILED);
        }

        let sizes = match spec {
            PartitionSpec::Equally(size) => {
                if *size == 0 || *size > units {
                    return Err(NativeCode::INVALID_DEVICE_PARTITION_COUNT);
                }
                vec![*size; (units / size).min(max) as usize]
            }
            PartitionSpec::ByCounts(counts) => {
                let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
                if counts.is_empty()
                    || counts.len() > max as usize
                    || counts.contains(&0)
                    || total > u64::from(units)
                {
                    return Err(NativeCode::INVALID_DEVICE_PARTITION_COUNT);
                }
                counts.clone()
            }
        };

        let mut ids = Vec::with_capacity(sizes.len());
        for size in sizes {
            let id = DeviceId(self.allocate());
            let mut attrs = parent.clone();
            attrs.insert(DeviceParam::MaxComputeUnits, InfoValue::UInt(size));
            attrs.insert(DeviceParam::PartitionMaxSubDevices, InfoValue::UInt(size));
            attrs.insert(DeviceParam::ParentDevice, InfoValue::Handle(device.0));
            state.devices.insert(id, attrs);
            ids.push(id);
        }
        Ok(ids)
    }

    fn default_platform(&self) -> Result<PlatformId, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::Defaults)?;
        state.resolved_default_platform().ok_or(NativeCode::INVALID_PLATFORM)
    }

    /// Also clears an explicit default device, which then follows the
    /// new platform
    fn set_default_platform(&self, platform: PlatformId) -> Result<(), NativeCode> {
        let mut state = self.state.lock();
        state.fail_on(Operation::Defaults)?;
        state.platform(platform)?;
        state.default_platform = Some(platform);
        state.default_device = None;
        Ok(())
    }

    fn default_device(&self) -> Result<DeviceId, NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::Defaults)?;
        if let Some(device) = state.default_device {
            return Ok(device);
        }
        state
            .resolved_default_platform()
            .and_then(|platform| state.platforms.get(&platform))
            .and_then(|entry| entry.devices.first().copied())
            .ok_or(NativeCode::DEVICE_NOT_FOUND)
    }

    fn set_default_device(&self, device: DeviceId) -> Result<(), NativeCode> {
        let mut state = self.state.lock();
        state.fail_on(Operation::Defaults)?;
        state.device(device)?;
        state.default_device = Some(device);
        Ok(())
    }

    fn unload_compiler(&self, platform: PlatformId) -> Result<(), NativeCode> {
        let state = self.state.lock();
        state.fail_on(Operation::UnloadCompiler)?;
        state.platform(platform).map(|_| ())
    }
}

impl std::fmt::Debug for FixtureApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FixtureApi")
            .field("platforms", &state.order)
            .field("enumerations", &self.enumerations())
            .finish()
    }
}

/// Byte image of `value`, refused when it does not fit `capacity`
fn raw_image(value: &InfoValue, capacity: usize) -> Result<Vec<u8>, NativeCode> {
    let bytes = value.to_bytes();
    if bytes.len() > capacity {
        return Err(NativeCode::INVALID_VALUE);
    }
    Ok(bytes)
}

fn uint_attribute(attrs: &HashMap<DeviceParam, InfoValue>, param: DeviceParam) -> u32 {
    match attrs.get(&param) {
        Some(InfoValue::UInt(v)) => *v,
        _ => 0,
    }
}

fn platform_attributes(
    raw: &BTreeMap<String, toml::Value>,
) -> Result<HashMap<PlatformParam, InfoValue>, FixtureError> {
    raw.iter()
        .map(|(name, value)| -> Result<_, FixtureError> {
            let param = PlatformParam::from_name(name).ok_or_else(|| FixtureError::UnknownAttribute {
                entity: "platform",
                name: name.clone(),
            })?;
            Ok((param, convert(name, param.kind(), value)?))
        })
        .collect()
}

fn device_attributes(
    raw: &BTreeMap<String, toml::Value>,
) -> Result<HashMap<DeviceParam, InfoValue>, FixtureError> {
    raw.iter()
        .map(|(name, value)| -> Result<_, FixtureError> {
            let param = DeviceParam::from_name(name).ok_or_else(|| FixtureError::UnknownAttribute {
                entity: "device",
                name: name.clone(),
            })?;
            Ok((param, convert(name, param.kind(), value)?))
        })
        .collect()
}

/// Convert a TOML value to the attribute's shape
///
/// Bitfields accept an integer, a device type string like `"gpu|default"`,
/// or an array of floating-point capability names. Handles are always
/// assigned by the loader and cannot be written.
fn convert(name: &str, kind: ValueKind, value: &toml::Value) -> Result<InfoValue, FixtureError> {
    use toml::Value;

    let converted = match (kind, value) {
        (ValueKind::String, Value::String(s)) => Some(InfoValue::String(s.clone())),
        (ValueKind::UInt, Value::Integer(v)) => u32::try_from(*v).ok().map(InfoValue::UInt),
        (ValueKind::ULong, Value::Integer(v)) => u64::try_from(*v).ok().map(InfoValue::ULong),
        (ValueKind::Size, Value::Integer(v)) => usize::try_from(*v).ok().map(InfoValue::Size),
        (ValueKind::Bool, Value::Boolean(v)) => Some(InfoValue::Bool(*v)),
        (ValueKind::Sizes, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_integer().and_then(|v| usize::try_from(v).ok()))
            .collect::<Option<Vec<_>>>()
            .map(InfoValue::Sizes),
        (ValueKind::Properties, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_integer().and_then(|v| isize::try_from(v).ok()))
            .collect::<Option<Vec<_>>>()
            .map(InfoValue::Properties),
        (ValueKind::Bitfield, Value::Integer(v)) => u64::try_from(*v).ok().map(InfoValue::Bitfield),
        (ValueKind::Bitfield, Value::String(s)) => s
            .parse::<DeviceType>()
            .ok()
            .map(|ty| InfoValue::Bitfield(ty.bits())),
        (ValueKind::Bitfield, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().and_then(fp_flag))
            .collect::<Option<Vec<_>>>()
            .map(|flags| {
                let bits = flags.into_iter().fold(FpConfig::default(), FpConfig::union);
                InfoValue::Bitfield(bits.0)
            }),
        _ => None,
    };

    converted.ok_or_else(|| FixtureError::InvalidValue {
        name: name.to_string(),
        kind,
    })
}

fn fp_flag(name: &str) -> Option<FpConfig> {
    let flag = match name {
        "denorm" => FpConfig::DENORM,
        "inf_nan" => FpConfig::INF_NAN,
        "round_to_nearest" => FpConfig::ROUND_TO_NEAREST,
        "round_to_zero" => FpConfig::ROUND_TO_ZERO,
        "round_to_inf" => FpConfig::ROUND_TO_INF,
        "fma" => FpConfig::FMA,
        "soft_float" => FpConfig::SOFT_FLOAT,
        "correctly_rounded_divide_sqrt" => FpConfig::CORRECTLY_ROUNDED_DIVIDE_SQRT,
        _ => return None,
    };
    Some(flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOPOLOGY: &str = include_str!("../fixtures/two_platforms.toml");

    fn fixture() -> FixtureApi {
        FixtureApi::from_toml(TOPOLOGY).unwrap()
    }

    fn gpu(api: &FixtureApi) -> DeviceId {
        let platforms = api.platform_ids().unwrap();
        api.device_ids(platforms[0], DeviceType::ALL).unwrap()[0]
    }

    #[test]
    fn test_enumeration_order_and_filter() {
        let api = fixture();
        let platforms = api.platform_ids().unwrap();
        assert_eq!(platforms.len(), 2);
        assert!(platforms.iter().all(|p| !p.is_null()));
        assert_eq!(api.device_ids(platforms[0], DeviceType::ALL).unwrap().len(), 1);
        assert_eq!(api.device_ids(platforms[1], DeviceType::ALL).unwrap().len(), 2);
        assert_eq!(api.device_ids(platforms[1], DeviceType::CPU).unwrap().len(), 1);
        assert_eq!(
            api.device_ids(platforms[1], DeviceType::GPU),
            Err(NativeCode::DEVICE_NOT_FOUND)
        );
        assert_eq!(
            api.device_ids(PlatformId(1), DeviceType::ALL),
            Err(NativeCode::INVALID_PLATFORM)
        );
        assert_eq!(api.enumerations(), 1);
    }

    #[test]
    fn test_loader_fills_handles() {
        let api = fixture();
        let platform = api.platform_ids().unwrap()[0];
        let device = gpu(&api);
        assert_eq!(
            api.device_info(device, DeviceParam::Platform),
            Ok(InfoValue::Handle(platform.0))
        );
        assert_eq!(
            api.device_info(device, DeviceParam::ParentDevice),
            Ok(InfoValue::Handle(0))
        );
    }

    #[test]
    fn test_attribute_shapes() {
        let api = fixture();
        let device = gpu(&api);
        assert_eq!(
            api.device_info(device, DeviceParam::Type),
            Ok(InfoValue::Bitfield((DeviceType::GPU | DeviceType::DEFAULT).bits()))
        );
        let expected = FpConfig::DENORM
            .union(FpConfig::INF_NAN)
            .union(FpConfig::ROUND_TO_NEAREST)
            .union(FpConfig::ROUND_TO_ZERO)
            .union(FpConfig::ROUND_TO_INF)
            .union(FpConfig::FMA);
        assert_eq!(
            api.device_info(device, DeviceParam::SingleFpConfig),
            Ok(InfoValue::Bitfield(expected.0))
        );
        assert_eq!(
            api.device_info(device, DeviceParam::PartitionProperties),
            Ok(InfoValue::Properties(vec![0x1086, 0x1087]))
        );
    }

    #[test]
    fn test_typed_and_raw_paths_are_separate() {
        let api = fixture();
        let device = gpu(&api);
        assert_eq!(
            api.device_info(device, DeviceParam::WarpSizeNv),
            Err(NativeCode::INVALID_VALUE)
        );
        let bytes = api
            .device_info_raw(device, DeviceParam::WarpSizeNv.id(), 4)
            .unwrap();
        assert_eq!(bytes, 32u32.to_ne_bytes().to_vec());

        let platform = api.platform_ids().unwrap()[0];
        assert_eq!(
            api.platform_info(platform, PlatformParam::IcdSuffixKhr),
            Err(NativeCode::INVALID_VALUE)
        );
        assert_eq!(
            api.platform_info_raw(platform, PlatformParam::IcdSuffixKhr.id(), 1024),
            Ok(b"NV\0".to_vec())
        );
    }

    #[test]
    fn test_raw_query_respects_capacity() {
        let api = fixture();
        let device = gpu(&api);
        assert_eq!(
            api.device_info_raw(device, DeviceParam::Name.id(), 4),
            Err(NativeCode::INVALID_VALUE)
        );
        assert_eq!(
            api.device_info_raw(device, 0xFFFF, 1024),
            Err(NativeCode::INVALID_VALUE)
        );
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let err = FixtureApi::from_toml("[[platform]]\nbogus = 1\n").unwrap_err();
        assert!(matches!(
            err,
            FixtureError::UnknownAttribute { entity: "platform", ref name } if name == "bogus"
        ));
    }

    #[test]
    fn test_wrong_value_shape_rejected() {
        let err = FixtureApi::from_toml("[[platform]]\nname = 3\n").unwrap_err();
        assert!(matches!(err, FixtureError::InvalidValue { kind: ValueKind::String, .. }));

        let err = FixtureApi::from_toml("[[platform]]\n[[platform.device]]\nmax_compute_units = -1\n")
            .unwrap_err();
        assert!(matches!(err, FixtureError::InvalidValue { kind: ValueKind::UInt, .. }));

        let err = FixtureApi::from_toml("[[platform]]\n[[platform.device]]\nparent_device = 7\n")
            .unwrap_err();
        assert!(matches!(err, FixtureError::InvalidValue { kind: ValueKind::Handle, .. }));
    }

    #[test]
    fn test_empty_topology_reports_no_platforms() {
        let api = FixtureApi::from_toml("").unwrap();
        assert_eq!(api.platform_ids(), Err(NativeCode::PLATFORM_NOT_FOUND_KHR));
        assert_eq!(api.default_platform(), Err(NativeCode::INVALID_PLATFORM));
    }

    #[test]
    fn test_default_indexes() {
        let content = format!("default_platform = 1\ndefault_device = 1\n{}", TOPOLOGY);
        let api = FixtureApi::from_toml(&content).unwrap();
        let platforms = api.platform_ids().unwrap();
        assert_eq!(api.default_platform(), Ok(platforms[1]));
        let devices = api.device_ids(platforms[1], DeviceType::ALL).unwrap();
        assert_eq!(api.default_device(), Ok(devices[1]));

        let content = format!("default_platform = 5\n{}", TOPOLOGY);
        assert!(matches!(
            FixtureApi::from_toml(&content),
            Err(FixtureError::InvalidDefault("platform"))
        ));
    }

    #[test]
    fn test_set_default_platform_moves_default_device() {
        let api = fixture();
        let platforms = api.platform_ids().unwrap();
        api.set_default_platform(platforms[1]).unwrap();
        let first = api.device_ids(platforms[1], DeviceType::ALL).unwrap()[0];
        assert_eq!(api.default_device(), Ok(first));
        assert_eq!(
            api.set_default_platform(PlatformId(3)),
            Err(NativeCode::INVALID_PLATFORM)
        );
        assert_eq!(api.set_default_device(DeviceId(3)), Err(NativeCode::INVALID_DEVICE));
    }

    #[test]
    fn test_partition_limits() {
        let api = fixture();
        let device = gpu(&api);
        assert_eq!(api.create_subdevices(device, &PartitionSpec::Equally(1)).unwrap().len(), 4);
        assert_eq!(api.create_subdevices(device, &PartitionSpec::Equally(16)).unwrap().len(), 1);
        assert_eq!(
            api.create_subdevices(device, &PartitionSpec::Equally(17)),
            Err(NativeCode::INVALID_DEVICE_PARTITION_COUNT)
        );
        assert_eq!(
            api.create_subdevices(device, &PartitionSpec::ByCounts(vec![8, 9])),
            Err(NativeCode::INVALID_DEVICE_PARTITION_COUNT)
        );

        let subs = api
            .create_subdevices(device, &PartitionSpec::ByCounts(vec![3, 5]))
            .unwrap();
        assert_eq!(
            api.device_info(subs[1], DeviceParam::MaxComputeUnits),
            Ok(InfoValue::UInt(5))
        );
        assert_eq!(
            api.device_info(subs[1], DeviceParam::ParentDevice),
            Ok(InfoValue::Handle(device.0))
        );
        assert_eq!(
            api.device_info(subs[1], DeviceParam::Name),
            Ok(InfoValue::String("Fixture GPU".to_string()))
        );
    }

    #[test]
    fn test_injected_failures() {
        let api = fixture();
        api.inject_failure(Operation::UnloadCompiler, NativeCode::OUT_OF_RESOURCES);
        let platform = api.platform_ids().unwrap()[0];
        assert_eq!(api.unload_compiler(platform), Err(NativeCode::OUT_OF_RESOURCES));
        api.clear_failures();
        assert_eq!(api.unload_compiler(platform), Ok(()));
    }

    #[test]
    fn test_replace_keeps_old_handles() {
        let api = fixture();
        let old_platforms = api.platform_ids().unwrap();
        let old_device = gpu(&api);
        api.replace_topology_toml(TOPOLOGY).unwrap();
        let new_platforms = api.platform_ids().unwrap();
        assert_eq!(new_platforms.len(), old_platforms.len());
        assert!(new_platforms.iter().all(|p| !old_platforms.contains(p)));
        assert_eq!(
            api.device_info(old_device, DeviceParam::Name),
            Ok(InfoValue::String("Fixture GPU".to_string()))
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TOPOLOGY.as_bytes()).unwrap();
        let api = FixtureApi::from_file(file.path()).unwrap();
        assert_eq!(api.platform_ids().unwrap().len(), 2);

        let missing = FixtureApi::from_file(Path::new("/nonexistent/topology.toml"));
        assert!(matches!(missing, Err(FixtureError::IoError(_))));
    }
}
