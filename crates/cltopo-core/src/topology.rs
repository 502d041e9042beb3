//! Serialisable snapshot of a detected topology

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{DeviceId, DeviceType, PlatformId};
use crate::device::Device;
use crate::error::Result;
use crate::platform::Platform;
use crate::registry::Epoch;

/// Summary of one device, root or sub-device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    /// Parent device for sub-devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DeviceId>,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub compute_units: u32,
    /// Bytes
    pub global_mem_size: u64,
    /// Bytes
    pub local_mem_size: u64,
    pub max_subdevices: u32,
    pub available: bool,
}

impl DeviceSummary {
    pub fn from_device(device: &Device) -> Result<Self> {
        Ok(Self {
            id: device.id(),
            parent: device.parent_id(),
            name: device.name()?,
            device_type: device.devtype()?,
            compute_units: device.max_compute_units()?,
            global_mem_size: device.global_mem_size()?,
            local_mem_size: device.local_mem_size()?,
            max_subdevices: device.max_subdevices()?,
            available: device.is_available()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub id: PlatformId,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub profile: String,
    pub devices: Vec<DeviceSummary>,
}

impl PlatformSummary {
    pub fn from_platform(platform: &Platform) -> Result<Self> {
        Ok(Self {
            id: platform.id(),
            name: platform.name()?,
            vendor: platform.vendor()?,
            version: platform.version()?,
            profile: platform.info::<crate::info::platform::Profile>()?,
            devices: platform
                .devices()
                .iter()
                .map(DeviceSummary::from_device)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Everything one epoch detected, with attributes resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyReport {
    pub epoch: u64,
    pub detected_at: DateTime<Utc>,
    pub platforms: Vec<PlatformSummary>,
}

impl TopologyReport {
    /// Query every platform and device of `epoch`
    ///
    /// Any failing attribute query aborts the report.
    pub fn collect(epoch: &Epoch) -> Result<Self> {
        Ok(Self {
            epoch: epoch.number(),
            detected_at: epoch.detected_at(),
            platforms: epoch
                .platforms()
                .iter()
                .map(PlatformSummary::from_platform)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn device_count(&self) -> usize {
        self.platforms.iter().map(|p| p.devices.len()).sum()
    }

    pub fn find_device(&self, id: DeviceId) -> Option<&DeviceSummary> {
        self.platforms
            .iter()
            .flat_map(|p| p.devices.iter())
            .find(|d| d.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {} CU, {} MiB global, {} KiB local",
            self.id,
            self.name,
            self.device_type,
            self.compute_units,
            self.global_mem_size / (1024 * 1024),
            self.local_mem_size / 1024,
        )?;
        if let Some(parent) = self.parent {
            write!(f, ", parent {}", parent)?;
        }
        if !self.available {
            f.write_str(" (unavailable)")?;
        }
        Ok(())
    }
}

/// Indented tree, one line per platform and device
impl fmt::Display for TopologyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "epoch {} ({}): {} platform(s), {} device(s)",
            self.epoch,
            self.detected_at.to_rfc3339(),
            self.platforms.len(),
            self.device_count()
        )?;
        for (index, platform) in self.platforms.iter().enumerate() {
            writeln!(
                f,
                "[{}] {} {} / {} ({}, {})",
                index, platform.id, platform.name, platform.vendor, platform.version, platform.profile
            )?;
            for device in &platform.devices {
                writeln!(f, "    {}", device)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureApi;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn report() -> TopologyReport {
        let api = FixtureApi::from_toml(include_str!("../fixtures/two_platforms.toml")).unwrap();
        let registry = Registry::new(Arc::new(api));
        TopologyReport::collect(&registry.get_all().unwrap()).unwrap()
    }

    #[test]
    fn test_collect_preserves_order() {
        let report = report();
        assert_eq!(report.epoch, 1);
        let names: Vec<&str> = report.platforms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Fixture CUDA", "Portable Computing Language"]);
        assert_eq!(report.device_count(), 3);

        let pocl = &report.platforms[1];
        assert_eq!(pocl.profile, "EMBEDDED_PROFILE");
        assert_eq!(pocl.devices[0].device_type, DeviceType::CPU);
        assert_eq!(pocl.devices[1].device_type, DeviceType::ACCELERATOR);
        assert!(!pocl.devices[1].available);
    }

    #[test]
    fn test_find_device() {
        let report = report();
        let gpu = report.platforms[0].devices[0].clone();
        assert_eq!(report.find_device(gpu.id), Some(&gpu));
        assert_eq!(gpu.compute_units, 16);
        assert_eq!(gpu.max_subdevices, 4);
        assert!(gpu.parent.is_none());
        assert!(report.find_device(DeviceId(1)).is_none());
    }

    #[test]
    fn test_json_shape() {
        let report = report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let gpu = &value["platforms"][0]["devices"][0];
        assert_eq!(gpu["type"], "default|gpu");
        assert_eq!(gpu["compute_units"], 16);
        assert!(gpu.get("parent").is_none());

        let back: TopologyReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_text_rendering() {
        let text = report().to_string();
        assert!(text.starts_with("epoch 1 "));
        assert!(text.contains("Fixture GPU [default|gpu] 16 CU, 8192 MiB global, 48 KiB local"));
        assert!(text.contains("Fixture Accelerator [accelerator]"));
        assert!(text.contains("(unavailable)"));
    }
}
