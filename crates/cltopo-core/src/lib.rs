//! cltopo core - compute platform and device registry
//!
//! This crate provides:
//! - A process-wide registry of platforms and devices, detected once per
//!   epoch and read without locking afterwards
//! - A typed attribute query protocol over the compute runtime
//! - Device partitioning into sub-devices
//! - Translation of native status codes into typed errors
//! - An in-memory runtime for tests and an OpenCL runtime behind the
//!   `opencl` feature

pub mod api;
pub mod context;
pub mod device;
pub mod error;
pub mod fixture;
pub mod info;
#[cfg(feature = "opencl")]
pub mod native;
pub mod platform;
pub mod registry;
pub mod topology;

pub use api::{ComputeApi, DeviceId, DeviceType, PartitionSpec, PlatformId};
pub use context::ExecutionContext;
pub use device::Device;
pub use error::{describe, Error, NativeCode, Result};
pub use fixture::{FixtureApi, FixtureError, FixtureIndex, Operation};
pub use info::{DeviceParam, FpConfig, InfoValue, PlatformParam, QueryStrategy};
#[cfg(feature = "opencl")]
pub use native::OpenClApi;
pub use platform::{Platform, Profile, Version};
pub use registry::{Epoch, Registry, RegistryOptions};
pub use topology::{DeviceSummary, PlatformSummary, TopologyReport};
