//! Native status translation and the typed error taxonomy
//!
//! Every failure reported by the compute runtime arrives as a numeric status.
//! This module owns the single table mapping those statuses to labels and
//! wraps them into one of the three error kinds exposed by the crate:
//! a free-form [`Error::Generic`], a platform failure, or a device failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label returned for statuses that have no entry in the table
pub const UNKNOWN_ERROR_LABEL: &str = "unknown error code";

/// Numeric status reported by the compute runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeCode(pub i32);

impl NativeCode {
    pub const SUCCESS: Self = Self(0);
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    pub const DEVICE_NOT_AVAILABLE: Self = Self(-2);
    pub const COMPILER_NOT_AVAILABLE: Self = Self(-3);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: Self = Self(-4);
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    pub const OUT_OF_HOST_MEMORY: Self = Self(-6);
    pub const PROFILING_INFO_NOT_AVAILABLE: Self = Self(-7);
    pub const MEM_COPY_OVERLAP: Self = Self(-8);
    pub const IMAGE_FORMAT_MISMATCH: Self = Self(-9);
    pub const IMAGE_FORMAT_NOT_SUPPORTED: Self = Self(-10);
    pub const BUILD_PROGRAM_FAILURE: Self = Self(-11);
    pub const MAP_FAILURE: Self = Self(-12);
    pub const MISALIGNED_SUB_BUFFER_OFFSET: Self = Self(-13);
    pub const EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST: Self = Self(-14);
    pub const COMPILE_PROGRAM_FAILURE: Self = Self(-15);
    pub const LINKER_NOT_AVAILABLE: Self = Self(-16);
    pub const LINK_PROGRAM_FAILURE: Self = Self(-17);
    pub const DEVICE_PARTITION_FAILED: Self = Self(-18);
    pub const KERNEL_ARG_INFO_NOT_AVAILABLE: Self = Self(-19);
    pub const INVALID_VALUE: Self = Self(-30);
    pub const INVALID_DEVICE_TYPE: Self = Self(-31);
    pub const INVALID_PLATFORM: Self = Self(-32);
    pub const INVALID_DEVICE: Self = Self(-33);
    pub const INVALID_CONTEXT: Self = Self(-34);
    pub const INVALID_QUEUE_PROPERTIES: Self = Self(-35);
    pub const INVALID_COMMAND_QUEUE: Self = Self(-36);
    pub const INVALID_HOST_PTR: Self = Self(-37);
    pub const INVALID_MEM_OBJECT: Self = Self(-38);
    pub const INVALID_IMAGE_FORMAT_DESCRIPTOR: Self = Self(-39);
    pub const INVALID_IMAGE_SIZE: Self = Self(-40);
    pub const INVALID_SAMPLER: Self = Self(-41);
    pub const INVALID_BINARY: Self = Self(-42);
    pub const INVALID_BUILD_OPTIONS: Self = Self(-43);
    pub const INVALID_PROGRAM: Self = Self(-44);
    pub const INVALID_PROGRAM_EXECUTABLE: Self = Self(-45);
    pub const INVALID_KERNEL_NAME: Self = Self(-46);
    pub const INVALID_KERNEL_DEFINITION: Self = Self(-47);
    pub const INVALID_KERNEL: Self = Self(-48);
    pub const INVALID_ARG_INDEX: Self = Self(-49);
    pub const INVALID_ARG_VALUE: Self = Self(-50);
    pub const INVALID_ARG_SIZE: Self = Self(-51);
    pub const INVALID_KERNEL_ARGS: Self = Self(-52);
    pub const INVALID_WORK_DIMENSION: Self = Self(-53);
    pub const INVALID_WORK_GROUP_SIZE: Self = Self(-54);
    pub const INVALID_WORK_ITEM_SIZE: Self = Self(-55);
    pub const INVALID_GLOBAL_OFFSET: Self = Self(-56);
    pub const INVALID_EVENT_WAIT_LIST: Self = Self(-57);
    pub const INVALID_EVENT: Self = Self(-58);
    pub const INVALID_OPERATION: Self = Self(-59);
    pub const INVALID_GL_OBJECT: Self = Self(-60);
    pub const INVALID_BUFFER_SIZE: Self = Self(-61);
    pub const INVALID_MIP_LEVEL: Self = Self(-62);
    pub const INVALID_GLOBAL_WORK_SIZE: Self = Self(-63);
    pub const INVALID_PROPERTY: Self = Self(-64);
    pub const INVALID_IMAGE_DESCRIPTOR: Self = Self(-65);
    pub const INVALID_COMPILER_OPTIONS: Self = Self(-66);
    pub const INVALID_LINKER_OPTIONS: Self = Self(-67);
    pub const INVALID_DEVICE_PARTITION_COUNT: Self = Self(-68);
    pub const INVALID_PIPE_SIZE: Self = Self(-69);
    pub const INVALID_DEVICE_QUEUE: Self = Self(-70);
    pub const INVALID_SPEC_ID: Self = Self(-71);
    pub const MAX_SIZE_RESTRICTION_EXCEEDED: Self = Self(-72);
    pub const PLATFORM_NOT_FOUND_KHR: Self = Self(-1001);
    pub const DEVICE_PARTITION_FAILED_EXT: Self = Self(-1057);
    pub const INVALID_PARTITION_COUNT_EXT: Self = Self(-1058);
    pub const INVALID_PARTITION_NAME_EXT: Self = Self(-1059);

    /// Raw numeric value
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Human-readable label for this status
    pub fn label(self) -> &'static str {
        describe(self.0)
    }
}

impl From<i32> for NativeCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.0)
    }
}

static LABELS: LazyLock<HashMap<i32, &'static str>> = LazyLock::new(|| {
    [
        (NativeCode::SUCCESS, "CL_SUCCESS"),
        (NativeCode::DEVICE_NOT_FOUND, "CL_DEVICE_NOT_FOUND"),
        (NativeCode::DEVICE_NOT_AVAILABLE, "CL_DEVICE_NOT_AVAILABLE"),
        (NativeCode::COMPILER_NOT_AVAILABLE, "CL_COMPILER_NOT_AVAILABLE"),
        (NativeCode::MEM_OBJECT_ALLOCATION_FAILURE, "CL_MEM_OBJECT_ALLOCATION_FAILURE"),
        (NativeCode::OUT_OF_RESOURCES, "CL_OUT_OF_RESOURCES"),
        (NativeCode::OUT_OF_HOST_MEMORY, "CL_OUT_OF_HOST_MEMORY"),
        (NativeCode::PROFILING_INFO_NOT_AVAILABLE, "CL_PROFILING_INFO_NOT_AVAILABLE"),
        (NativeCode::MEM_COPY_OVERLAP, "CL_MEM_COPY_OVERLAP"),
        (NativeCode::IMAGE_FORMAT_MISMATCH, "CL_IMAGE_FORMAT_MISMATCH"),
        (NativeCode::IMAGE_FORMAT_NOT_SUPPORTED, "CL_IMAGE_FORMAT_NOT_SUPPORTED"),
        (NativeCode::BUILD_PROGRAM_FAILURE, "CL_BUILD_PROGRAM_FAILURE"),
        (NativeCode::MAP_FAILURE, "CL_MAP_FAILURE"),
        (NativeCode::MISALIGNED_SUB_BUFFER_OFFSET, "CL_MISALIGNED_SUB_BUFFER_OFFSET"),
        (
            NativeCode::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST,
            "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
        ),
        (NativeCode::COMPILE_PROGRAM_FAILURE, "CL_COMPILE_PROGRAM_FAILURE"),
        (NativeCode::LINKER_NOT_AVAILABLE, "CL_LINKER_NOT_AVAILABLE"),
        (NativeCode::LINK_PROGRAM_FAILURE, "CL_LINK_PROGRAM_FAILURE"),
        (NativeCode::DEVICE_PARTITION_FAILED, "CL_DEVICE_PARTITION_FAILED"),
        (NativeCode::KERNEL_ARG_INFO_NOT_AVAILABLE, "CL_KERNEL_ARG_INFO_NOT_AVAILABLE"),
        (NativeCode::INVALID_VALUE, "CL_INVALID_VALUE"),
        (NativeCode::INVALID_DEVICE_TYPE, "CL_INVALID_DEVICE_TYPE"),
        (NativeCode::INVALID_PLATFORM, "CL_INVALID_PLATFORM"),
        (NativeCode::INVALID_DEVICE, "CL_INVALID_DEVICE"),
        (NativeCode::INVALID_CONTEXT, "CL_INVALID_CONTEXT"),
        (NativeCode::INVALID_QUEUE_PROPERTIES, "CL_INVALID_QUEUE_PROPERTIES"),
        (NativeCode::INVALID_COMMAND_QUEUE, "CL_INVALID_COMMAND_QUEUE"),
        (NativeCode::INVALID_HOST_PTR, "CL_INVALID_HOST_PTR"),
        (NativeCode::INVALID_MEM_OBJECT, "CL_INVALID_MEM_OBJECT"),
        (NativeCode::INVALID_IMAGE_FORMAT_DESCRIPTOR, "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR"),
        (NativeCode::INVALID_IMAGE_SIZE, "CL_INVALID_IMAGE_SIZE"),
        (NativeCode::INVALID_SAMPLER, "CL_INVALID_SAMPLER"),
        (NativeCode::INVALID_BINARY, "CL_INVALID_BINARY"),
        (NativeCode::INVALID_BUILD_OPTIONS, "CL_INVALID_BUILD_OPTIONS"),
        (NativeCode::INVALID_PROGRAM, "CL_INVALID_PROGRAM"),
        (NativeCode::INVALID_PROGRAM_EXECUTABLE, "CL_INVALID_PROGRAM_EXECUTABLE"),
        (NativeCode::INVALID_KERNEL_NAME, "CL_INVALID_KERNEL_NAME"),
        (NativeCode::INVALID_KERNEL_DEFINITION, "CL_INVALID_KERNEL_DEFINITION"),
        (NativeCode::INVALID_KERNEL, "CL_INVALID_KERNEL"),
        (NativeCode::INVALID_ARG_INDEX, "CL_INVALID_ARG_INDEX"),
        (NativeCode::INVALID_ARG_VALUE, "CL_INVALID_ARG_VALUE"),
        (NativeCode::INVALID_ARG_SIZE, "CL_INVALID_ARG_SIZE"),
        (NativeCode::INVALID_KERNEL_ARGS, "CL_INVALID_KERNEL_ARGS"),
        (NativeCode::INVALID_WORK_DIMENSION, "CL_INVALID_WORK_DIMENSION"),
        (NativeCode::INVALID_WORK_GROUP_SIZE, "CL_INVALID_WORK_GROUP_SIZE"),
        (NativeCode::INVALID_WORK_ITEM_SIZE, "CL_INVALID_WORK_ITEM_SIZE"),
        (NativeCode::INVALID_GLOBAL_OFFSET, "CL_INVALID_GLOBAL_OFFSET"),
        (NativeCode::INVALID_EVENT_WAIT_LIST, "CL_INVALID_EVENT_WAIT_LIST"),
        (NativeCode::INVALID_EVENT, "CL_INVALID_EVENT"),
        (NativeCode::INVALID_OPERATION, "CL_INVALID_OPERATION"),
        (NativeCode::INVALID_GL_OBJECT, "CL_INVALID_GL_OBJECT"),
        (NativeCode::INVALID_BUFFER_SIZE, "CL_INVALID_BUFFER_SIZE"),
        (NativeCode::INVALID_MIP_LEVEL, "CL_INVALID_MIP_LEVEL"),
        (NativeCode::INVALID_GLOBAL_WORK_SIZE, "CL_INVALID_GLOBAL_WORK_SIZE"),
        (NativeCode::INVALID_PROPERTY, "CL_INVALID_PROPERTY"),
        (NativeCode::INVALID_IMAGE_DESCRIPTOR, "CL_INVALID_IMAGE_DESCRIPTOR"),
        (NativeCode::INVALID_COMPILER_OPTIONS, "CL_INVALID_COMPILER_OPTIONS"),
        (NativeCode::INVALID_LINKER_OPTIONS, "CL_INVALID_LINKER_OPTIONS"),
        (NativeCode::INVALID_DEVICE_PARTITION_COUNT, "CL_INVALID_DEVICE_PARTITION_COUNT"),
        (NativeCode::INVALID_PIPE_SIZE, "CL_INVALID_PIPE_SIZE"),
        (NativeCode::INVALID_DEVICE_QUEUE, "CL_INVALID_DEVICE_QUEUE"),
        (NativeCode::INVALID_SPEC_ID, "CL_INVALID_SPEC_ID"),
        (NativeCode::MAX_SIZE_RESTRICTION_EXCEEDED, "CL_MAX_SIZE_RESTRICTION_EXCEEDED"),
        (NativeCode::PLATFORM_NOT_FOUND_KHR, "CL_PLATFORM_NOT_FOUND_KHR"),
        (NativeCode::DEVICE_PARTITION_FAILED_EXT, "CL_DEVICE_PARTITION_FAILED_EXT"),
        (NativeCode::INVALID_PARTITION_COUNT_EXT, "CL_INVALID_PARTITION_COUNT_EXT"),
        (NativeCode::INVALID_PARTITION_NAME_EXT, "CL_INVALID_PARTITION_NAME_EXT"),
    ]
    .into_iter()
    .map(|(code, label)| (code.0, label))
    .collect()
});

/// Translate a native status into its label
///
/// Unknown statuses map to [`UNKNOWN_ERROR_LABEL`]; the result is never empty.
pub fn describe(code: i32) -> &'static str {
    LABELS.get(&code).copied().unwrap_or(UNKNOWN_ERROR_LABEL)
}

/// Errors raised by the registry and by platform/device queries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Free-form failure not tied to a native status
    #[error("{0}")]
    Generic(String),
    /// A platform-level native call failed
    #[error("platform error: {0}")]
    InvalidPlatform(NativeCode),
    /// A device-level native call failed
    #[error("device error: {0}")]
    InvalidDevice(NativeCode),
}

impl Error {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic(message.into())
    }

    /// Native status carried by the error, 0 for [`Error::Generic`]
    pub fn code(&self) -> i32 {
        match self {
            Self::Generic(_) => 0,
            Self::InvalidPlatform(code) | Self::InvalidDevice(code) => code.0,
        }
    }

    /// Translated label, or the message itself for [`Error::Generic`]
    pub fn label(&self) -> &str {
        match self {
            Self::Generic(message) => message,
            Self::InvalidPlatform(code) | Self::InvalidDevice(code) => code.label(),
        }
    }

    pub fn is_platform_error(&self) -> bool {
        matches!(self, Self::InvalidPlatform(_))
    }

    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::InvalidDevice(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
