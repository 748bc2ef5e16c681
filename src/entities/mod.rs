//! Record types of the management domain

#[macro_use]
pub mod macros;

pub mod device;
pub mod firmware;
pub mod group;
pub mod model;
pub mod parameter;
pub mod profile;

pub use device::{DEVICE_COLUMNS, Device, DeviceColumn, DeviceUpdate};
pub use firmware::{FIRMWARE_COLUMNS, Firmware, FirmwareColumn, FirmwareUpdate};
pub use group::{GROUP_COLUMNS, Group, GroupColumn, GroupUpdate};
pub use model::{MODEL_COLUMNS, Model, ModelColumn, ModelUpdate};
pub use parameter::{PARAMETER_COLUMNS, Parameter, ParameterColumn, ParameterSpec, ParameterUpdate};
pub use profile::{
    PROFILE_COLUMNS, Profile, ProfileColumn, ProfileParameter, ProfileParameterColumn, ProfileUpdate,
};

use crate::core::entity::Status;
use crate::core::error::{AppError, Result};

/// Status carried by a patch; `DELETE` is only reachable through delete operations
pub(crate) fn patch_status(status: Option<Status>) -> Result<Option<Status>> {
    match status {
        Some(Status::Delete) => Err(AppError::invalid(
            "status",
            "status cannot be set to DELETE by an update",
        )),
        other => Ok(other),
    }
}
