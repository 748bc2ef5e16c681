//! Devices and their endpoint identity

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::field::{FieldFormat, FieldValue};
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

impl_record!(
    /// A managed device, identified by its WAN MAC address
    Device, DeviceColumn, "Device", "devices",
    unique: [[MacAddress]],
    {
        /// 12 lower-case hex digits, no separators
        MacAddress => mac_address: String,
        /// Endpoint in the device protocol, e.g. `os::4485DA-4485DA68A1E7`
        EndpointId => endpoint_id: String,
        ModelId => model_id: Uuid,
        #[serde(default)]
        GroupId => group_id: Option<Uuid>,
        #[serde(default)]
        #[validate(length(max = 255))]
        Description => description: String,
    }
);

pub const DEVICE_COLUMNS: AllowList<DeviceColumn> = &[
    ("id", DeviceColumn::Id),
    ("mac_address", DeviceColumn::MacAddress),
    ("endpoint_id", DeviceColumn::EndpointId),
    ("model_id", DeviceColumn::ModelId),
    ("group_id", DeviceColumn::GroupId),
    ("created_at", DeviceColumn::CreatedAt),
    ("updated_at", DeviceColumn::UpdatedAt),
    ("updated_by", DeviceColumn::UpdatedBy),
    ("status", DeviceColumn::Status),
    ("description", DeviceColumn::Description),
];

/// Lower-case a MAC address and drop `:` / `-` separators
pub fn normalize_mac(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// `os::<OUI>-<MAC>` in upper case
pub fn endpoint_id_for(mac: &str) -> String {
    let upper = mac.to_ascii_uppercase();
    let oui = upper.get(..6).unwrap_or(&upper);
    format!("os::{}-{}", oui, upper)
}

impl Device {
    /// Build a device from a raw MAC, deriving its endpoint id
    pub fn new(raw_mac: &str, model_id: Uuid, group_id: Option<Uuid>, updated_by: impl Into<String>) -> Self {
        let mac_address = normalize_mac(raw_mac);
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            endpoint_id: endpoint_id_for(&mac_address),
            mac_address,
            model_id,
            group_id,
            description: String::new(),
        }
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if !FieldFormat::MacAddress.validate(&FieldValue::from(self.mac_address.as_str())) {
            return Err(AppError::invalid(
                "mac_address",
                format!("invalid mac address: {}", self.mac_address),
            ));
        }
        let expected = endpoint_id_for(&self.mac_address);
        if self.endpoint_id != expected {
            return Err(AppError::invalid(
                "endpoint_id",
                format!("endpoint id must be {}", expected),
            ));
        }
        Ok(())
    }
}

/// Partial update of a device
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DeviceUpdate {
    pub group_id: Option<Uuid>,
    pub status: Option<Status>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub updated_by: Option<String>,
}

impl DeviceUpdate {
    pub fn into_changes(self) -> Result<Changes<DeviceColumn>> {
        self.validate()?;
        Ok(Changes::new()
            .set_opt(DeviceColumn::GroupId, self.group_id)
            .set_opt(DeviceColumn::Status, super::patch_status(self.status)?)
            .set_opt(DeviceColumn::Description, self.description)
            .set_opt(DeviceColumn::UpdatedBy, self.updated_by))
    }
}
