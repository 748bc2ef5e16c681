//! Device groups

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::field::{FieldFormat, FieldValue};
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Window applied when a group does not name one
pub const DEFAULT_DOWNLOAD_PERIOD: &str = "00:00~00:00";

impl_record!(
    /// A set of devices of one model sharing a firmware and a download window
    Group, GroupColumn, "Group", "groups",
    unique: [[ModelId, Name]],
    {
        ModelId => model_id: Uuid,
        #[serde(default)]
        FirmwareId => firmware_id: Option<Uuid>,
        #[validate(length(min = 1, max = 255))]
        Name => name: String,
        #[serde(default)]
        #[validate(length(max = 255))]
        Description => description: String,
        /// `HH:MM~HH:MM`
        #[serde(default)]
        DownloadPeriod => download_period: String,
    }
);

pub const GROUP_COLUMNS: AllowList<GroupColumn> = &[
    ("id", GroupColumn::Id),
    ("model_id", GroupColumn::ModelId),
    ("firmware_id", GroupColumn::FirmwareId),
    ("name", GroupColumn::Name),
    ("description", GroupColumn::Description),
    ("status", GroupColumn::Status),
    ("created_at", GroupColumn::CreatedAt),
    ("updated_at", GroupColumn::UpdatedAt),
    ("updated_by", GroupColumn::UpdatedBy),
];

impl Group {
    pub fn new(model_id: Uuid, name: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            model_id,
            firmware_id: None,
            name: name.into(),
            description: String::new(),
            download_period: DEFAULT_DOWNLOAD_PERIOD.to_string(),
        }
    }

    /// Validate, filling in the default download window when empty
    pub fn check(&mut self) -> Result<()> {
        self.validate()?;
        if self.download_period.is_empty() {
            self.download_period = DEFAULT_DOWNLOAD_PERIOD.to_string();
        }
        check_download_period(&self.download_period)
    }
}

pub fn check_download_period(period: &str) -> Result<()> {
    if FieldFormat::DownloadPeriod.validate(&FieldValue::from(period)) {
        Ok(())
    } else {
        Err(AppError::invalid(
            "download_period",
            "invalid format, expected format: 'HH:MM~HH:MM'",
        ))
    }
}

/// Partial update of a group
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct GroupUpdate {
    pub firmware_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub status: Option<Status>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub download_period: Option<String>,
    pub updated_by: Option<String>,
}

impl GroupUpdate {
    pub fn into_changes(self) -> Result<Changes<GroupColumn>> {
        self.validate()?;
        if let Some(period) = &self.download_period {
            check_download_period(period)?;
        }
        Ok(Changes::new()
            .set_opt(GroupColumn::FirmwareId, self.firmware_id)
            .set_opt(GroupColumn::Name, self.name)
            .set_opt(GroupColumn::Status, super::patch_status(self.status)?)
            .set_opt(GroupColumn::Description, self.description)
            .set_opt(GroupColumn::DownloadPeriod, self.download_period)
            .set_opt(GroupColumn::UpdatedBy, self.updated_by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Record;

    #[test]
    fn test_natural_key_is_model_and_name() {
        assert_eq!(Group::UNIQUE, &[&[GroupColumn::ModelId, GroupColumn::Name][..]]);
        assert_eq!(
            Group::constraint_name(Group::UNIQUE[0]),
            "groups_model_id_name_idx"
        );
    }

    #[test]
    fn test_empty_period_defaults() {
        let mut group = Group::new(Uuid::new_v4(), "north", "tester");
        group.download_period = String::new();
        group.check().unwrap();
        assert_eq!(group.download_period, DEFAULT_DOWNLOAD_PERIOD);
    }

    #[test]
    fn test_bad_period_rejected() {
        let mut group = Group::new(Uuid::new_v4(), "north", "tester");
        group.download_period = "25:00~01:00".to_string();
        let err = group.check().unwrap_err();
        assert!(err.to_string().contains("download_period"));

        let update = GroupUpdate {
            download_period: Some("1:00~2:00".to_string()),
            ..Default::default()
        };
        assert!(update.into_changes().is_err());
    }

    #[test]
    fn test_firmware_id_optional() {
        let group = Group::new(Uuid::new_v4(), "north", "tester");
        assert!(group.value_of(GroupColumn::FirmwareId).is_null());
    }
}
