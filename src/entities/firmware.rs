//! Firmware images belonging to a model

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::Result;
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

impl_record!(
    /// A firmware image; the file itself lives in the object store
    Firmware, FirmwareColumn, "Firmware", "firmwares",
    unique: [[Name]],
    {
        ModelId => model_id: Uuid,
        #[validate(length(min = 1, max = 255))]
        Name => name: String,
        /// URL returned by the object store on upload
        #[serde(default)]
        FilePath => file_path: String,
        #[serde(default)]
        #[validate(length(max = 255))]
        Description => description: String,
    }
);

pub const FIRMWARE_COLUMNS: AllowList<FirmwareColumn> = &[
    ("id", FirmwareColumn::Id),
    ("model_id", FirmwareColumn::ModelId),
    ("name", FirmwareColumn::Name),
    ("file_path", FirmwareColumn::FilePath),
    ("status", FirmwareColumn::Status),
    ("description", FirmwareColumn::Description),
    ("created_at", FirmwareColumn::CreatedAt),
    ("updated_at", FirmwareColumn::UpdatedAt),
    ("updated_by", FirmwareColumn::UpdatedBy),
];

impl Firmware {
    pub fn new(model_id: Uuid, name: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            model_id,
            name: name.into(),
            file_path: String::new(),
            description: String::new(),
        }
    }

    pub fn check(&self) -> Result<()> {
        Ok(self.validate()?)
    }
}

/// Partial update of a firmware
///
/// `file` replaces the stored image; it is never persisted in the row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FirmwareUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub status: Option<Status>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub updated_by: Option<String>,
    #[serde(skip)]
    pub file: Option<Vec<u8>>,
}

impl FirmwareUpdate {
    /// Column changes, excluding the file path which depends on the upload
    pub fn to_changes(&self) -> Result<Changes<FirmwareColumn>> {
        self.validate()?;
        Ok(Changes::new()
            .set_opt(FirmwareColumn::Name, self.name.clone())
            .set_opt(FirmwareColumn::Status, super::patch_status(self.status)?)
            .set_opt(FirmwareColumn::Description, self.description.clone())
            .set_opt(FirmwareColumn::UpdatedBy, self.updated_by.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Column, Record};
    use crate::core::field::{FieldKind, FieldValue};

    #[test]
    fn test_model_id_column_is_uuid() {
        assert_eq!(FirmwareColumn::ModelId.kind(), FieldKind::Uuid);
        assert_eq!(FirmwareColumn::FilePath.name(), "file_path");
        assert_eq!(Firmware::TABLE, "firmwares");
    }

    #[test]
    fn test_update_changes() {
        let update = FirmwareUpdate {
            description: Some("hotfix".to_string()),
            file: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let changes = update.to_changes().unwrap();
        assert_eq!(
            changes.get(FirmwareColumn::Description),
            Some(&FieldValue::from("hotfix"))
        );
        assert_eq!(changes.get(FirmwareColumn::FilePath), None);
    }

    #[test]
    fn test_update_rejects_empty_name() {
        let update = FirmwareUpdate {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(update.to_changes().is_err());
    }
}
