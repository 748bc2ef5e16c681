//! Device models

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Largest accepted model image, base64 text
pub const MAX_IMAGE_BYTES: usize = 150 * 1024;

impl_record!(
    /// A hardware model, e.g. `AX3000S` by a given vendor
    Model, ModelColumn, "Model", "models",
    unique: [[Name]],
    {
        #[validate(length(min = 1, max = 255))]
        Name => name: String,
        #[validate(length(min = 1, max = 255))]
        VendorName => vendor_name: String,
        #[validate(length(min = 1, max = 255))]
        Manufacturer => manufacturer: String,
        #[serde(default)]
        #[validate(length(max = 255))]
        Description => description: String,
        #[serde(default)]
        Image => image: String,
    }
);

pub const MODEL_COLUMNS: AllowList<ModelColumn> = &[
    ("id", ModelColumn::Id),
    ("name", ModelColumn::Name),
    ("vendor_name", ModelColumn::VendorName),
    ("manufacturer", ModelColumn::Manufacturer),
    ("status", ModelColumn::Status),
    ("description", ModelColumn::Description),
    ("created_at", ModelColumn::CreatedAt),
    ("updated_at", ModelColumn::UpdatedAt),
    ("updated_by", ModelColumn::UpdatedBy),
];

impl Model {
    pub fn new(
        name: impl Into<String>,
        vendor_name: impl Into<String>,
        manufacturer: impl Into<String>,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            name: name.into(),
            vendor_name: vendor_name.into(),
            manufacturer: manufacturer.into(),
            description: String::new(),
            image: String::new(),
        }
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        check_image(&self.image)
    }
}

fn check_image(image: &str) -> Result<()> {
    if image.len() > MAX_IMAGE_BYTES {
        return Err(AppError::invalid("image", "image size exceeds 150KB"));
    }
    Ok(())
}

/// Partial update of a model
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ModelUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub vendor_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub manufacturer: Option<String>,
    pub status: Option<Status>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub image: Option<String>,
    pub updated_by: Option<String>,
}

impl ModelUpdate {
    pub fn into_changes(self) -> Result<Changes<ModelColumn>> {
        self.validate()?;
        if let Some(image) = &self.image {
            check_image(image)?;
        }
        Ok(Changes::new()
            .set_opt(ModelColumn::Name, self.name)
            .set_opt(ModelColumn::VendorName, self.vendor_name)
            .set_opt(ModelColumn::Manufacturer, self.manufacturer)
            .set_opt(ModelColumn::Status, super::patch_status(self.status)?)
            .set_opt(ModelColumn::Description, self.description)
            .set_opt(ModelColumn::Image, self.image)
            .set_opt(ModelColumn::UpdatedBy, self.updated_by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Column, Record};
    use crate::core::field::{FieldKind, FieldValue};

    #[test]
    fn test_column_table() {
        assert_eq!(ModelColumn::VendorName.name(), "vendor_name");
        assert_eq!(ModelColumn::from_name("MANUFACTURER"), Some(ModelColumn::Manufacturer));
        assert_eq!(ModelColumn::Status.kind(), FieldKind::Status);
        assert_eq!(ModelColumn::ALL.len(), 10);
        assert_eq!(Model::constraint_name(Model::UNIQUE[0]), "models_name_idx");
    }

    #[test]
    fn test_value_of_and_set_value() {
        let mut model = Model::new("AX3000", "Wifi 6", "CIG", "tester");
        assert_eq!(model.value_of(ModelColumn::Name), FieldValue::from("AX3000"));
        assert!(model.set_value(ModelColumn::Name, FieldValue::from("AX6000")));
        assert_eq!(model.name, "AX6000");
        assert!(!model.set_value(ModelColumn::Name, FieldValue::Integer(1)));
        assert!(model.set_value(ModelColumn::Status, FieldValue::from("DISABLE")));
        assert_eq!(model.status, Status::Disable);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let mut model = Model::new("AX3000", "Wifi 6", "CIG", "tester");
        model.image = "a".repeat(MAX_IMAGE_BYTES + 1);
        let err = model.check().unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { field: Some(f), .. } if f == "image"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let model = Model::new("", "Wifi 6", "CIG", "tester");
        assert!(model.check().is_err());
    }

    #[test]
    fn test_update_cannot_delete() {
        let update = ModelUpdate {
            status: Some(Status::Delete),
            ..Default::default()
        };
        assert!(update.into_changes().is_err());

        let changes = ModelUpdate {
            name: Some("AX6000".to_string()),
            ..Default::default()
        }
        .into_changes()
        .unwrap();
        assert_eq!(changes.get(ModelColumn::Name), Some(&FieldValue::from("AX6000")));
        assert_eq!(changes.get(ModelColumn::VendorName), None);
    }

    #[test]
    fn test_deserialize_defaults_lifecycle_fields() {
        let model: Model = serde_json::from_str(
            r#"{"name": "AX3000", "vendor_name": "Wifi 6", "manufacturer": "CIG"}"#,
        )
        .unwrap();
        assert!(model.id.is_nil());
        assert_eq!(model.status, Status::Enable);
        assert!(model.description.is_empty());
    }
}
