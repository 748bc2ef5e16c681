//! Reusable data-model parameters

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::Result;
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

impl_record!(
    /// A data-model path such as `Device.DeviceInfo.SoftwareVersion`
    Parameter, ParameterColumn, "Parameter", "parameters",
    unique: [[Path]],
    {
        #[validate(length(min = 1))]
        Path => path: String,
        #[validate(length(min = 1, max = 32))]
        DataType => data_type: String,
        #[serde(default)]
        Description => description: String,
    }
);

pub const PARAMETER_COLUMNS: AllowList<ParameterColumn> = &[
    ("id", ParameterColumn::Id),
    ("path", ParameterColumn::Path),
    ("data_type", ParameterColumn::DataType),
    ("description", ParameterColumn::Description),
    ("created_at", ParameterColumn::CreatedAt),
    ("updated_at", ParameterColumn::UpdatedAt),
    ("updated_by", ParameterColumn::UpdatedBy),
    ("status", ParameterColumn::Status),
];

impl Parameter {
    pub fn new(path: impl Into<String>, data_type: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            path: path.into(),
            data_type: data_type.into(),
            description: String::new(),
        }
    }

    pub fn check(&self) -> Result<()> {
        Ok(self.validate()?)
    }
}

/// A parameter as supplied alongside a profile
///
/// `default_value` and `required` describe the profile association; the
/// rest becomes the parameter row.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParameterSpec {
    #[validate(nested)]
    #[serde(flatten)]
    pub parameter: Parameter,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    pub fn new(parameter: Parameter) -> Self {
        Self {
            parameter,
            default_value: String::new(),
            required: false,
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>, required: bool) -> Self {
        self.default_value = default_value.into();
        self.required = required;
        self
    }
}

/// Partial update of a parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ParameterUpdate {
    #[validate(length(min = 1))]
    pub path: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub data_type: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub updated_by: Option<String>,
}

impl ParameterUpdate {
    /// Every field of `parameter`, as used when an upsert finds an existing row
    pub fn replacing(parameter: &Parameter) -> Self {
        Self {
            path: Some(parameter.path.clone()),
            data_type: Some(parameter.data_type.clone()),
            description: Some(parameter.description.clone()),
            status: Some(parameter.status),
            updated_by: Some(parameter.updated_by.clone()),
        }
    }

    pub fn into_changes(self) -> Result<Changes<ParameterColumn>> {
        self.validate()?;
        Ok(Changes::new()
            .set_opt(ParameterColumn::Path, self.path)
            .set_opt(ParameterColumn::DataType, self.data_type)
            .set_opt(ParameterColumn::Description, self.description)
            .set_opt(ParameterColumn::Status, super::patch_status(self.status)?)
            .set_opt(ParameterColumn::UpdatedBy, self.updated_by))
    }
}
