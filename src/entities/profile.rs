//! Profiles and their parameter associations

use crate::core::condition::Changes;
use crate::core::entity::Status;
use crate::core::error::Result;
use crate::core::query_builder::AllowList;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_msg_type() -> i64 {
    1
}

impl_record!(
    /// A named bundle of parameters with the message options used to query them
    Profile, ProfileColumn, "Profile", "profiles",
    unique: [[Name]],
    {
        #[validate(length(min = 1, max = 64))]
        Name => name: String,
        #[serde(default = "default_msg_type")]
        MsgType => msg_type: i64,
        #[serde(default)]
        ReturnCommands => return_commands: bool,
        #[serde(default)]
        ReturnEvents => return_events: bool,
        #[serde(default)]
        ReturnParams => return_params: bool,
        #[serde(default)]
        ReturnUniqueKeySets => return_unique_key_sets: bool,
        #[serde(default)]
        AllowPartial => allow_partial: bool,
        #[serde(default)]
        SendResp => send_resp: bool,
        #[serde(default)]
        FirstLevelOnly => first_level_only: bool,
        #[serde(default)]
        #[validate(range(min = 0, max = 32767))]
        MaxDepth => max_depth: i64,
        #[serde(default)]
        Tags => tags: Vec<String>,
        #[serde(default)]
        #[validate(length(max = 255))]
        Description => description: String,
    }
);

impl_record!(
    /// Membership of a parameter in a profile
    ProfileParameter, ProfileParameterColumn, "ProfileParameter", "profile_parameters",
    unique: [[ProfileId, ParameterId]],
    {
        ProfileId => profile_id: Uuid,
        ParameterId => parameter_id: Uuid,
        #[serde(default)]
        DefaultValue => default_value: String,
        #[serde(default)]
        Required => required: bool,
    }
);

/// `profile_name` is accepted as an alias of `name`
pub const PROFILE_COLUMNS: AllowList<ProfileColumn> = &[
    ("id", ProfileColumn::Id),
    ("profile_name", ProfileColumn::Name),
    ("name", ProfileColumn::Name),
    ("msg_type", ProfileColumn::MsgType),
    ("return_commands", ProfileColumn::ReturnCommands),
    ("return_events", ProfileColumn::ReturnEvents),
    ("return_params", ProfileColumn::ReturnParams),
    ("return_unique_key_sets", ProfileColumn::ReturnUniqueKeySets),
    ("allow_partial", ProfileColumn::AllowPartial),
    ("send_resp", ProfileColumn::SendResp),
    ("first_level_only", ProfileColumn::FirstLevelOnly),
    ("max_depth", ProfileColumn::MaxDepth),
    ("tags", ProfileColumn::Tags),
    ("created_at", ProfileColumn::CreatedAt),
    ("updated_at", ProfileColumn::UpdatedAt),
    ("updated_by", ProfileColumn::UpdatedBy),
    ("status", ProfileColumn::Status),
];

impl Profile {
    pub fn new(name: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            name: name.into(),
            msg_type: default_msg_type(),
            return_commands: false,
            return_events: false,
            return_params: false,
            return_unique_key_sets: false,
            allow_partial: false,
            send_resp: false,
            first_level_only: false,
            max_depth: 0,
            tags: Vec::new(),
            description: String::new(),
        }
    }

    pub fn check(&self) -> Result<()> {
        Ok(self.validate()?)
    }
}

impl ProfileParameter {
    pub fn new(profile_id: Uuid, parameter_id: Uuid, updated_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            status: Status::Enable,
            updated_by: updated_by.into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            profile_id,
            parameter_id,
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

/// Partial update of a profile
///
/// When `parameters` is `Some`, the profile's associations are replaced by
/// exactly that set; `None` leaves them untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    pub msg_type: Option<i64>,
    pub return_commands: Option<bool>,
    pub return_events: Option<bool>,
    pub return_params: Option<bool>,
    pub return_unique_key_sets: Option<bool>,
    pub allow_partial: Option<bool>,
    pub send_resp: Option<bool>,
    pub first_level_only: Option<bool>,
    #[validate(range(min = 0, max = 32767))]
    pub max_depth: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub status: Option<Status>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub updated_by: Option<String>,
    pub parameters: Option<Vec<Uuid>>,
}

impl ProfileUpdate {
    /// Every column of `profile`, as used when an upsert finds an existing row
    pub fn replacing(profile: &Profile) -> Self {
        Self {
            name: Some(profile.name.clone()),
            msg_type: Some(profile.msg_type),
            return_commands: Some(profile.return_commands),
            return_events: Some(profile.return_events),
            return_params: Some(profile.return_params),
            return_unique_key_sets: Some(profile.return_unique_key_sets),
            allow_partial: Some(profile.allow_partial),
            send_resp: Some(profile.send_resp),
            first_level_only: Some(profile.first_level_only),
            max_depth: Some(profile.max_depth),
            tags: Some(profile.tags.clone()),
            status: Some(profile.status),
            description: Some(profile.description.clone()),
            updated_by: Some(profile.updated_by.clone()),
            parameters: None,
        }
    }

    pub fn to_changes(&self) -> Result<Changes<ProfileColumn>> {
        self.validate()?;
        Ok(Changes::new()
            .set_opt(ProfileColumn::Name, self.name.clone())
            .set_opt(ProfileColumn::MsgType, self.msg_type)
            .set_opt(ProfileColumn::ReturnCommands, self.return_commands)
            .set_opt(ProfileColumn::ReturnEvents, self.return_events)
            .set_opt(ProfileColumn::ReturnParams, self.return_params)
            .set_opt(ProfileColumn::ReturnUniqueKeySets, self.return_unique_key_sets)
            .set_opt(ProfileColumn::AllowPartial, self.allow_partial)
            .set_opt(ProfileColumn::SendResp, self.send_resp)
            .set_opt(ProfileColumn::FirstLevelOnly, self.first_level_only)
            .set_opt(ProfileColumn::MaxDepth, self.max_depth)
            .set_opt(ProfileColumn::Tags, self.tags.clone())
            .set_opt(ProfileColumn::Status, super::patch_status(self.status)?)
            .set_opt(ProfileColumn::Description, self.description.clone())
            .set_opt(ProfileColumn::UpdatedBy, self.updated_by.clone()))
    }
}
