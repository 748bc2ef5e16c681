//! Tabular exports
//!
//! Exports apply the same allow-list, status and ordering rules as the list
//! operations but return every matching row. Timestamps are RFC 3339 in the
//! configured export offset.

use super::ManagementService;
use crate::core::condition::Condition;
use crate::core::entity::{Column, Record};
use crate::core::error::Result;
use crate::core::object_store::ObjectStore;
use crate::core::query::{Direction, ListRequest};
use crate::core::query_builder::{AllowList, EntityQueryBuilder};
use crate::core::specification::SelectQuery;
use crate::core::store::{Repository, Store};
use crate::entities::{
    DEVICE_COLUMNS, Device, DeviceColumn, FIRMWARE_COLUMNS, Firmware, FirmwareColumn,
    GROUP_COLUMNS, Group, GroupColumn, PARAMETER_COLUMNS, Parameter, ParameterColumn,
    PROFILE_COLUMNS, Profile, ProfileParameter, ProfileParameterColumn,
};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// A header row and the data rows under it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|name| name.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

fn stamp(at: DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    /// Every row matching the request's filter and order
    async fn export_rows<E: Record>(
        &self,
        allowed: AllowList<E::Column>,
        scope: Option<Condition<E::Column>>,
        request: &ListRequest,
    ) -> Result<Vec<E>> {
        let mut builder = EntityQueryBuilder::new(allowed).with_options(request.to_options()?);
        if let Some(condition) = scope {
            builder = builder.add_condition(condition);
        }
        let query = builder.unpaged().build()?;
        let mut session = self.store.session().await?;
        let rows = session.list::<E>(&query).await?;
        tracing::debug!(entity = E::TABLE, rows = rows.len(), "export rows loaded");
        Ok(rows)
    }

    pub async fn export_parameters(&self, request: &ListRequest) -> Result<Table> {
        let offset = self.settings.export_offset;
        let parameters = self
            .export_rows::<Parameter>(PARAMETER_COLUMNS, None, request)
            .await?;

        let mut table = Table::new(&[
            "path",
            "data_type",
            "description",
            "created_at",
            "updated_at",
            "updated_by",
            "status",
        ]);
        table.rows = parameters
            .into_iter()
            .map(|p| {
                vec![
                    p.path,
                    p.data_type,
                    p.description,
                    stamp(p.created_at, &offset),
                    stamp(p.updated_at, &offset),
                    p.updated_by,
                    p.status.to_string(),
                ]
            })
            .collect();
        Ok(table)
    }

    /// Profiles with the paths of their parameters, `;`-joined
    pub async fn export_profiles(&self, request: &ListRequest) -> Result<Table> {
        let offset = self.settings.export_offset;
        let profiles = self
            .export_rows::<Profile>(PROFILE_COLUMNS, None, request)
            .await?;
        let paths = self
            .parameter_paths(profiles.iter().map(|profile| profile.id).collect())
            .await?;

        let mut table = Table::new(&[
            "name",
            "msg_type",
            "return_commands",
            "return_events",
            "return_params",
            "return_unique_key_sets",
            "allow_partial",
            "send_resp",
            "first_level_only",
            "max_depth",
            "tags",
            "created_at",
            "updated_at",
            "updated_by",
            "status",
            "description",
            "parameter_paths",
        ]);
        table.rows = profiles
            .into_iter()
            .map(|p| {
                let parameter_paths = paths.get(&p.id).map(|paths| paths.join(";")).unwrap_or_default();
                vec![
                    p.name,
                    p.msg_type.to_string(),
                    p.return_commands.to_string(),
                    p.return_events.to_string(),
                    p.return_params.to_string(),
                    p.return_unique_key_sets.to_string(),
                    p.allow_partial.to_string(),
                    p.send_resp.to_string(),
                    p.first_level_only.to_string(),
                    p.max_depth.to_string(),
                    p.tags.join(";"),
                    stamp(p.created_at, &offset),
                    stamp(p.updated_at, &offset),
                    p.updated_by,
                    p.status.to_string(),
                    p.description,
                    parameter_paths,
                ]
            })
            .collect();
        Ok(table)
    }

    pub async fn export_devices(&self, model_id: Uuid, request: &ListRequest) -> Result<Table> {
        self.scope_model(model_id).await?;
        let offset = self.settings.export_offset;
        let devices = self
            .export_rows::<Device>(
                DEVICE_COLUMNS,
                Some(Condition::eq(DeviceColumn::ModelId, model_id)),
                request,
            )
            .await?;

        let mut table = Table::new(&[
            "mac_address",
            "endpoint_id",
            "model_id",
            "group_id",
            "created_at",
            "updated_at",
            "updated_by",
            "status",
            "description",
        ]);
        table.rows = devices
            .into_iter()
            .map(|d| {
                vec![
                    d.mac_address,
                    d.endpoint_id,
                    d.model_id.to_string(),
                    d.group_id.map(|id| id.to_string()).unwrap_or_default(),
                    stamp(d.created_at, &offset),
                    stamp(d.updated_at, &offset),
                    d.updated_by,
                    d.status.to_string(),
                    d.description,
                ]
            })
            .collect();
        Ok(table)
    }

    pub async fn export_firmwares(&self, model_id: Uuid, request: &ListRequest) -> Result<Table> {
        self.scope_model(model_id).await?;
        let offset = self.settings.export_offset;
        let firmwares = self
            .export_rows::<Firmware>(
                FIRMWARE_COLUMNS,
                Some(Condition::eq(FirmwareColumn::ModelId, model_id)),
                request,
            )
            .await?;

        let mut table = Table::new(&[
            "name",
            "file_path",
            "description",
            "created_at",
            "updated_at",
            "updated_by",
            "status",
        ]);
        table.rows = firmwares
            .into_iter()
            .map(|f| {
                vec![
                    f.name,
                    f.file_path,
                    f.description,
                    stamp(f.created_at, &offset),
                    stamp(f.updated_at, &offset),
                    f.updated_by,
                    f.status.to_string(),
                ]
            })
            .collect();
        Ok(table)
    }

    pub async fn export_groups(&self, model_id: Uuid, request: &ListRequest) -> Result<Table> {
        self.scope_model(model_id).await?;
        let offset = self.settings.export_offset;
        let groups = self
            .export_rows::<Group>(
                GROUP_COLUMNS,
                Some(Condition::eq(GroupColumn::ModelId, model_id)),
                request,
            )
            .await?;

        let mut table = Table::new(&[
            "name",
            "description",
            "created_at",
            "updated_at",
            "updated_by",
            "status",
        ]);
        table.rows = groups
            .into_iter()
            .map(|g| {
                vec![
                    g.name,
                    g.description,
                    stamp(g.created_at, &offset),
                    stamp(g.updated_at, &offset),
                    g.updated_by,
                    g.status.to_string(),
                ]
            })
            .collect();
        Ok(table)
    }

    /// Parameter paths per profile, in association order, with two queries
    async fn parameter_paths(&self, profile_ids: Vec<Uuid>) -> Result<HashMap<Uuid, Vec<String>>> {
        if profile_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut session = self.store.session().await?;
        let links = session
            .list::<ProfileParameter>(
                &SelectQuery::with_conditions(vec![
                    Condition::any(ProfileParameterColumn::ProfileId, profile_ids),
                    Condition::listable(),
                ])
                .order_by(ProfileParameterColumn::CREATED_AT, Direction::Asc),
            )
            .await?;
        if links.is_empty() {
            return Ok(HashMap::new());
        }

        let parameter_ids: Vec<Uuid> = links.iter().map(|link| link.parameter_id).collect();
        let parameters = session
            .list::<Parameter>(&SelectQuery::with_conditions(vec![Condition::any(
                ParameterColumn::Id,
                parameter_ids,
            )]))
            .await?;
        let path_of: HashMap<Uuid, String> = parameters
            .into_iter()
            .map(|parameter| (parameter.id, parameter.path))
            .collect();

        let mut paths: HashMap<Uuid, Vec<String>> = HashMap::new();
        for link in links {
            if let Some(path) = path_of.get(&link.parameter_id) {
                paths.entry(link.profile_id).or_default().push(path.clone());
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Model;
    use crate::storage::{InMemoryObjectStore, InMemoryStore};

    fn service() -> ManagementService<InMemoryStore, InMemoryObjectStore> {
        ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default())
    }

    #[test]
    fn test_stamp_uses_offset() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T20:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        assert_eq!(stamp(at, &offset), "2024-05-02T03:30:00+07:00");
        assert_eq!(stamp(at, &FixedOffset::east_opt(0).unwrap()), "2024-05-01T20:30:00Z");
    }

    #[tokio::test]
    async fn test_export_profiles_joins_paths() {
        let service = service();
        let a = service
            .create_parameter(Parameter::new("Device.A", "string", "tester"))
            .await
            .unwrap();
        let mut profile = Profile::new("boot", "tester");
        profile.tags = vec!["x".to_string(), "y".to_string()];
        service
            .create_profile_with_parameter_ids(profile, vec![a.id])
            .await
            .unwrap();

        let table = service.export_profiles(&ListRequest::default()).await.unwrap();
        assert_eq!(table.header.len(), 17);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row[0], "boot");
        assert_eq!(row[10], "x;y");
        assert_eq!(row[16], "Device.A");
    }

    #[tokio::test]
    async fn test_export_ignores_pagination_but_not_filters() {
        let service = service();
        let model = service
            .create_model(Model::new("AX3000", "Wifi 6", "CIG", "tester"))
            .await
            .unwrap();
        for index in 0..3 {
            let mac = format!("00112233440{}", index);
            service
                .create_device(Device::new(&mac, model.id, None, "tester"))
                .await
                .unwrap();
        }

        let all = service
            .export_devices(model.id, &ListRequest::new(1, 0))
            .await
            .unwrap();
        assert_eq!(all.rows.len(), 3);
        assert_eq!(all.header[0], "mac_address");

        let one = service
            .export_devices(
                model.id,
                &ListRequest::default().with_filter("mac_address eq '001122334401'"),
            )
            .await
            .unwrap();
        assert_eq!(one.rows.len(), 1);
        assert_eq!(one.rows[0][1], "os::001122-001122334401");
    }
}
