//! Group usecases

use super::{ManagementService, ensure_free, require_model, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::specification::SelectQuery;
use crate::core::store::{Repository, Store};
use crate::core::transaction;
use crate::entities::{
    DeviceColumn, Device, Firmware, FirmwareColumn, GROUP_COLUMNS, Group, GroupColumn, GroupUpdate,
};
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    pub async fn create_group(&self, group: Group) -> Result<Group> {
        let mut tx = self.store.begin().await?;
        let outcome = create_group_steps(&mut tx, group).await;
        let group = transaction::finish(tx, outcome).await?;
        tracing::info!(group_id = %group.id, model_id = %group.model_id, "group created");
        Ok(group)
    }

    pub async fn update_group(&self, model_id: Uuid, id: Uuid, update: GroupUpdate) -> Result<Group> {
        let mut tx = self.store.begin().await?;
        let outcome = update_group_steps(&mut tx, model_id, id, update).await;
        let group = transaction::finish(tx, outcome).await?;
        tracing::info!(group_id = %id, %model_id, "group updated");
        Ok(group)
    }

    /// Soft delete a group that no longer holds live devices
    pub async fn delete_group(&self, model_id: Uuid, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = delete_group_steps(&mut tx, model_id, id, updated_by).await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(group_id = %id, %model_id, updated_by, "group deleted");
        Ok(())
    }

    pub async fn get_group(&self, model_id: Uuid, id: Uuid) -> Result<Group> {
        let mut session = self.store.session().await?;
        require_model(&mut session, model_id).await?;
        find_owned(&mut session, model_id, id).await
    }

    /// Every live group of a model
    pub async fn groups_for_model(&self, model_id: Uuid) -> Result<Vec<Group>> {
        self.scope_model(model_id).await?;
        self.all_live::<Group>(vec![Condition::eq(GroupColumn::ModelId, model_id)])
            .await
    }

    pub async fn list_groups(&self, model_id: Uuid, request: &ListRequest) -> Result<Page<Group>> {
        self.scope_model(model_id).await?;
        let builder = EntityQueryBuilder::new(GROUP_COLUMNS)
            .add_condition(Condition::eq(GroupColumn::ModelId, model_id));
        self.page::<Group>(with_request(builder, request)?).await
    }

    pub async fn count_groups_by_status(&self, model_id: Uuid, status: Status) -> Result<u64> {
        self.count_status::<Group>(status, vec![Condition::eq(GroupColumn::ModelId, model_id)])
            .await
    }
}

pub(super) async fn find_owned<R: Repository>(
    repo: &mut R,
    model_id: Uuid,
    id: Uuid,
) -> Result<Group> {
    repo.find::<Group>(&[
        Condition::eq(GroupColumn::Id, id),
        Condition::eq(GroupColumn::ModelId, model_id),
        Condition::listable(),
    ])
    .await
}

fn name_taken(name: &str) -> String {
    format!("group already exists with name: {}", name)
}

async fn create_group_steps<R: Repository>(repo: &mut R, mut group: Group) -> Result<Group> {
    group.check()?;
    require_model(repo, group.model_id).await?;
    if let Some(firmware_id) = group.firmware_id {
        let firmware = repo
            .find_optional::<Firmware>(&[
                Condition::eq(FirmwareColumn::Id, firmware_id),
                Condition::listable(),
            ])
            .await?
            .ok_or_else(|| {
                AppError::invalid(
                    "firmware_id",
                    format!("firmware not found with id: {}", firmware_id),
                )
            })?;
        if firmware.model_id != group.model_id {
            return Err(AppError::invalid(
                "firmware_id",
                format!(
                    "firmware with id: {} does not belong to model with id: {}",
                    firmware_id, group.model_id
                ),
            ));
        }
    }

    let name = group.name.clone();
    ensure_free::<Group, _>(
        repo,
        vec![
            Condition::eq(GroupColumn::ModelId, group.model_id),
            Condition::eq(GroupColumn::Name, name.as_str()),
        ],
        None,
        "name",
        || name_taken(&name),
    )
    .await?;
    repo.insert(&mut group)
        .await
        .map_err(|err| err.conflict_as_invalid("name", name_taken(&name)))?;
    Ok(group)
}

async fn update_group_steps<R: Repository>(
    repo: &mut R,
    model_id: Uuid,
    id: Uuid,
    update: GroupUpdate,
) -> Result<Group> {
    require_model(repo, model_id).await?;
    find_owned(repo, model_id, id).await?;
    if let Some(name) = update.name.clone() {
        ensure_free::<Group, _>(
            repo,
            vec![
                Condition::eq(GroupColumn::ModelId, model_id),
                Condition::eq(GroupColumn::Name, name.as_str()),
            ],
            Some(id),
            "name",
            || name_taken(&name),
        )
        .await?;
    }
    if let Some(firmware_id) = update.firmware_id {
        let owned = repo
            .find_optional::<Firmware>(&[
                Condition::eq(FirmwareColumn::Id, firmware_id),
                Condition::eq(FirmwareColumn::ModelId, model_id),
                Condition::listable(),
            ])
            .await?;
        if owned.is_none() {
            return Err(AppError::invalid(
                "firmware_id",
                format!("firmware id={} does not belong to model", firmware_id),
            ));
        }
    }

    let changes = update.into_changes()?;
    repo.update::<Group>(id, &changes)
        .await
        .map_err(|err| err.conflict_as_invalid("name", "group name already in use"))
}

async fn delete_group_steps<R: Repository>(
    repo: &mut R,
    model_id: Uuid,
    id: Uuid,
    updated_by: &str,
) -> Result<()> {
    require_model(repo, model_id).await?;
    find_owned(repo, model_id, id).await?;
    let members = SelectQuery::with_conditions(vec![
        Condition::eq(DeviceColumn::GroupId, Some(id)),
        Condition::listable(),
    ]);
    let remaining = repo.count::<Device>(&members).await?;
    if remaining > 0 {
        return Err(AppError::invalid(
            "group_id",
            format!("group with id: {} still has {} devices", id, remaining),
        ));
    }
    repo.soft_delete::<Group>(id, updated_by).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Model;
    use crate::storage::{InMemoryObjectStore, InMemoryStore};

    async fn setup() -> (ManagementService<InMemoryStore, InMemoryObjectStore>, Model) {
        let service = ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default());
        let model = service
            .create_model(Model::new("AX3000", "Wifi 6", "CIG", "tester"))
            .await
            .unwrap();
        (service, model)
    }

    #[tokio::test]
    async fn test_group_names_are_unique_per_model() {
        let (service, model) = setup().await;
        let other = service
            .create_model(Model::new("AX6000", "Wifi 6", "CIG", "tester"))
            .await
            .unwrap();
        service.create_group(Group::new(model.id, "lab", "tester")).await.unwrap();
        service.create_group(Group::new(other.id, "lab", "tester")).await.unwrap();

        let err = service
            .create_group(Group::new(model.id, "lab", "tester"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { field: Some(f), .. } if f == "name"));
    }

    #[tokio::test]
    async fn test_firmware_of_other_model_is_rejected() {
        let (service, model) = setup().await;
        let other = service
            .create_model(Model::new("AX6000", "Wifi 6", "CIG", "tester"))
            .await
            .unwrap();
        let firmware = service
            .create_firmware(Firmware::new(other.id, "v1", "tester"), vec![1])
            .await
            .unwrap();

        let mut group = Group::new(model.id, "lab", "tester");
        group.firmware_id = Some(firmware.id);
        let err = service.create_group(group).await.unwrap_err();
        assert!(
            matches!(err, AppError::InvalidRequest { field: Some(f), .. } if f == "firmware_id")
        );
    }

    #[tokio::test]
    async fn test_empty_download_period_gets_default() {
        let (service, model) = setup().await;
        let mut group = Group::new(model.id, "lab", "tester");
        group.download_period = String::new();
        let group = service.create_group(group).await.unwrap();
        assert_eq!(group.download_period, "00:00~00:00");
    }

    #[tokio::test]
    async fn test_delete_rejects_group_with_devices() {
        let (service, model) = setup().await;
        let group = service.create_group(Group::new(model.id, "lab", "tester")).await.unwrap();
        let device = service
            .create_device(Device::new("AA:BB:CC:00:11:22", model.id, Some(group.id), "tester"))
            .await
            .unwrap();

        let err = service.delete_group(model.id, group.id, "tester").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { .. }));

        service.delete_device(model.id, device.id, "tester").await.unwrap();
        service.delete_group(model.id, group.id, "tester").await.unwrap();
        assert!(service.groups_for_model(model.id).await.unwrap().is_empty());
    }
}
