//! Device usecases

use super::import::{Batch, DEVICE_HEADER, data_rows};
use super::{ManagementService, groups, require_model, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::field::{FieldFormat, FieldValue};
use crate::core::object_store::ObjectStore;
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::store::{Repository, Store};
use crate::core::transaction;
use crate::entities::device::normalize_mac;
use crate::entities::{DEVICE_COLUMNS, Device, DeviceColumn, DeviceUpdate};
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    pub async fn create_device(&self, device: Device) -> Result<Device> {
        let mut tx = self.store.begin().await?;
        let outcome = create_device_steps(&mut tx, device).await;
        let device = transaction::finish(tx, outcome).await?;
        tracing::info!(
            device_id = %device.id,
            mac_address = %device.mac_address,
            model_id = %device.model_id,
            "device created"
        );
        Ok(device)
    }

    /// Import devices of one model (and optionally one group) from MAC rows
    ///
    /// Rows whose MAC does not normalize to 12 characters are skipped.
    pub async fn create_devices_from_records(
        &self,
        records: &[Vec<String>],
        model_id: Uuid,
        group_id: Option<Uuid>,
        updated_by: &str,
    ) -> Result<Vec<Uuid>> {
        let rows = data_rows(records, DEVICE_HEADER)?;
        let mut tx = self.store.begin().await?;
        let outcome = import_devices_steps(
            &mut tx,
            rows,
            model_id,
            group_id,
            updated_by,
            self.settings.batch_size,
        )
        .await;
        let ids = transaction::finish(tx, outcome).await?;
        tracing::info!(%model_id, imported = ids.len(), "devices imported");
        Ok(ids)
    }

    pub async fn update_device(
        &self,
        model_id: Uuid,
        id: Uuid,
        update: DeviceUpdate,
    ) -> Result<Device> {
        let mut tx = self.store.begin().await?;
        let outcome = update_device_steps(&mut tx, model_id, id, update).await;
        let device = transaction::finish(tx, outcome).await?;
        tracing::info!(device_id = %id, %model_id, "device updated");
        Ok(device)
    }

    pub async fn delete_device(&self, model_id: Uuid, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            require_model(&mut tx, model_id).await?;
            find_owned(&mut tx, model_id, id).await?;
            tx.soft_delete::<Device>(id, updated_by).await
        }
        .await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(device_id = %id, %model_id, updated_by, "device deleted");
        Ok(())
    }

    pub async fn get_device(&self, model_id: Uuid, id: Uuid) -> Result<Device> {
        let mut session = self.store.session().await?;
        require_model(&mut session, model_id).await?;
        find_owned(&mut session, model_id, id).await
    }

    pub async fn list_devices(&self, model_id: Uuid, request: &ListRequest) -> Result<Page<Device>> {
        self.scope_model(model_id).await?;
        let builder = EntityQueryBuilder::new(DEVICE_COLUMNS)
            .add_condition(Condition::eq(DeviceColumn::ModelId, model_id));
        self.page::<Device>(with_request(builder, request)?).await
    }

    pub async fn count_devices_by_status(&self, model_id: Uuid, status: Status) -> Result<u64> {
        self.count_status::<Device>(status, vec![Condition::eq(DeviceColumn::ModelId, model_id)])
            .await
    }

    /// Live devices assigned to a group
    pub async fn count_devices_in_group(&self, model_id: Uuid, group_id: Uuid) -> Result<u64> {
        self.count_live::<Device>(vec![
            Condition::eq(DeviceColumn::ModelId, model_id),
            Condition::eq(DeviceColumn::GroupId, Some(group_id)),
        ])
        .await
    }
}

async fn find_owned<R: Repository>(repo: &mut R, model_id: Uuid, id: Uuid) -> Result<Device> {
    repo.find::<Device>(&[
        Condition::eq(DeviceColumn::Id, id),
        Condition::eq(DeviceColumn::ModelId, model_id),
        Condition::listable(),
    ])
    .await
}

fn mac_taken(mac: &str) -> AppError {
    AppError::invalid(
        "mac_address",
        format!("device already exists with mac address: {}", mac),
    )
}

/// The group must be live and belong to the model
async fn check_group<R: Repository>(repo: &mut R, model_id: Uuid, group_id: Uuid) -> Result<()> {
    match groups::find_owned(repo, model_id, group_id).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_exist() => Err(AppError::invalid(
            "group_id",
            format!(
                "group with id: {} does not belong to model with id: {}",
                group_id, model_id
            ),
        )),
        Err(err) => Err(err),
    }
}

async fn mac_in_use<R: Repository>(repo: &mut R, mac: &str) -> Result<bool> {
    Ok(repo
        .find_optional::<Device>(&[
            Condition::eq(DeviceColumn::MacAddress, mac),
            Condition::listable(),
        ])
        .await?
        .is_some())
}

async fn create_device_steps<R: Repository>(repo: &mut R, mut device: Device) -> Result<Device> {
    device.check()?;
    require_model(repo, device.model_id).await?;
    if mac_in_use(repo, &device.mac_address).await? {
        return Err(mac_taken(&device.mac_address));
    }
    if let Some(group_id) = device.group_id {
        check_group(repo, device.model_id, group_id).await?;
    }
    let mac = device.mac_address.clone();
    repo.insert(&mut device).await.map_err(|err| match err {
        AppError::EntityAlreadyExists { .. } => mac_taken(&mac),
        other => other,
    })?;
    Ok(device)
}

async fn import_devices_steps<R: Repository>(
    repo: &mut R,
    rows: &[Vec<String>],
    model_id: Uuid,
    group_id: Option<Uuid>,
    updated_by: &str,
    batch_size: usize,
) -> Result<Vec<Uuid>> {
    require_model(repo, model_id).await?;
    if let Some(group_id) = group_id {
        check_group(repo, model_id, group_id).await?;
    }

    let mut batch = Batch::<Device>::new(batch_size);
    for (index, row) in rows.iter().enumerate() {
        let raw = row.first().map(String::as_str).unwrap_or_default();
        if !FieldFormat::MacAddress.validate(&FieldValue::from(normalize_mac(raw))) {
            tracing::warn!(row = index + 1, mac = raw, "skipping row with malformed mac address");
            continue;
        }
        let device = Device::new(raw, model_id, group_id, updated_by);
        device.check()?;
        let buffered = batch
            .pending()
            .iter()
            .any(|pending| pending.mac_address == device.mac_address);
        if buffered || mac_in_use(repo, &device.mac_address).await? {
            return Err(mac_taken(&device.mac_address));
        }
        batch.push(repo, device).await.map_err(|err| {
            err.conflict_as_invalid("mac_address", "device already exists with mac address")
        })?;
    }
    batch
        .finish(repo)
        .await
        .map_err(|err| err.conflict_as_invalid("mac_address", "device already exists with mac address"))
}

async fn update_device_steps<R: Repository>(
    repo: &mut R,
    model_id: Uuid,
    id: Uuid,
    update: DeviceUpdate,
) -> Result<Device> {
    require_model(repo, model_id).await?;
    find_owned(repo, model_id, id).await?;
    if let Some(group_id) = update.group_id {
        check_group(repo, model_id, group_id).await?;
    }
    let changes = update.into_changes()?;
    repo.update::<Device>(id, &changes).await
}
