//! Firmware usecases
//!
//! Firmware images live in the object store under `firmware/<model>/<name>`;
//! the record keeps the URL returned by the upload. Deleting a firmware moves
//! its image to the trash bucket inside the same unit of work.

use super::{ManagementService, ensure_free, require_model, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::Result;
use crate::core::object_store::{
    FIRMWARE_BUCKET, ObjectStore, TRASH_BUCKET, firmware_key, key_in_url,
};
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::store::{Repository, Store};
use crate::core::transaction;
use crate::entities::{FIRMWARE_COLUMNS, Firmware, FirmwareColumn, FirmwareUpdate};
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    /// Store the image and insert the record pointing at it
    pub async fn create_firmware(&self, firmware: Firmware, image: Vec<u8>) -> Result<Firmware> {
        let mut tx = self.store.begin().await?;
        let outcome = create_firmware_steps(&mut tx, &self.objects, firmware, image).await;
        let firmware = transaction::finish(tx, outcome).await?;
        tracing::info!(
            firmware_id = %firmware.id,
            model_id = %firmware.model_id,
            file_path = %firmware.file_path,
            "firmware created"
        );
        Ok(firmware)
    }

    pub async fn update_firmware(
        &self,
        model_id: Uuid,
        id: Uuid,
        update: FirmwareUpdate,
    ) -> Result<Firmware> {
        let mut tx = self.store.begin().await?;
        let outcome = update_firmware_steps(&mut tx, &self.objects, model_id, id, update).await;
        let firmware = transaction::finish(tx, outcome).await?;
        tracing::info!(firmware_id = %id, %model_id, "firmware updated");
        Ok(firmware)
    }

    pub async fn delete_firmware(&self, model_id: Uuid, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = delete_firmware_steps(&mut tx, &self.objects, model_id, id, updated_by).await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(firmware_id = %id, %model_id, updated_by, "firmware deleted");
        Ok(())
    }

    pub async fn get_firmware(&self, model_id: Uuid, id: Uuid) -> Result<Firmware> {
        let mut session = self.store.session().await?;
        require_model(&mut session, model_id).await?;
        find_owned(&mut session, model_id, id).await
    }

    /// Every live firmware of a model
    pub async fn firmwares_for_model(&self, model_id: Uuid) -> Result<Vec<Firmware>> {
        self.scope_model(model_id).await?;
        self.all_live::<Firmware>(vec![Condition::eq(FirmwareColumn::ModelId, model_id)])
            .await
    }

    pub async fn list_firmwares(
        &self,
        model_id: Uuid,
        request: &ListRequest,
    ) -> Result<Page<Firmware>> {
        self.scope_model(model_id).await?;
        let builder = EntityQueryBuilder::new(FIRMWARE_COLUMNS)
            .add_condition(Condition::eq(FirmwareColumn::ModelId, model_id));
        self.page::<Firmware>(with_request(builder, request)?).await
    }

    pub async fn count_firmwares_by_status(&self, model_id: Uuid, status: Status) -> Result<u64> {
        self.count_status::<Firmware>(status, vec![Condition::eq(FirmwareColumn::ModelId, model_id)])
            .await
    }
}

/// Live firmware `id` belonging to `model_id`
async fn find_owned<R: Repository>(repo: &mut R, model_id: Uuid, id: Uuid) -> Result<Firmware> {
    repo.find::<Firmware>(&[
        Condition::eq(FirmwareColumn::Id, id),
        Condition::eq(FirmwareColumn::ModelId, model_id),
        Condition::listable(),
    ])
    .await
}

async fn create_firmware_steps<R: Repository, O: ObjectStore>(
    repo: &mut R,
    objects: &O,
    mut firmware: Firmware,
    image: Vec<u8>,
) -> Result<Firmware> {
    firmware.check()?;
    let model = require_model(repo, firmware.model_id).await?;
    let name = firmware.name.clone();
    ensure_free::<Firmware, _>(
        repo,
        vec![Condition::eq(FirmwareColumn::Name, name.as_str())],
        None,
        "name",
        || format!("firmware already exists with name: {}", name),
    )
    .await?;

    firmware.file_path = objects
        .upload(FIRMWARE_BUCKET, &firmware_key(&model.name, &name), image)
        .await?;
    repo.insert(&mut firmware).await.map_err(|err| {
        err.conflict_as_invalid("name", format!("firmware already exists with name: {}", name))
    })?;
    Ok(firmware)
}

async fn update_firmware_steps<R: Repository, O: ObjectStore>(
    repo: &mut R,
    objects: &O,
    model_id: Uuid,
    id: Uuid,
    mut update: FirmwareUpdate,
) -> Result<Firmware> {
    let model = require_model(repo, model_id).await?;
    let existing = find_owned(repo, model_id, id).await?;
    if let Some(name) = update.name.clone() {
        ensure_free::<Firmware, _>(
            repo,
            vec![Condition::eq(FirmwareColumn::Name, name.as_str())],
            Some(id),
            "name",
            || format!("firmware already exists with name: {}", name),
        )
        .await?;
    }

    let mut changes = update.to_changes()?;
    if let Some(image) = update.file.take() {
        let name = update.name.as_deref().unwrap_or(&existing.name);
        let url = objects
            .upload(FIRMWARE_BUCKET, &firmware_key(&model.name, name), image)
            .await?;
        changes = changes.set(FirmwareColumn::FilePath, url);
    }
    repo.update::<Firmware>(id, &changes)
        .await
        .map_err(|err| err.conflict_as_invalid("name", "firmware name already in use"))
}

async fn delete_firmware_steps<R: Repository, O: ObjectStore>(
    repo: &mut R,
    objects: &O,
    model_id: Uuid,
    id: Uuid,
    updated_by: &str,
) -> Result<()> {
    let model = require_model(repo, model_id).await?;
    let firmware = find_owned(repo, model_id, id).await?;
    repo.soft_delete::<Firmware>(id, updated_by).await?;
    // the stored URL still names the image after a rename without a new file
    let key = key_in_url(&firmware.file_path, FIRMWARE_BUCKET)
        .map(str::to_string)
        .unwrap_or_else(|| firmware_key(&model.name, &firmware.name));
    objects.relocate(FIRMWARE_BUCKET, &key, TRASH_BUCKET).await
}
