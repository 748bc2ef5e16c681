//! Model usecases

use super::{ManagementService, ensure_free, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::store::{Repository, Store, find_live};
use crate::core::transaction;
use crate::entities::{MODEL_COLUMNS, Model, ModelColumn, ModelUpdate};
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    pub async fn create_model(&self, model: Model) -> Result<Model> {
        let mut tx = self.store.begin().await?;
        let outcome = create_model_steps(&mut tx, model).await;
        let model = transaction::finish(tx, outcome).await?;
        tracing::info!(model_id = %model.id, name = %model.name, "model created");
        Ok(model)
    }

    pub async fn update_model(&self, id: Uuid, update: ModelUpdate) -> Result<Model> {
        let mut tx = self.store.begin().await?;
        let outcome = update_model_steps(&mut tx, id, update).await;
        let model = transaction::finish(tx, outcome).await?;
        tracing::info!(model_id = %id, "model updated");
        Ok(model)
    }

    pub async fn delete_model(&self, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            find_live::<Model, _>(&mut tx, id).await?;
            tx.soft_delete::<Model>(id, updated_by).await
        }
        .await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(model_id = %id, updated_by, "model deleted");
        Ok(())
    }

    pub async fn find_model(&self, id: Uuid) -> Result<Model> {
        let mut session = self.store.session().await?;
        find_live::<Model, _>(&mut session, id).await
    }

    pub async fn list_models(&self, request: &ListRequest) -> Result<Page<Model>> {
        let builder = with_request(EntityQueryBuilder::new(MODEL_COLUMNS), request)?;
        self.page::<Model>(builder).await
    }

    pub async fn count_models_by_status(&self, status: Status) -> Result<u64> {
        self.count_status::<Model>(status, Vec::new()).await
    }
}

async fn create_model_steps<R: Repository>(repo: &mut R, mut model: Model) -> Result<Model> {
    model.check()?;
    let name = model.name.clone();
    ensure_free::<Model, _>(
        repo,
        vec![Condition::eq(ModelColumn::Name, name.as_str())],
        None,
        "name",
        || format!("model already exists with name: {}", name),
    )
    .await?;
    repo.insert(&mut model).await.map_err(|err| {
        err.conflict_as_invalid("name", format!("model already exists with name: {}", name))
    })?;
    Ok(model)
}

async fn update_model_steps<R: Repository>(
    repo: &mut R,
    id: Uuid,
    update: ModelUpdate,
) -> Result<Model> {
    find_live::<Model, _>(repo, id).await?;
    if let Some(name) = update.name.clone() {
        ensure_free::<Model, _>(
            repo,
            vec![Condition::eq(ModelColumn::Name, name.as_str())],
            Some(id),
            "name",
            || format!("model already exists with name: {}", name),
        )
        .await?;
    }
    let changes = update.into_changes()?;
    if changes.is_empty() {
        return Err(AppError::bad_request("no fields to update"));
    }
    repo.update::<Model>(id, &changes)
        .await
        .map_err(|err| err.conflict_as_invalid("name", "model name already in use"))
}
