//! Parameter usecases

use super::import::{Batch, PARAMETER_HEADER, data_rows};
use super::{ManagementService, ensure_free, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::store::{Repository, Store, find_live};
use crate::core::transaction;
use crate::entities::{PARAMETER_COLUMNS, Parameter, ParameterColumn, ParameterUpdate};
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    pub async fn create_parameter(&self, parameter: Parameter) -> Result<Parameter> {
        let mut tx = self.store.begin().await?;
        let outcome = create_parameter_steps(&mut tx, parameter).await;
        let parameter = transaction::finish(tx, outcome).await?;
        tracing::info!(parameter_id = %parameter.id, path = %parameter.path, "parameter created");
        Ok(parameter)
    }

    /// Import `Path, Data Type, Description` rows
    pub async fn create_parameters_from_records(
        &self,
        records: &[Vec<String>],
        updated_by: &str,
    ) -> Result<Vec<Uuid>> {
        let rows = data_rows(records, PARAMETER_HEADER)?;
        let mut tx = self.store.begin().await?;
        let outcome =
            import_parameters_steps(&mut tx, rows, updated_by, self.settings.batch_size).await;
        let ids = transaction::finish(tx, outcome).await?;
        tracing::info!(imported = ids.len(), "parameters imported");
        Ok(ids)
    }

    pub async fn update_parameter(&self, id: Uuid, update: ParameterUpdate) -> Result<Parameter> {
        let mut tx = self.store.begin().await?;
        let outcome = update_parameter_steps(&mut tx, id, update).await;
        let parameter = transaction::finish(tx, outcome).await?;
        tracing::info!(parameter_id = %id, "parameter updated");
        Ok(parameter)
    }

    pub async fn delete_parameter(&self, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            find_live::<Parameter, _>(&mut tx, id).await?;
            tx.soft_delete::<Parameter>(id, updated_by).await
        }
        .await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(parameter_id = %id, updated_by, "parameter deleted");
        Ok(())
    }

    /// Live parameters among `ids`; unknown ids are left out
    pub async fn get_parameters(&self, ids: &[Uuid]) -> Result<Vec<Parameter>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.all_live::<Parameter>(vec![Condition::any(ParameterColumn::Id, ids.iter().copied())])
            .await
    }

    pub async fn list_parameters(&self, request: &ListRequest) -> Result<Page<Parameter>> {
        let builder = with_request(EntityQueryBuilder::new(PARAMETER_COLUMNS), request)?;
        self.page::<Parameter>(builder).await
    }

    pub async fn count_parameters_by_status(&self, status: Status) -> Result<u64> {
        self.count_status::<Parameter>(status, Vec::new()).await
    }
}

fn path_taken(path: &str) -> String {
    format!("parameter already exists with path: {}", path)
}

pub(super) async fn path_in_use<R: Repository>(repo: &mut R, path: &str) -> Result<Option<Parameter>> {
    repo.find_optional::<Parameter>(&[
        Condition::eq(ParameterColumn::Path, path),
        Condition::listable(),
    ])
    .await
}

async fn create_parameter_steps<R: Repository>(
    repo: &mut R,
    mut parameter: Parameter,
) -> Result<Parameter> {
    parameter.check()?;
    let path = parameter.path.clone();
    ensure_free::<Parameter, _>(
        repo,
        vec![Condition::eq(ParameterColumn::Path, path.as_str())],
        None,
        "path",
        || path_taken(&path),
    )
    .await?;
    repo.insert(&mut parameter)
        .await
        .map_err(|err| err.conflict_as_invalid("path", path_taken(&path)))?;
    Ok(parameter)
}

async fn import_parameters_steps<R: Repository>(
    repo: &mut R,
    rows: &[Vec<String>],
    updated_by: &str,
    batch_size: usize,
) -> Result<Vec<Uuid>> {
    let mut batch = Batch::<Parameter>::new(batch_size);
    for (index, row) in rows.iter().enumerate() {
        if row.len() < PARAMETER_HEADER.len() {
            tracing::warn!(row = index + 1, columns = row.len(), "skipping short parameter row");
            continue;
        }
        let path = row[0].trim();
        if path.is_empty() {
            tracing::warn!(row = index + 1, "skipping parameter row without path");
            continue;
        }

        let mut parameter = Parameter::new(path, row[1].trim(), updated_by);
        parameter.description = row[2].trim().to_string();
        parameter.check()?;
        let buffered = batch.pending().iter().any(|pending| pending.path == path);
        if buffered || path_in_use(repo, path).await?.is_some() {
            return Err(AppError::invalid("path", path_taken(path)));
        }
        batch.push(repo, parameter).await?;
    }
    batch
        .finish(repo)
        .await
        .map_err(|err| err.conflict_as_invalid("path", "parameter path already in use"))
}

async fn update_parameter_steps<R: Repository>(
    repo: &mut R,
    id: Uuid,
    update: ParameterUpdate,
) -> Result<Parameter> {
    find_live::<Parameter, _>(repo, id).await?;
    if let Some(path) = update.path.clone() {
        ensure_free::<Parameter, _>(
            repo,
            vec![Condition::eq(ParameterColumn::Path, path.as_str())],
            Some(id),
            "path",
            || path_taken(&path),
        )
        .await?;
    }
    let changes = update.into_changes()?;
    repo.update::<Parameter>(id, &changes)
        .await
        .map_err(|err| err.conflict_as_invalid("path", "parameter path already in use"))
}
