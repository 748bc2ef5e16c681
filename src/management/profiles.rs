//! Profile usecases
//!
//! A profile owns its parameter associations. Whenever a caller supplies a
//! parameter set, the associations are replaced as a whole: every row of the
//! profile is removed, then the new set is inserted, in one unit of work.

use super::import::{Batch, PROFILE_HEADER, data_rows, profile_row};
use super::parameters::path_in_use;
use super::{ManagementService, ensure_free, with_request};
use crate::core::condition::Condition;
use crate::core::entity::Status;
use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use crate::core::query::{ListRequest, Page};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::store::{Repository, Store, find_live};
use crate::core::transaction;
use crate::entities::{
    PROFILE_COLUMNS, Parameter, ParameterSpec, ParameterUpdate, Profile, ProfileColumn,
    ProfileParameter, ProfileParameterColumn, ProfileUpdate,
};
use std::collections::HashSet;
use uuid::Uuid;

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    /// Create a profile linked to existing parameters
    pub async fn create_profile_with_parameter_ids(
        &self,
        profile: Profile,
        parameter_ids: Vec<Uuid>,
    ) -> Result<Profile> {
        let mut tx = self.store.begin().await?;
        let outcome = create_with_ids_steps(&mut tx, profile, &parameter_ids).await;
        let profile = transaction::finish(tx, outcome).await?;
        tracing::info!(
            profile_id = %profile.id,
            parameters = parameter_ids.len(),
            "profile created"
        );
        Ok(profile)
    }

    /// Create a profile together with parameters that do not exist yet
    pub async fn create_profile_with_new_parameters(
        &self,
        profile: Profile,
        parameters: Vec<ParameterSpec>,
    ) -> Result<Profile> {
        let count = parameters.len();
        let mut tx = self.store.begin().await?;
        let outcome = create_with_new_steps(&mut tx, profile, parameters).await;
        let profile = transaction::finish(tx, outcome).await?;
        tracing::info!(profile_id = %profile.id, parameters = count, "profile created with parameters");
        Ok(profile)
    }

    /// Import profile rows; see [`PROFILE_HEADER`] for the columns
    pub async fn create_profiles_from_records(
        &self,
        records: &[Vec<String>],
        updated_by: &str,
    ) -> Result<Vec<Uuid>> {
        let rows = data_rows(records, PROFILE_HEADER)?;
        let mut tx = self.store.begin().await?;
        let outcome =
            import_profiles_steps(&mut tx, rows, updated_by, self.settings.batch_size).await;
        let ids = transaction::finish(tx, outcome).await?;
        tracing::info!(imported = ids.len(), "profiles imported");
        Ok(ids)
    }

    /// Create or overwrite a profile and its parameters, matched by name and path
    pub async fn upsert_profile_with_parameters(
        &self,
        profile: Profile,
        parameters: Vec<ParameterSpec>,
    ) -> Result<Profile> {
        let mut tx = self.store.begin().await?;
        let outcome = upsert_steps(&mut tx, profile, parameters).await;
        let profile = transaction::finish(tx, outcome).await?;
        tracing::info!(profile_id = %profile.id, name = %profile.name, "profile upserted");
        Ok(profile)
    }

    pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        let mut tx = self.store.begin().await?;
        let outcome = update_profile_steps(&mut tx, id, update).await;
        let profile = transaction::finish(tx, outcome).await?;
        tracing::info!(profile_id = %id, "profile updated");
        Ok(profile)
    }

    pub async fn delete_profile(&self, id: Uuid, updated_by: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            find_live::<Profile, _>(&mut tx, id).await?;
            tx.soft_delete::<Profile>(id, updated_by).await
        }
        .await;
        transaction::finish(tx, outcome).await?;
        tracing::info!(profile_id = %id, updated_by, "profile deleted");
        Ok(())
    }

    /// Live associations of a profile
    pub async fn profile_parameters(&self, profile_id: Uuid) -> Result<Vec<ProfileParameter>> {
        let mut session = self.store.session().await?;
        find_live::<Profile, _>(&mut session, profile_id).await?;
        drop(session);
        self.all_live::<ProfileParameter>(vec![Condition::eq(
            ProfileParameterColumn::ProfileId,
            profile_id,
        )])
        .await
    }

    pub async fn list_profiles(&self, request: &ListRequest) -> Result<Page<Profile>> {
        let builder = with_request(EntityQueryBuilder::new(PROFILE_COLUMNS), request)?;
        self.page::<Profile>(builder).await
    }

    pub async fn count_profiles_by_status(&self, status: Status) -> Result<u64> {
        self.count_status::<Profile>(status, Vec::new()).await
    }
}

fn name_taken(name: &str) -> String {
    format!("profile already exists with name: {}", name)
}

async fn ensure_name_free<R: Repository>(repo: &mut R, name: &str, except: Option<Uuid>) -> Result<()> {
    ensure_free::<Profile, _>(
        repo,
        vec![Condition::eq(ProfileColumn::Name, name)],
        except,
        "name",
        || name_taken(name),
    )
    .await
}

async fn insert_profile<R: Repository>(repo: &mut R, profile: &mut Profile) -> Result<()> {
    let name = profile.name.clone();
    repo.insert(profile)
        .await
        .map_err(|err| err.conflict_as_invalid("name", name_taken(&name)))
}

/// Every id must name a live parameter, once
async fn resolve_parameters<R: Repository>(repo: &mut R, ids: &[Uuid]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        if !seen.insert(*id) {
            return Err(AppError::invalid(
                "parameters",
                format!("duplicate parameter at index {}: {}", index, id),
            ));
        }
        match find_live::<Parameter, _>(repo, *id).await {
            Ok(_) => {}
            Err(err) if err.is_not_exist() => {
                return Err(AppError::invalid(
                    "parameters",
                    format!("parameter not found at index {}: {}", index, id),
                ));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Drop every association of the profile and insert `links` in their place
async fn replace_links<R: Repository>(
    repo: &mut R,
    profile_id: Uuid,
    mut links: Vec<ProfileParameter>,
) -> Result<()> {
    let removed = repo
        .delete_where::<ProfileParameter>(&[Condition::eq(
            ProfileParameterColumn::ProfileId,
            profile_id,
        )])
        .await?;
    tracing::debug!(%profile_id, removed, inserted = links.len(), "profile parameters replaced");
    repo.insert_batch(&mut links).await
}

async fn create_with_ids_steps<R: Repository>(
    repo: &mut R,
    mut profile: Profile,
    parameter_ids: &[Uuid],
) -> Result<Profile> {
    profile.check()?;
    ensure_name_free(repo, &profile.name, None).await?;
    resolve_parameters(repo, parameter_ids).await?;
    insert_profile(repo, &mut profile).await?;

    let mut links: Vec<ProfileParameter> = parameter_ids
        .iter()
        .map(|parameter_id| ProfileParameter::new(profile.id, *parameter_id, &profile.updated_by))
        .collect();
    repo.insert_batch(&mut links).await?;
    Ok(profile)
}

async fn create_with_new_steps<R: Repository>(
    repo: &mut R,
    mut profile: Profile,
    specs: Vec<ParameterSpec>,
) -> Result<Profile> {
    profile.check()?;
    ensure_name_free(repo, &profile.name, None).await?;

    let mut parameters = Vec::with_capacity(specs.len());
    let mut paths = HashSet::with_capacity(specs.len());
    for spec in &specs {
        let parameter = &spec.parameter;
        parameter.check()?;
        if !paths.insert(parameter.path.as_str())
            || path_in_use(repo, &parameter.path).await?.is_some()
        {
            return Err(AppError::invalid(
                "path",
                format!("parameter already exists with path: {}", parameter.path),
            ));
        }
        let mut fresh = parameter.clone();
        fresh.id = Uuid::nil();
        parameters.push(fresh);
    }
    repo.insert_batch(&mut parameters)
        .await
        .map_err(|err| err.conflict_as_invalid("path", "parameter path already in use"))?;
    insert_profile(repo, &mut profile).await?;

    let mut links: Vec<ProfileParameter> = parameters
        .iter()
        .zip(&specs)
        .map(|(parameter, spec)| {
            ProfileParameter::new(profile.id, parameter.id, &profile.updated_by)
                .with_default(spec.default_value.clone(), spec.required)
        })
        .collect();
    repo.insert_batch(&mut links).await?;
    Ok(profile)
}

async fn import_profiles_steps<R: Repository>(
    repo: &mut R,
    rows: &[Vec<String>],
    updated_by: &str,
    batch_size: usize,
) -> Result<Vec<Uuid>> {
    let mut profiles = Batch::<Profile>::new(batch_size);
    let mut links = Batch::<ProfileParameter>::new(batch_size);
    for row in rows {
        let (mut profile, parameter_ids) = profile_row(row, updated_by)?;
        profile.check()?;
        let buffered = profiles
            .pending()
            .iter()
            .any(|pending| pending.name == profile.name);
        if buffered {
            return Err(AppError::invalid("name", name_taken(&profile.name)));
        }
        ensure_name_free(repo, &profile.name, None).await?;
        resolve_parameters(repo, &parameter_ids).await?;

        // ids are assigned up front so the links can be buffered with the profile
        profile.id = Uuid::new_v4();
        for parameter_id in parameter_ids {
            links.buffer(
                ProfileParameter::new(profile.id, parameter_id, updated_by).with_default("", true),
            );
        }
        profiles.buffer(profile);

        // associations reference profiles, so profiles always flush first
        if profiles.is_full() || links.is_full() {
            profiles.flush(repo).await?;
            links.flush(repo).await?;
        }
    }
    let ids = profiles
        .finish(repo)
        .await
        .map_err(|err| err.conflict_as_invalid("name", "profile name already in use"))?;
    links.flush(repo).await?;
    Ok(ids)
}

async fn upsert_steps<R: Repository>(
    repo: &mut R,
    mut profile: Profile,
    specs: Vec<ParameterSpec>,
) -> Result<Profile> {
    profile.check()?;

    let mut links = Vec::with_capacity(specs.len());
    for spec in specs {
        spec.parameter.check()?;
        let parameter = match path_in_use(repo, &spec.parameter.path).await? {
            Some(existing) => {
                let changes = ParameterUpdate::replacing(&spec.parameter).into_changes()?;
                repo.update::<Parameter>(existing.id, &changes).await?
            }
            None => {
                let mut fresh = spec.parameter.clone();
                fresh.id = Uuid::nil();
                repo.insert(&mut fresh).await?;
                fresh
            }
        };
        links.push(
            ProfileParameter::new(Uuid::nil(), parameter.id, &profile.updated_by)
                .with_default(spec.default_value, spec.required),
        );
    }

    let existing = repo
        .find_optional::<Profile>(&[
            Condition::eq(ProfileColumn::Name, profile.name.as_str()),
            Condition::listable(),
        ])
        .await?;
    let profile = match existing {
        Some(existing) => {
            let changes = ProfileUpdate::replacing(&profile).to_changes()?;
            repo.update::<Profile>(existing.id, &changes).await?
        }
        None => {
            profile.id = Uuid::nil();
            insert_profile(repo, &mut profile).await?;
            profile
        }
    };

    for link in &mut links {
        link.profile_id = profile.id;
    }
    replace_links(repo, profile.id, links).await?;
    Ok(profile)
}

async fn update_profile_steps<R: Repository>(
    repo: &mut R,
    id: Uuid,
    update: ProfileUpdate,
) -> Result<Profile> {
    let current = find_live::<Profile, _>(repo, id).await?;
    if let Some(name) = &update.name {
        ensure_name_free(repo, name, Some(id)).await?;
    }
    if let Some(parameter_ids) = &update.parameters {
        resolve_parameters(repo, parameter_ids).await?;
    }

    let changes = update.to_changes()?;
    let profile = if changes.is_empty() {
        current
    } else {
        repo.update::<Profile>(id, &changes)
            .await
            .map_err(|err| err.conflict_as_invalid("name", "profile name already in use"))?
    };

    if let Some(parameter_ids) = update.parameters {
        let links = parameter_ids
            .into_iter()
            .map(|parameter_id| ProfileParameter::new(id, parameter_id, &profile.updated_by))
            .collect();
        replace_links(repo, id, links).await?;
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::Changes;
    use crate::core::entity::Record;
    use crate::core::error::StoreError;
    use crate::core::specification::SelectQuery;
    use crate::storage::{InMemoryObjectStore, InMemoryStore};

    fn service() -> ManagementService<InMemoryStore, InMemoryObjectStore> {
        ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default())
    }

    async fn parameter(
        service: &ManagementService<InMemoryStore, InMemoryObjectStore>,
        path: &str,
    ) -> Parameter {
        service
            .create_parameter(Parameter::new(path, "string", "tester"))
            .await
            .unwrap()
    }

    fn linked_ids(links: &[ProfileParameter]) -> HashSet<Uuid> {
        links.iter().map(|link| link.parameter_id).collect()
    }

    #[tokio::test]
    async fn test_create_with_missing_parameter_leaves_nothing() {
        let service = service();
        let a = parameter(&service, "Device.A").await;
        let missing = Uuid::new_v4();

        let err = service
            .create_profile_with_parameter_ids(Profile::new("boot", "tester"), vec![a.id, missing])
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AppError::InvalidRequest { field: Some(f), message } if f == "parameters" && message.contains("index 1"))
        );
        assert_eq!(service.count_profiles_by_status(Status::Enable).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_all_links() {
        let service = service();
        let a = parameter(&service, "Device.A").await;
        let b = parameter(&service, "Device.B").await;
        let c = parameter(&service, "Device.C").await;
        let profile = service
            .create_profile_with_parameter_ids(Profile::new("boot", "tester"), vec![a.id, b.id])
            .await
            .unwrap();

        let update = ProfileUpdate {
            parameters: Some(vec![b.id, c.id]),
            ..Default::default()
        };
        service.update_profile(profile.id, update).await.unwrap();

        let links = service.profile_parameters(profile.id).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(linked_ids(&links), HashSet::from([b.id, c.id]));
    }

    #[tokio::test]
    async fn test_update_without_parameters_keeps_links() {
        let service = service();
        let a = parameter(&service, "Device.A").await;
        let profile = service
            .create_profile_with_parameter_ids(Profile::new("boot", "tester"), vec![a.id])
            .await
            .unwrap();

        let update = ProfileUpdate {
            max_depth: Some(3),
            ..Default::default()
        };
        let updated = service.update_profile(profile.id, update).await.unwrap();

        assert_eq!(updated.max_depth, 3);
        assert_eq!(service.profile_parameters(profile.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_profile() {
        let service = service();
        let specs = || {
            vec![ParameterSpec::new(Parameter::new("Device.A", "string", "tester")).with_default("x", true)]
        };
        let first = service
            .upsert_profile_with_parameters(Profile::new("boot", "tester"), specs())
            .await
            .unwrap();

        let mut second = Profile::new("boot", "tester");
        second.max_depth = 7;
        let again = service
            .upsert_profile_with_parameters(second, specs())
            .await
            .unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.max_depth, 7);
        assert_eq!(service.count_profiles_by_status(Status::Enable).await.unwrap(), 1);
        assert_eq!(service.count_parameters_by_status(Status::Enable).await.unwrap(), 1);
        let links = service.profile_parameters(first.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].default_value, "x");
        assert!(links[0].required);
    }

    #[tokio::test]
    async fn test_new_parameters_reject_existing_path() {
        let service = service();
        parameter(&service, "Device.A").await;

        let err = service
            .create_profile_with_new_parameters(
                Profile::new("boot", "tester"),
                vec![ParameterSpec::new(Parameter::new("Device.A", "int", "tester"))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { field: Some(f), .. } if f == "path"));
    }

    #[tokio::test]
    async fn test_import_profiles() {
        let service = service();
        let a = parameter(&service, "Device.A").await;
        let header: Vec<String> = PROFILE_HEADER.iter().map(|h| h.to_string()).collect();
        let row = |name: &str| -> Vec<String> {
            [name, "1", "x;y", "2", "true", "", "", "", "", "", "", &a.id.to_string()]
                .iter()
                .map(|cell| cell.to_string())
                .collect()
        };
        let records = vec![header, row("p1"), row("p2")];
        let ids = service
            .create_profiles_from_records(&records, "importer")
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        let links = service.profile_parameters(ids[1]).await.unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].required);
        assert_eq!(links[0].updated_by, "importer");
    }

    fn import_records(parameter_ids: &str) -> Vec<Vec<String>> {
        let header: Vec<String> = PROFILE_HEADER.iter().map(|h| h.to_string()).collect();
        let row = ["p1", "1", "", "2", "", "", "", "", "", "", "", parameter_ids]
            .iter()
            .map(|cell| cell.to_string())
            .collect();
        vec![header, row]
    }

    #[tokio::test]
    async fn test_import_rejects_repeated_parameter_in_a_row() {
        let service = service();
        let a = parameter(&service, "Device.A").await;

        let err = service
            .create_profiles_from_records(&import_records(&format!("{},{}", a.id, a.id)), "importer")
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AppError::InvalidRequest { field: Some(f), message } if f == "parameters" && message.contains("duplicate"))
        );
        assert_eq!(service.count_profiles_by_status(Status::Enable).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_missing_parameter_is_invalid() {
        let service = service();
        let err = service
            .create_profiles_from_records(&import_records(&Uuid::new_v4().to_string()), "importer")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { field: Some(f), .. } if f == "parameters"));
    }

    /// Delegates to an in-memory session but times out on parameter lookups
    struct SlowParameters {
        inner: <InMemoryStore as Store>::Session,
    }

    #[async_trait::async_trait]
    impl Repository for SlowParameters {
        async fn find<E: Record>(&mut self, conditions: &[Condition<E::Column>]) -> Result<E> {
            if E::TABLE == Parameter::TABLE {
                return Err(StoreError::Timeout {
                    after: std::time::Duration::from_secs(30),
                }
                .into());
            }
            self.inner.find::<E>(conditions).await
        }

        async fn list<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<Vec<E>> {
            self.inner.list::<E>(query).await
        }

        async fn count<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<u64> {
            self.inner.count::<E>(query).await
        }

        async fn insert<E: Record>(&mut self, record: &mut E) -> Result<()> {
            self.inner.insert(record).await
        }

        async fn insert_batch<E: Record>(&mut self, records: &mut [E]) -> Result<()> {
            self.inner.insert_batch(records).await
        }

        async fn update<E: Record>(&mut self, id: Uuid, changes: &Changes<E::Column>) -> Result<E> {
            self.inner.update::<E>(id, changes).await
        }

        async fn soft_delete<E: Record>(&mut self, id: Uuid, updated_by: &str) -> Result<()> {
            self.inner.soft_delete::<E>(id, updated_by).await
        }

        async fn delete_where<E: Record>(
            &mut self,
            conditions: &[Condition<E::Column>],
        ) -> Result<u64> {
            self.inner.delete_where::<E>(conditions).await
        }
    }

    #[tokio::test]
    async fn test_import_keeps_store_failures() {
        let store = InMemoryStore::new();
        let mut repo = SlowParameters {
            inner: store.session().await.unwrap(),
        };
        let rows = import_records(&Uuid::new_v4().to_string());

        let err = import_profiles_steps(&mut repo, &rows[1..], "importer", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Db(StoreError::Timeout { .. })), "got {:?}", err);
    }
}
