//! Store contract tests, generated per backend
//!
//! `$factory` is evaluated inside each async test and must yield a fresh,
//! empty store implementing `fleet::core::store::Store`.

macro_rules! store_contract_tests {
    ($factory:expr) => {
        mod store_contract_tests {
            use super::*;
            use fleet::core::condition::{Changes, Condition};
            use fleet::core::entity::{Column, Status};
            use fleet::core::error::AppError;
            use fleet::core::query::ListRequest;
            use fleet::core::query_builder::EntityQueryBuilder;
            use fleet::core::specification::SelectQuery;
            use fleet::core::store::{Repository, Store, UnitOfWork, find_live};
            use fleet::entities::{
                Model, ModelColumn, PARAMETER_COLUMNS, PROFILE_COLUMNS, Parameter,
                ParameterColumn, Profile, ProfileColumn,
            };
            use uuid::Uuid;

            fn parameter_query(request: ListRequest) -> SelectQuery<ParameterColumn> {
                EntityQueryBuilder::new(PARAMETER_COLUMNS)
                    .with_options(request.to_options().unwrap())
                    .build()
                    .unwrap()
            }

            // =================================================================
            // Insert / find
            // =================================================================

            #[tokio::test]
            async fn test_insert_assigns_id_and_timestamps() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut record = model("AX3000");
                assert!(record.id.is_nil());

                session.insert(&mut record).await.unwrap();
                assert!(!record.id.is_nil());

                let found: Model = find_live(&mut session, record.id).await.unwrap();
                assert_eq!(found.name, "AX3000");
                assert_eq!(found.status, Status::Enable);
                assert_eq!(found.updated_by, "tester");
            }

            #[tokio::test]
            async fn test_find_missing_is_not_exist() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let err = find_live::<Model, _>(&mut session, Uuid::new_v4())
                    .await
                    .unwrap_err();
                assert_not_exist(&err);
            }

            #[tokio::test]
            async fn test_deleted_rows_need_explicit_lookup() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut record = model("AX3000");
                session.insert(&mut record).await.unwrap();
                session.soft_delete::<Model>(record.id, "remover").await.unwrap();

                assert_not_exist(&find_live::<Model, _>(&mut session, record.id).await.unwrap_err());
                let raw: Model = session
                    .find(&[Condition::eq(ModelColumn::ID, record.id)])
                    .await
                    .unwrap();
                assert_eq!(raw.status, Status::Delete);
                assert_eq!(raw.updated_by, "remover");
            }

            // =================================================================
            // List / count
            // =================================================================

            #[tokio::test]
            async fn test_list_filters_orders_and_windows() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                seed_parameters(
                    &mut session,
                    &["Device.D", "Device.B", "Device.A", "Other.C"],
                )
                .await;

                let query = parameter_query(
                    ListRequest::new(2, 1)
                        .with_filter("path like 'Device.'")
                        .with_order("path ASC"),
                );
                let page: Vec<Parameter> = session.list(&query).await.unwrap();
                assert_eq!(paths(&page), vec!["Device.B", "Device.D"]);

                let total = session.count::<Parameter>(&query.unpaged()).await.unwrap();
                assert_eq!(total, 3);
            }

            #[tokio::test]
            async fn test_list_regroups_or_filters() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut a = parameter("A", "int");
                let mut b = parameter("B", "string");
                let mut c = parameter("C", "int");
                for record in [&mut a, &mut b, &mut c] {
                    session.insert(record).await.unwrap();
                }

                // (path = A OR path = B) AND (data_type = int)
                let query = parameter_query(
                    ListRequest::default()
                        .with_filter("path eq 'A' or path eq 'B' and data_type eq 'int'"),
                );
                let rows: Vec<Parameter> = session.list(&query).await.unwrap();
                assert_eq!(paths(&rows), vec!["A"]);
            }

            #[tokio::test]
            async fn test_list_hides_deleted_unless_status_filtered() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let seeded = seed_parameters(&mut session, &["A", "B", "C"]).await;
                session.soft_delete::<Parameter>(seeded[1].id, "tester").await.unwrap();
                let disabled = Changes::new().set(ParameterColumn::STATUS, Status::Disable);
                session.update::<Parameter>(seeded[2].id, &disabled).await.unwrap();

                let all = parameter_query(ListRequest::default().with_order("path ASC"));
                let rows: Vec<Parameter> = session.list(&all).await.unwrap();
                assert_eq!(paths(&rows), vec!["A", "C"]);

                let only_disabled =
                    parameter_query(ListRequest::default().with_filter("status eq DISABLE"));
                let rows: Vec<Parameter> = session.list(&only_disabled).await.unwrap();
                assert_eq!(paths(&rows), vec!["C"]);
            }

            #[tokio::test]
            async fn test_membership_conditions() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let seeded = seed_parameters(&mut session, &["A", "B", "C"]).await;

                let picked = SelectQuery::with_conditions(vec![Condition::any(
                    ParameterColumn::ID,
                    [seeded[0].id, seeded[2].id],
                )])
                .order_by(ParameterColumn::Path, fleet::core::query::Direction::Asc);
                let rows: Vec<Parameter> = session.list(&picked).await.unwrap();
                assert_eq!(paths(&rows), vec!["A", "C"]);

                let none = SelectQuery::with_conditions(vec![Condition::any(
                    ParameterColumn::ID,
                    Vec::<Uuid>::new(),
                )]);
                assert_eq!(session.count::<Parameter>(&none).await.unwrap(), 0);
            }

            #[tokio::test]
            async fn test_list_column_filters() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut lab = Profile::new("lab", "tester");
                lab.tags = vec!["edge".to_string(), "lab".to_string()];
                let mut core = Profile::new("core", "tester");
                core.tags = vec!["core".to_string()];
                session.insert(&mut lab).await.unwrap();
                session.insert(&mut core).await.unwrap();

                let query = EntityQueryBuilder::new(PROFILE_COLUMNS)
                    .with_options(ListRequest::default().with_filter("tags eq edge").to_options().unwrap())
                    .build()
                    .unwrap();
                let rows: Vec<Profile> = session.list(&query).await.unwrap();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].name, "lab");
                assert_eq!(rows[0].tags, vec!["edge", "lab"]);

                let query = EntityQueryBuilder::<ProfileColumn>::new(PROFILE_COLUMNS)
                    .with_options(ListRequest::default().with_filter("tags ne edge").to_options().unwrap())
                    .build()
                    .unwrap();
                let rows: Vec<Profile> = session.list(&query).await.unwrap();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].name, "core");
            }

            // =================================================================
            // Update / delete
            // =================================================================

            #[tokio::test]
            async fn test_update_returns_changed_row() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut record = model("AX3000");
                session.insert(&mut record).await.unwrap();

                let changes = Changes::new()
                    .set(ModelColumn::Description, "router")
                    .set(ModelColumn::UPDATED_BY, "editor");
                let updated: Model = session.update(record.id, &changes).await.unwrap();
                assert_eq!(updated.description, "router");
                assert_eq!(updated.updated_by, "editor");
                assert_eq!(updated.name, "AX3000");
                assert!(updated.updated_at >= record.updated_at);
            }

            #[tokio::test]
            async fn test_update_missing_or_deleted_is_not_exist() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let changes = Changes::new().set(ModelColumn::Description, "x");
                assert_not_exist(
                    &session
                        .update::<Model>(Uuid::new_v4(), &changes)
                        .await
                        .unwrap_err(),
                );

                let mut record = model("AX3000");
                session.insert(&mut record).await.unwrap();
                session.soft_delete::<Model>(record.id, "tester").await.unwrap();
                assert_not_exist(&session.update::<Model>(record.id, &changes).await.unwrap_err());
                assert_not_exist(&session.soft_delete::<Model>(record.id, "tester").await.unwrap_err());
            }

            #[tokio::test]
            async fn test_unique_key_ignores_deleted_rows() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut first = model("AX3000");
                session.insert(&mut first).await.unwrap();

                let err = session.insert(&mut model("AX3000")).await.unwrap_err();
                assert!(
                    matches!(&err, AppError::EntityAlreadyExists { constraint, .. } if constraint == "models_name_idx"),
                    "unexpected error: {:?}",
                    err
                );

                session.soft_delete::<Model>(first.id, "tester").await.unwrap();
                session.insert(&mut model("AX3000")).await.unwrap();
            }

            #[tokio::test]
            async fn test_insert_batch_and_delete_where() {
                let store = $factory;
                let mut session = store.session().await.unwrap();
                let mut batch: Vec<Parameter> =
                    ["A", "B", "C"].iter().map(|path| parameter(path, "int")).collect();
                session.insert_batch(&mut batch).await.unwrap();
                assert!(batch.iter().all(|p| !p.id.is_nil()));

                let removed = session
                    .delete_where::<Parameter>(&[Condition::any(
                        ParameterColumn::Path,
                        ["A", "B"],
                    )])
                    .await
                    .unwrap();
                assert_eq!(removed, 2);
                let left = session
                    .count::<Parameter>(&SelectQuery::new())
                    .await
                    .unwrap();
                assert_eq!(left, 1);
            }

            // =================================================================
            // Units of work
            // =================================================================

            #[tokio::test]
            async fn test_commit_publishes_writes() {
                let store = $factory;
                let mut tx = store.begin().await.unwrap();
                seed_parameters(&mut tx, &["A", "B"]).await;
                tx.commit().await.unwrap();

                let mut session = store.session().await.unwrap();
                assert_eq!(session.count::<Parameter>(&SelectQuery::new()).await.unwrap(), 2);
            }

            #[tokio::test]
            async fn test_rollback_discards_writes() {
                let store = $factory;
                let mut tx = store.begin().await.unwrap();
                seed_parameters(&mut tx, &["A", "B"]).await;
                tx.rollback().await.unwrap();

                let mut session = store.session().await.unwrap();
                assert_eq!(session.count::<Parameter>(&SelectQuery::new()).await.unwrap(), 0);
            }

            #[tokio::test]
            async fn test_dropped_unit_of_work_discards_writes() {
                let store = $factory;
                {
                    let mut tx = store.begin().await.unwrap();
                    seed_parameters(&mut tx, &["A"]).await;
                }

                let mut session = store.session().await.unwrap();
                assert_eq!(session.count::<Parameter>(&SelectQuery::new()).await.unwrap(), 0);
            }

            #[tokio::test]
            async fn test_unit_of_work_reads_its_own_writes() {
                let store = $factory;
                let mut tx = store.begin().await.unwrap();
                let seeded = seed_parameters(&mut tx, &["A"]).await;
                let found: Parameter = find_live(&mut tx, seeded[0].id).await.unwrap();
                assert_eq!(found.path, "A");

                let err = tx.insert(&mut parameter("A", "int")).await.unwrap_err();
                assert!(matches!(err, AppError::EntityAlreadyExists { .. }));
                tx.rollback().await.unwrap();
            }
        }
    };
}
