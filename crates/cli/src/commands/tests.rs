use super::*;
use fieldsync_core::OperationKind;
use tempfile::TempDir;

fn setup_session() -> (Session, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    // Nothing listens on port 1, so probes fail fast
    config.sync.base_url = "http://127.0.0.1:1/api".to_string();
    config.sync.request_timeout_secs = 2;

    let session = Session {
        config,
        database_path: temp_dir.path().join("data").join("fieldsync.db"),
    };
    (session, temp_dir)
}

fn sub_matches(args: &[&str]) -> ArgMatches {
    let mut argv = vec!["fieldsync"];
    argv.extend_from_slice(args);
    let matches = crate::build_cli().try_get_matches_from(argv).unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    sub.clone()
}

#[tokio::test]
async fn test_create_writes_record_and_queues_operation() {
    let (session, _temp) = setup_session();

    create_record(
        &session,
        &sub_matches(&["create", "germplasm", r#"{"id":"g1","name":"IR64"}"#]),
    )
    .await
    .unwrap();

    let store = open_store(&session.database_path).await.unwrap();
    let record = store
        .get_record(EntityType::Germplasm, "g1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.sync_status, SyncStatus::Pending);
    assert_eq!(record.field("name"), Some(&serde_json::json!("IR64")));

    let pending = store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, OperationKind::Create);
}

#[tokio::test]
async fn test_update_and_remove() {
    let (session, _temp) = setup_session();

    create_record(
        &session,
        &sub_matches(&["create", "trial", r#"{"id":"t1","status":"planned"}"#]),
    )
    .await
    .unwrap();
    update_record(
        &session,
        &sub_matches(&["update", "trial", "t1", r#"{"status":"active"}"#]),
    )
    .await
    .unwrap();

    let store = open_store(&session.database_path).await.unwrap();
    let record = store.get_record(EntityType::Trial, "t1").await.unwrap().unwrap();
    assert_eq!(record.field("status"), Some(&serde_json::json!("active")));
    store.close().await;

    remove_record(&session, &sub_matches(&["remove", "trial", "t1"]))
        .await
        .unwrap();

    let result = show_record(&session, &sub_matches(&["get", "trial", "t1"])).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_rejects_bad_input() {
    let (session, _temp) = setup_session();

    let unknown_type = create_record(&session, &sub_matches(&["create", "plot", "{}"])).await;
    assert!(unknown_type.is_err());

    let not_json = create_record(&session, &sub_matches(&["create", "study", "{name"])).await;
    assert!(not_json.is_err());

    let not_object = create_record(&session, &sub_matches(&["create", "study", "[1,2]"])).await;
    assert!(not_object.is_err());
}

#[tokio::test]
async fn test_read_only_commands_on_empty_store() {
    let (session, _temp) = setup_session();

    list_records(&session, &sub_matches(&["list", "observation"]))
        .await
        .unwrap();
    list_pending(&session).await.unwrap();
    show_stats(&session).await.unwrap();
    show_log(&session, &sub_matches(&["log", "--limit", "5"]))
        .await
        .unwrap();
    list_conflicts(&session).await.unwrap();
}

#[tokio::test]
async fn test_sync_fails_when_remote_unreachable() {
    let (session, _temp) = setup_session();

    create_record(
        &session,
        &sub_matches(&["create", "location", r#"{"id":"l1","name":"North field"}"#]),
    )
    .await
    .unwrap();

    assert!(run_sync(&session).await.is_err());

    // The queued create survives the failed attempt
    let store = open_store(&session.database_path).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_store_failures_are_explained() {
    let (session, _temp) = setup_session();

    let err = update_record(
        &session,
        &sub_matches(&["update", "study", "missing", r#"{"name":"x"}"#]),
    )
    .await
    .unwrap_err();

    let text = describe_error(&err);
    assert!(text.contains("study/missing"));
    assert!(text.contains("The requested item was not found."));
    assert!(!is_critical(&err));
}

#[tokio::test]
async fn test_argument_failures_have_no_store_explanation() {
    let (session, _temp) = setup_session();

    let err = create_record(&session, &sub_matches(&["create", "study", "{name"]))
        .await
        .unwrap_err();

    assert!(app_error(&err).is_none());
    assert!(!describe_error(&err).contains('\n'));
    assert!(!is_critical(&err));
}

#[test]
fn test_sync_config_from_settings() {
    let mut config = Config::default();
    config.sync.conflict_strategy = "manual".to_string();
    config.sync.entity_types = vec![EntityType::Program];

    let sync = sync_config(&config).unwrap();
    assert_eq!(sync.conflict_strategy, ConflictStrategy::Manual);
    assert_eq!(sync.entity_types, vec![EntityType::Program]);

    config.sync.conflict_strategy = "latest".to_string();
    assert!(sync_config(&config).is_err());
}

#[test]
fn test_parse_json_object() {
    assert!(parse_json_object(r#"{"a":1}"#).is_ok());
    assert!(parse_json_object("42").is_err());
    assert!(parse_json_object("not json").is_err());
}

#[test]
fn test_resolution_values_are_restricted() {
    let result = crate::build_cli().try_get_matches_from([
        "fieldsync", "resolve", "trial", "t1", "newest",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("12345678", 8), "12345678");
    assert_eq!(truncate("123456789", 8), "12345678...");
}

#[test]
fn test_indent() {
    assert_eq!(indent("a\nb", 2), "  a\n  b");
}
