//! Change orchestration against in-memory collaborators

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use dlsync::config::{Config, DependencyOverride};
use dlsync::error::{DlSyncError, ErrorKind};
use dlsync::model::{ChangeType, Script, ScriptObjectType, Status};
use dlsync::parser::ParameterInjector;
use dlsync::ChangeManager;

use crate::common::{migration, schema_script, view, MemoryRepo, MemorySource};

fn manager(
    config: Config,
    scripts: Vec<Script>,
    repo: MemoryRepo,
) -> ChangeManager<MemorySource, MemoryRepo> {
    ChangeManager::new(config, MemorySource::new(scripts), repo, ParameterInjector::default())
}

fn injector(pairs: &[(&str, &str)]) -> ParameterInjector {
    ParameterInjector::new(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn table_view_function() -> Vec<Script> {
    vec![
        schema_script(ScriptObjectType::Tables, "MY_TABLE", "CREATE TABLE MY_TABLE(id INT);"),
        view("MY_VIEW", "CREATE VIEW MY_VIEW AS SELECT * FROM MY_TABLE;"),
        schema_script(
            ScriptObjectType::Functions,
            "MY_FUNC",
            "CREATE FUNCTION MY_FUNC() RETURNS INT LANGUAGE SQL AS 'SELECT COUNT(*) FROM MY_VIEW';",
        ),
    ]
}

fn numbered_views(count: usize) -> Vec<Script> {
    (1..=count)
        .map(|i| view(&format!("VIEW_{}", i), &format!("CREATE VIEW VIEW_{} AS SELECT {};", i, i)))
        .collect()
}

#[test]
fn test_deploy_follows_dependency_order() {
    let mut scripts = table_view_function();
    scripts.reverse();
    let mut manager = manager(Config::default(), scripts, MemoryRepo::new());

    let count = manager.deploy(false).unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        manager.repo().executed_ids(),
        vec![
            "TEST_DB.TEST_SCHEMA.MY_TABLE",
            "TEST_DB.TEST_SCHEMA.MY_VIEW",
            "TEST_DB.TEST_SCHEMA.MY_FUNC"
        ]
    );
    assert!(manager.repo().executed.iter().all(|(_, _, only_hashes)| !only_hashes));
}

#[test]
fn test_deploy_is_idempotent() {
    let mut manager = manager(Config::default(), table_view_function(), MemoryRepo::new());
    assert_eq!(manager.deploy(false).unwrap(), 3);
    assert_eq!(manager.deploy(false).unwrap(), 0);
    assert_eq!(manager.repo().executed.len(), 3);
}

#[test]
fn test_deploy_only_hashes() {
    let mut manager = manager(Config::default(), numbered_views(3), MemoryRepo::new());
    assert_eq!(manager.deploy(true).unwrap(), 3);
    assert!(manager.repo().executed.iter().all(|(_, _, only_hashes)| *only_hashes));
    assert_eq!(manager.repo().deployed.len(), 3);
}

#[test]
fn test_deploy_skips_excluded_scripts() {
    let config = Config {
        script_exclusion: vec!["test_db.test_schema.view_2".to_string()],
        ..Config::default()
    };
    let mut manager = manager(config, numbered_views(3), MemoryRepo::new());
    assert_eq!(manager.deploy(false).unwrap(), 2);
    assert!(!manager
        .repo()
        .executed_ids()
        .contains(&"TEST_DB.TEST_SCHEMA.VIEW_2".to_string()));
}

#[test]
fn test_deploy_injects_parameters_but_keeps_hash() {
    let source = view("REPORT", "select * from ${db}.TEST_SCHEMA.ORDERS");
    let hash = source.hash().to_string();
    let mut manager = ChangeManager::new(
        Config::default(),
        MemorySource::new(vec![source]),
        MemoryRepo::new(),
        injector(&[("db", "PROD_DB")]),
    );

    manager.deploy(false).unwrap();

    let (_, content, _) = &manager.repo().executed[0];
    assert_eq!(content, "select * from PROD_DB.TEST_SCHEMA.ORDERS");
    assert_eq!(manager.repo().deployed_by_id("TEST_DB.TEST_SCHEMA.REPORT").unwrap().hash(), hash);
}

#[test]
fn test_deploy_records_change_sync_events() {
    let mut manager = manager(Config::default(), numbered_views(2), MemoryRepo::new());
    manager.deploy(false).unwrap();

    let syncs = &manager.repo().syncs;
    assert_eq!(syncs.len(), 2);
    assert_eq!(syncs[0].change_type, ChangeType::Deploy);
    assert_eq!(syncs[0].status, Status::InProgress);
    assert_eq!(syncs[1].status, Status::Success);
    assert_eq!(syncs[1].change_count, Some(2));
}

#[test]
fn test_deploy_stops_at_first_failure() {
    let repo = MemoryRepo::new().failing("TEST_DB.TEST_SCHEMA.VIEW_2");
    let mut manager = manager(Config::default(), numbered_views(3), repo);

    let err = manager.deploy(false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(manager.repo().executed_ids(), vec!["TEST_DB.TEST_SCHEMA.VIEW_3"]);
    assert_eq!(manager.repo().last_sync().unwrap().status, Status::Error);
}

#[test]
fn test_deploy_continues_on_failure_and_aggregates() {
    let config = Config {
        continue_on_failure: true,
        ..Config::default()
    };
    let repo = MemoryRepo::new()
        .failing("TEST_DB.TEST_SCHEMA.VIEW_2")
        .failing("TEST_DB.TEST_SCHEMA.VIEW_4");
    let mut manager = manager(config, numbered_views(4), repo);

    let err = manager.deploy(false).unwrap_err();

    match err {
        DlSyncError::DeployFailures { failed } => assert_eq!(
            failed,
            vec!["TEST_DB.TEST_SCHEMA.VIEW_4", "TEST_DB.TEST_SCHEMA.VIEW_2"]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(manager.repo().executed.len(), 2);
    assert_eq!(manager.repo().last_sync().unwrap().status, Status::Error);
}

#[test]
fn test_modified_migration_is_rejected_even_when_continuing() {
    let deployed = migration(ScriptObjectType::Tables, "ORDERS", 0, "create table ORDERS (id int)", None);
    let edited = migration(
        ScriptObjectType::Tables,
        "ORDERS",
        0,
        "create table ORDERS (id int, note varchar)",
        None,
    );
    let config = Config {
        continue_on_failure: true,
        ..Config::default()
    };
    let mut manager = manager(config, vec![edited], MemoryRepo::new().with_deployed(&[deployed]));

    let err = manager.deploy(false).unwrap_err();

    assert!(matches!(err, DlSyncError::ModifiedMigration { ref id } if id == "TEST_DB.TEST_SCHEMA.ORDERS:0"));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(manager.repo().executed.is_empty());
}

#[test]
fn test_new_migration_version_is_deployed_after_previous() {
    let v0 = migration(ScriptObjectType::Tables, "ORDERS", 0, "create table ORDERS (id int)", None);
    let v1 = migration(ScriptObjectType::Tables, "ORDERS", 1, "alter table ORDERS add note varchar", None);
    let reader = view("ORDER_VIEW", "select * from ORDERS");
    let mut manager = manager(
        Config::default(),
        vec![reader, v1, v0.clone()],
        MemoryRepo::new().with_deployed(&[v0]),
    );

    assert_eq!(manager.deploy(false).unwrap(), 2);
    assert_eq!(
        manager.repo().executed_ids(),
        vec!["TEST_DB.TEST_SCHEMA.ORDERS:1", "TEST_DB.TEST_SCHEMA.ORDER_VIEW"]
    );
}

#[test]
fn test_cycle_applies_nothing() {
    let scripts = vec![view("A", "select * from B"), view("B", "select * from A")];
    let mut manager = manager(Config::default(), scripts, MemoryRepo::new());

    let err = manager.deploy(false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CyclicDependency);
    assert!(manager.repo().executed.is_empty());
    assert_eq!(manager.repo().last_sync().unwrap().status, Status::Error);
}

#[test]
fn test_dependency_override_orders_unrelated_scripts() {
    let config = Config {
        dependency_override: vec![DependencyOverride {
            script: "TEST_DB.TEST_SCHEMA.A_REPORT".to_string(),
            dependencies: vec!["Z_LOADER".to_string()],
        }],
        ..Config::default()
    };
    let scripts = vec![view("A_REPORT", "select 1"), view("Z_LOADER", "select 2")];
    let mut manager = manager(config, scripts, MemoryRepo::new());
    manager.deploy(false).unwrap();
    assert_eq!(
        manager.repo().executed_ids(),
        vec!["TEST_DB.TEST_SCHEMA.Z_LOADER", "TEST_DB.TEST_SCHEMA.A_REPORT"]
    );
}

#[test]
fn test_rollback_reverses_deploy_order() {
    let table = migration(
        ScriptObjectType::Tables,
        "MY_TABLE",
        0,
        "CREATE TABLE TEST_DB.TEST_SCHEMA.MY_TABLE(id INT);",
        Some("DROP TABLE IF EXISTS MY_TABLE;"),
    );
    let stream = migration(
        ScriptObjectType::Streams,
        "MY_STREAM",
        0,
        "CREATE STREAM MY_STREAM ON TABLE TEST_DB.TEST_SCHEMA.MY_TABLE;",
        Some("DROP STREAM IF EXISTS MY_STREAM;"),
    );
    let mut manager = manager(
        Config::default(),
        vec![table.clone(), stream.clone()],
        MemoryRepo::new(),
    );
    manager.deploy(false).unwrap();
    let deploy_order = manager.repo().executed_ids();

    // Both objects were removed from the source
    let repo = MemoryRepo::new().with_deployed(&[table, stream]);
    let mut manager = self::manager(Config::default(), Vec::new(), repo);
    assert_eq!(manager.rollback().unwrap(), 2);

    let rolled_back: Vec<String> = manager
        .repo()
        .rolled_back
        .iter()
        .map(|(id, _)| id.clone())
        .collect();
    let mut expected = deploy_order;
    expected.reverse();
    assert_eq!(rolled_back, expected);
    assert_eq!(
        manager.repo().rolled_back[0].1.as_deref(),
        Some("DROP STREAM IF EXISTS MY_STREAM;")
    );
    assert!(manager.repo().deployed.is_empty());
}

#[test]
fn test_rollback_only_touches_removed_versions() {
    let v0 = migration(ScriptObjectType::Tables, "ORDERS", 0, "create table ORDERS (id int)", None);
    let v1 = migration(
        ScriptObjectType::Tables,
        "ORDERS",
        1,
        "alter table ORDERS add note varchar",
        Some("alter table ${db}.TEST_SCHEMA.ORDERS drop column note"),
    );
    let kept_view = view("ORDER_VIEW", "select * from ORDERS");
    let repo = MemoryRepo::new().with_deployed(&[v0.clone(), v1, kept_view.clone()]);
    let mut manager = ChangeManager::new(
        Config::default(),
        MemorySource::new(vec![v0, kept_view]),
        repo,
        injector(&[("db", "PROD_DB")]),
    );

    assert_eq!(manager.rollback().unwrap(), 1);
    assert_eq!(
        manager.repo().rolled_back,
        vec![(
            "TEST_DB.TEST_SCHEMA.ORDERS:1".to_string(),
            Some("alter table PROD_DB.TEST_SCHEMA.ORDERS drop column note".to_string())
        )]
    );
}

#[test]
fn test_rollback_with_nothing_deployed() {
    let mut manager = manager(Config::default(), numbered_views(2), MemoryRepo::new());
    assert_eq!(manager.rollback().unwrap(), 0);
    assert!(manager.repo().rolled_back.is_empty());
    assert!(manager.repo().executed.is_empty());
}

#[test]
fn test_verify_latest_migration_and_state_scripts() {
    let v0 = migration(ScriptObjectType::Tables, "ORDERS", 0, "create table ORDERS (id int)", None);
    let v1 = migration(ScriptObjectType::Tables, "ORDERS", 1, "alter table ORDERS add note varchar", None);
    let mut repo = MemoryRepo::new().with_deployed(&[v0.clone(), v1.clone()]);
    repo.db_scripts.insert(
        "TEST_SCHEMA".to_string(),
        vec![view("ORDER_VIEW", "select * from ORDERS")],
    );
    let mut manager = manager(Config::default(), vec![v0, v1], repo);

    assert_eq!(manager.verify().unwrap(), 2);
    assert_eq!(manager.repo().last_sync().unwrap().status, Status::Success);
}

#[test]
fn test_verify_counts_failures() {
    let v0 = migration(ScriptObjectType::Tables, "ORDERS", 0, "create table ORDERS (id int)", None);
    let undeployed = migration(ScriptObjectType::Tables, "ORDERS", 1, "alter table ORDERS add note varchar", None);
    let mut repo = MemoryRepo::new()
        .with_deployed(&[v0.clone()])
        .failing("TEST_DB.TEST_SCHEMA.BROKEN_VIEW");
    repo.db_scripts.insert(
        "TEST_SCHEMA".to_string(),
        vec![
            view("BROKEN_VIEW", "select 1"),
            view("GOOD_VIEW", "select 2"),
        ],
    );
    let mut manager = manager(Config::default(), vec![v0, undeployed], repo);

    let err = manager.verify().unwrap_err();

    assert!(matches!(err, DlSyncError::VerificationFailed { failed: 2 }));
    assert_eq!(err.to_string(), "2 scripts failed to verify.");
    assert_eq!(manager.repo().last_sync().unwrap().status, Status::Error);
}

#[test]
fn test_verify_skips_excluded_objects() {
    let mut repo = MemoryRepo::new().failing("TEST_DB.TEST_SCHEMA.LEGACY");
    repo.db_scripts
        .insert("TEST_SCHEMA".to_string(), vec![view("LEGACY", "select 1")]);
    let config = Config {
        script_exclusion: vec!["TEST_DB.TEST_SCHEMA.LEGACY".to_string()],
        ..Config::default()
    };
    let mut manager = manager(config, Vec::new(), repo);
    assert_eq!(manager.verify().unwrap(), 0);
}

#[test]
fn test_create_scripts_adds_config_data_and_parametrizes() {
    let table = Script::schema(
        None,
        "PROD_DB",
        "TEST_SCHEMA",
        "SETTINGS",
        ScriptObjectType::Tables,
        "---version: 0\ncreate table PROD_DB.TEST_SCHEMA.SETTINGS (k varchar)",
    );
    let report = Script::schema(
        None,
        "PROD_DB",
        "TEST_SCHEMA",
        "REPORT",
        ScriptObjectType::Views,
        "select * from PROD_DB.TEST_SCHEMA.SETTINGS",
    );
    let mut repo = MemoryRepo::new();
    repo.database = "PROD_DB".to_string();
    repo.db_scripts
        .insert("TEST_SCHEMA".to_string(), vec![table, report]);
    let config = Config {
        config_tables: vec!["${db}.test_schema.settings".to_string()],
        ..Config::default()
    };
    let mut manager = ChangeManager::new(
        config,
        MemorySource::default(),
        repo,
        injector(&[("db", "PROD_DB")]),
    );

    assert_eq!(manager.create_all_scripts_from_db(None).unwrap(), 2);

    assert_eq!(manager.repo().config_added, vec!["PROD_DB.TEST_SCHEMA.SETTINGS"]);
    let written = manager.source().written.borrow();
    assert_eq!(
        written[0].content(),
        "---version: 0\ncreate table ${db}.TEST_SCHEMA.SETTINGS (k varchar)\ninsert into ${db}.TEST_SCHEMA.SETTINGS values (1);"
    );
    assert_eq!(written[1].content(), "select * from ${db}.TEST_SCHEMA.SETTINGS");
}

#[test]
fn test_create_scripts_for_selected_schemas() {
    let mut repo = MemoryRepo::new();
    repo.db_scripts
        .insert("A".to_string(), vec![view("V1", "select 1")]);
    repo.db_scripts
        .insert("B".to_string(), vec![view("V2", "select 2"), view("V3", "select 3")]);
    let mut manager = manager(Config::default(), Vec::new(), repo);

    assert_eq!(
        manager
            .create_all_scripts_from_db(Some(vec!["B".to_string()]))
            .unwrap(),
        2
    );
    assert_eq!(
        manager.repo().last_sync().unwrap().change_type,
        ChangeType::CreateScript
    );
}

#[test]
fn test_create_lineage() {
    let mut manager = manager(Config::default(), table_view_function(), MemoryRepo::new());

    assert_eq!(manager.create_lineage().unwrap(), 2);

    let edges: Vec<(String, String)> = manager
        .repo()
        .lineage
        .iter()
        .map(|d| (d.object_name.clone(), d.dependency_name.clone()))
        .collect();
    assert_eq!(
        edges,
        vec![
            (
                "TEST_DB.TEST_SCHEMA.MY_FUNC".to_string(),
                "TEST_DB.TEST_SCHEMA.MY_VIEW".to_string()
            ),
            (
                "TEST_DB.TEST_SCHEMA.MY_VIEW".to_string(),
                "TEST_DB.TEST_SCHEMA.MY_TABLE".to_string()
            ),
        ]
    );
    assert!(manager.repo().executed.is_empty());
}

#[test]
fn test_rollback_distinguishes_types_sharing_an_id() {
    let table = migration(ScriptObjectType::Tables, "EVENTS", 0, "create table EVENTS (id int)", Some("drop table EVENTS"));
    let stream = migration(ScriptObjectType::Streams, "EVENTS", 0, "create stream EVENTS on table RAW", Some("drop stream EVENTS"));
    assert_eq!(table.id(), stream.id());

    let repo = MemoryRepo::new().with_deployed(&[table, stream.clone()]);
    let mut manager = manager(Config::default(), vec![stream], repo);

    assert_eq!(manager.rollback().unwrap(), 1);
    assert_eq!(
        manager.repo().rolled_back,
        vec![("TEST_DB.TEST_SCHEMA.EVENTS:0".to_string(), Some("drop table EVENTS".to_string()))]
    );
    assert_eq!(manager.repo().deployed.len(), 1);
}
