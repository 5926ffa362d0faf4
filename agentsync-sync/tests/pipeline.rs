//! End-to-end runs against an in-memory registry and a temporary tree.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use agentsync_core::{
    Artifact, ArtifactError, ArtifactId, ArtifactKind, ArtifactName, ArtifactStore,
    DeploymentState, Origin, ToolBundle, TOOL_MANIFEST,
};
use agentsync_remote::memory::Operation;
use agentsync_remote::{MemoryRegistry, RegistryClient};
use agentsync_sync::ledger;
use agentsync_sync::{
    plan, run, Change, Counts, Direction, KindScope, Outcome, PromotionStatus, SyncError,
    SyncRequest,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn write_tool(root: &Path, name: &str, body: &str) {
    let dir = root.join("tools").join(name);
    fs::create_dir_all(&dir).expect("create fixture dir");
    fs::write(dir.join(format!("{name}.py")), body).expect("write fixture");
    fs::write(dir.join(TOOL_MANIFEST), "requests\n").expect("write fixture");
}

fn write_agent(root: &Path, name: &str, tools: &[&str]) {
    let dir = root.join("agents").join(name).join("agents").join("native");
    fs::create_dir_all(&dir).expect("create fixture dir");
    let doc = format!("name: {name}\ntools: [{}]\n", tools.join(", "));
    fs::write(dir.join(format!("{name}.yaml")), doc).expect("write fixture");
}

fn remote_tool(name: &str, body: &str) -> Artifact {
    let mut bundle = ToolBundle::default();
    bundle.insert(format!("{name}.py"), body);
    bundle.insert(TOOL_MANIFEST, "requests\n");
    Artifact::tool(name, bundle, Origin::Remote(name.to_string())).expect("valid tool")
}

fn project() -> (TempDir, ArtifactStore) {
    let tmp = TempDir::new().expect("temp dir");
    fs::create_dir_all(tmp.path().join("agents")).expect("create fixture dir");
    fs::create_dir_all(tmp.path().join("tools")).expect("create fixture dir");
    let store = ArtifactStore::new(tmp.path());
    (tmp, store)
}

fn registry() -> (Arc<MemoryRegistry>, Arc<dyn RegistryClient>) {
    let registry = Arc::new(MemoryRegistry::new());
    let client: Arc<dyn RegistryClient> = registry.clone();
    (registry, client)
}

fn request(direction: Direction, scope: KindScope) -> SyncRequest {
    SyncRequest {
        concurrency: 2,
        ..SyncRequest::new(direction, scope)
    }
}

fn local_fingerprint(store: &ArtifactStore, kind: ArtifactKind, name: &str) -> String {
    store
        .load(kind, &ArtifactName::from(name))
        .expect("load local artifact")
        .fingerprint
        .0
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_of_new_tool_adds_it_remotely() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "hello_world", "print('hello')\n");
    let (registry, client) = registry();

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::Tools),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");

    assert_eq!(
        report.counts(),
        Counts {
            added: 1,
            ..Counts::default()
        }
    );
    assert!(report.is_success());
    let stored = registry
        .get(&ArtifactId::tool("hello_world"))
        .expect("artifact in registry");
    assert_eq!(
        stored.fingerprint.0,
        local_fingerprint(&store, ArtifactKind::Tool, "hello_world")
    );
}

#[tokio::test]
async fn modified_tool_follows_the_direction() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "x", "VERSION = 1\n");
    let (registry, client) = registry();
    registry.insert(remote_tool("x", "VERSION = 2\n"));
    let h2 = registry
        .get(&ArtifactId::tool("x"))
        .expect("artifact in registry")
        .fingerprint;

    let planned = plan(&store, &client, Direction::Export, KindScope::Tools)
        .await
        .expect("plan");
    assert_eq!(
        planned.phases[0].diff.change_of(&ArtifactId::tool("x")),
        Some(Change::Modified)
    );

    let import = run(
        &store,
        client.clone(),
        &request(Direction::Import, KindScope::Tools),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");
    assert_eq!(import.counts().modified, 1);
    assert_eq!(local_fingerprint(&store, ArtifactKind::Tool, "x"), h2.0);
    assert_eq!(
        fs::read_to_string(tmp.path().join("tools/x/x.py")).expect("read synced file"),
        "VERSION = 2\n"
    );

    write_tool(tmp.path(), "x", "VERSION = 1\n");
    let h1 = local_fingerprint(&store, ArtifactKind::Tool, "x");
    let export = run(
        &store,
        client,
        &request(Direction::Export, KindScope::Tools),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");
    assert_eq!(export.counts().modified, 1);
    let stored = registry
        .get(&ArtifactId::tool("x"))
        .expect("artifact in registry");
    assert_eq!(stored.fingerprint.0, h1);
}

#[tokio::test]
async fn second_export_is_all_unchanged() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "search", "def search(): ...\n");
    write_agent(tmp.path(), "helper", &["search"]);
    let (registry, client) = registry();
    let req = request(Direction::Export, KindScope::All);

    run(&store, client.clone(), &req, CancellationToken::new())
        .await
        .expect("sync run");
    let upserts = registry.calls().len();
    let second = run(&store, client, &req, CancellationToken::new())
        .await
        .expect("sync run");

    assert_eq!(second.counts().unchanged, 2);
    assert!(second.applied().is_empty());
    let new_upserts = registry
        .calls()
        .into_iter()
        .skip(upserts)
        .filter(|call| call.operation == Operation::Upsert)
        .count();
    assert_eq!(new_upserts, 0);
}

#[tokio::test]
async fn remote_only_artifacts_are_never_deleted() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "kept", "1\n");
    let (registry, client) = registry();
    registry.insert(remote_tool("legacy", "old\n"));

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::Tools),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");

    assert_eq!(
        report.outcome_of(&ArtifactId::tool("legacy")),
        Some(&Outcome::RemovedWarned)
    );
    assert!(registry.get(&ArtifactId::tool("legacy")).is_some());
    assert!(report.is_success());
}

// ---------------------------------------------------------------------------
// Partial failure and dependencies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_tool_fails_alone_and_blocks_its_agent() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "one", "1\n");
    write_tool(tmp.path(), "three", "3\n");
    // `two` has no entry point.
    let two = tmp.path().join("tools/two");
    fs::create_dir_all(&two).expect("create fixture dir");
    fs::write(two.join(TOOL_MANIFEST), "requests\n").expect("write fixture");
    write_agent(tmp.path(), "uses_two", &["two"]);
    write_agent(tmp.path(), "uses_one", &["one"]);
    let (registry, client) = registry();

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::All),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");

    assert!(matches!(
        report.outcome_of(&ArtifactId::tool("two")),
        Some(Outcome::Failed {
            error: ArtifactError::Validation(_)
        })
    ));
    assert!(matches!(
        report.outcome_of(&ArtifactId::tool("one")),
        Some(Outcome::Applied { .. })
    ));
    assert!(matches!(
        report.outcome_of(&ArtifactId::tool("three")),
        Some(Outcome::Applied { .. })
    ));
    assert_eq!(
        report.outcome_of(&ArtifactId::agent("uses_two")),
        Some(&Outcome::SkippedDependencyFailed {
            dependency: ArtifactId::tool("two")
        })
    );
    assert!(matches!(
        report.outcome_of(&ArtifactId::agent("uses_one")),
        Some(Outcome::Applied { .. })
    ));
    assert_eq!(
        registry.call_count(Operation::Upsert, &ArtifactId::agent("uses_two")),
        0
    );
    assert!(!report.is_success());
}

#[tokio::test]
async fn failed_tool_upsert_skips_dependent_agent() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "t1", "x\n");
    write_agent(tmp.path(), "a1", &["t1"]);
    let (registry, client) = registry();
    registry.fail_on(
        Operation::Upsert,
        ArtifactId::tool("t1"),
        ArtifactError::Validation("import rejected".into()),
    );

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::All),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");

    assert_eq!(report.counts().failed, 1);
    assert_eq!(report.counts().skipped_dependency, 1);
    assert_eq!(registry.call_count(Operation::Upsert, &ArtifactId::agent("a1")), 0);
}

#[tokio::test]
async fn managed_and_existing_tools_resolve_for_agents_only_runs() {
    let (tmp, store) = project();
    write_agent(tmp.path(), "mcp_user", &["jira_search"]);
    write_agent(tmp.path(), "remote_user", &["weather"]);
    write_agent(tmp.path(), "ghost_user", &["ghost"]);
    let (registry, client) = registry();
    registry.insert_managed(ArtifactId::tool("jira_search"));
    registry.insert(remote_tool("weather", "def weather(): ...\n"));

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::Agents),
        CancellationToken::new(),
    )
    .await
    .expect("sync run");

    assert!(matches!(
        report.outcome_of(&ArtifactId::agent("mcp_user")),
        Some(Outcome::Applied { .. })
    ));
    assert!(matches!(
        report.outcome_of(&ArtifactId::agent("remote_user")),
        Some(Outcome::Applied { .. })
    ));
    assert_eq!(
        report.outcome_of(&ArtifactId::agent("ghost_user")),
        Some(&Outcome::Failed {
            error: ArtifactError::DependencyUnresolved(ArtifactId::tool("ghost"))
        })
    );
    assert!(registry.get(&ArtifactId::agent("ghost_user")).is_none());
}

// ---------------------------------------------------------------------------
// Fatal enumeration errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_without_tools_folder_fails_before_any_write() {
    let tmp = TempDir::new().expect("temp dir");
    fs::create_dir_all(tmp.path().join("agents")).expect("create fixture dir");
    let store = ArtifactStore::new(tmp.path());
    let (registry, client) = registry();

    let err = run(
        &store,
        client,
        &request(Direction::Export, KindScope::All),
        CancellationToken::new(),
    )
    .await
    .expect_err("run should fail");

    assert!(matches!(
        err,
        SyncError::LocalEnumerate {
            kind: ArtifactKind::Tool,
            ..
        }
    ));
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn unreachable_remote_fails_import_before_any_write() {
    let (tmp, store) = project();
    let (registry, client) = registry();
    registry.insert(remote_tool("x", "1\n"));
    registry.fail_catalog("connection refused");

    let err = run(
        &store,
        client,
        &request(Direction::Import, KindScope::Tools),
        CancellationToken::new(),
    )
    .await
    .expect_err("run should fail");

    assert!(matches!(err, SyncError::RemoteEnumerate { .. }));
    assert!(!tmp.path().join("tools/x").exists());
    assert!(!ledger::ledger_path_at(tmp.path(), ledger::DEFAULT_ENV).exists());
}

// ---------------------------------------------------------------------------
// Promotion, cancellation, ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_promotes_only_applied_artifacts() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "t1", "x\n");
    write_agent(tmp.path(), "a1", &["t1"]);
    write_agent(tmp.path(), "a2", &["missing"]);
    let (registry, client) = registry();
    let req = SyncRequest {
        deploy: true,
        ..request(Direction::Export, KindScope::All)
    };

    let report = run(&store, client.clone(), &req, CancellationToken::new())
        .await
        .expect("sync run");

    let promotion = report.promotion.as_ref().expect("promotion report");
    assert_eq!(
        promotion.status_of(&ArtifactId::agent("a1")),
        Some(&PromotionStatus::Promoted)
    );
    assert_eq!(promotion.status_of(&ArtifactId::agent("a2")), None);
    assert_eq!(
        registry.state(&ArtifactId::agent("a1")),
        Some(DeploymentState::Live)
    );
    assert_eq!(
        registry.call_count(Operation::Promote, &ArtifactId::agent("a2")),
        0
    );

    let second = run(&store, client, &req, CancellationToken::new())
        .await
        .expect("sync run");
    assert!(second.promotion.expect("promotion report").outcomes.is_empty());
}

#[tokio::test]
async fn import_never_promotes() {
    let (_tmp, store) = project();
    let (registry, client) = registry();
    registry.insert(remote_tool("x", "1\n"));
    let req = SyncRequest {
        deploy: true,
        ..request(Direction::Import, KindScope::Tools)
    };

    let report = run(&store, client, &req, CancellationToken::new())
        .await
        .expect("sync run");

    assert!(report.promotion.is_none());
    assert!(registry
        .calls()
        .iter()
        .all(|call| call.operation != Operation::Promote));
}

#[tokio::test]
async fn cancelled_run_writes_nothing_and_keeps_the_ledger() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "a", "1\n");
    let (registry, client) = registry();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run(
        &store,
        client,
        &request(Direction::Export, KindScope::Tools),
        cancel,
    )
    .await
    .expect("sync run");

    assert!(report.was_cancelled());
    assert!(!report.is_success());
    assert!(registry.is_empty());
    assert!(!ledger::ledger_path_at(tmp.path(), ledger::DEFAULT_ENV).exists());
}

#[tokio::test]
async fn ledger_is_recorded_per_environment() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "hello_world", "print('hello')\n");
    let (_registry, client) = registry();
    let req = SyncRequest {
        env: Some("wxo_dev".to_string()),
        ..request(Direction::Export, KindScope::Tools)
    };

    run(&store, client, &req, CancellationToken::new())
        .await
        .expect("sync run");

    let recorded = ledger::load_at(tmp.path(), "wxo_dev").expect("load ledger");
    let entry = recorded.get(&ArtifactId::tool("hello_world")).expect("ledger entry");
    assert_eq!(
        entry.fingerprint.0,
        local_fingerprint(&store, ArtifactKind::Tool, "hello_world")
    );
    assert_eq!(entry.state, DeploymentState::Draft);
    assert!(ledger::load_at(tmp.path(), ledger::DEFAULT_ENV)
        .expect("load ledger")
        .is_empty());
}

#[tokio::test]
async fn plan_previews_changes_without_writing() {
    let (tmp, store) = project();
    write_tool(tmp.path(), "x", "VERSION = 1\n");
    let (registry, client) = registry();
    registry.insert(remote_tool("x", "VERSION = 2\n"));

    let planned = plan(&store, &client, Direction::Import, KindScope::Tools)
        .await
        .expect("plan");
    let previews = planned.previews();

    assert_eq!(previews.len(), 1);
    assert!(previews[0].unified_diff.contains("--- local/tools/x"));
    assert!(previews[0].unified_diff.contains("+VERSION = 2"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("tools/x/x.py")).expect("read synced file"),
        "VERSION = 1\n"
    );
}
