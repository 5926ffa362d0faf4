//! `OrchestrateCli` against a scripted stand-in for the real CLI.
#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use agentsync_core::config::Timeouts;
use agentsync_core::{
    Artifact, ArtifactError, ArtifactId, ArtifactKind, ArtifactName, Origin, ToolBundle,
    TOOL_MANIFEST,
};
use agentsync_remote::{CliSettings, OrchestrateCli, PromoteOutcome, RegistryClient, RemoteError};

const AGENTS_JSON: &str = r#"{"native": [
  {"name": "greeter", "llm_config": {"model_name": "granite-3", "max_tokens": null}},
  {"name": "scratchpad", "hidden": true}
]}"#;

const TOOLS_JSON: &str = r#"[
  {"name": "hello_world", "binding": {"python": {"function": "hello_world"}}},
  {"name": "web_search", "binding": {"mcp": {"server": "search"}}}
]"#;

const GREETER_YAML: &str = "spec_version: v1\nkind: native\nname: greeter\ntools:\n  - hello_world\n";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path();
        std::fs::write(root.join("agents.json"), AGENTS_JSON).expect("write fixture");
        std::fs::write(root.join("tools.json"), TOOLS_JSON).expect("write fixture");
        std::fs::write(root.join("greeter.yaml"), GREETER_YAML).expect("write fixture");
        write_zip(
            &root.join("hello_world.zip"),
            &[
                ("hello_world.py", "def hello_world():\n    return 'hi'\n"),
                (TOOL_MANIFEST, "ibm-watsonx-orchestrate\n"),
            ],
        );
        write_script(root);
        Self { dir }
    }

    fn cli(&self, timeouts: Timeouts, retries: u32) -> OrchestrateCli {
        OrchestrateCli::new(CliSettings {
            program: self.dir.path().join("orchestrate"),
            retries,
            timeouts,
            concurrency: 2,
        })
    }

    fn log(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    for (name, body) in files {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .expect("zip entry");
        zip.write_all(body.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

fn write_script(root: &Path) {
    let fixtures = root.display();
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> "{fixtures}/calls.log"
out=""
name=""
prev=""
for arg in "$@"; do
  case "$prev" in
    -o) out="$arg" ;;
    -n|--name) name="$arg" ;;
  esac
  prev="$arg"
done
case "$1 $2" in
  "env activate")
    if [ "$3" = "missing" ]; then echo "environment not found" >&2; exit 1; fi ;;
  "agents list") cat "{fixtures}/agents.json" ;;
  "tools list") cat "{fixtures}/tools.json" ;;
  "agents export") cp "{fixtures}/greeter.yaml" "$out" ;;
  "tools export")
    if [ "$name" = "slow" ]; then sleep 5; fi
    cp "{fixtures}/hello_world.zip" "$out" ;;
  "agents import") ;;
  "tools import") ;;
  "agents deploy")
    if [ "$name" = "broken" ]; then echo "agent has no LLM" >&2; exit 1; fi
    if [ "$name" = "steady" ]; then echo "Agent 'steady' is already deployed"; fi
    if [ "$name" = "pinned" ]; then echo "Agent 'pinned' is already live" >&2; exit 1; fi ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#
    );
    let path = root.join("orchestrate");
    std::fs::write(&path, script).expect("write fixture");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
}

fn hello_world() -> Artifact {
    let mut bundle = ToolBundle::default();
    bundle.insert("hello_world.py", "def hello_world():\n    return 'hi'\n");
    bundle.insert(TOOL_MANIFEST, "ibm-watsonx-orchestrate\n");
    Artifact::tool("hello_world", bundle, Origin::Local(PathBuf::from("tools/hello_world")))
        .expect("valid tool")
}

#[tokio::test]
async fn lists_agents_skipping_hidden_and_enriching_llm_config() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    let listing = cli.list(ArtifactKind::Agent).await.expect("listing");
    assert!(listing.invalid.is_empty());
    assert_eq!(listing.artifacts.len(), 1);

    let greeter = listing
        .artifacts
        .get(&ArtifactName::from("greeter"))
        .expect("listed artifact");
    assert!(greeter.dependencies.contains(&ArtifactId::tool("hello_world")));
    let text = greeter.render_text();
    assert!(text.contains("granite-3"));
    assert!(!text.contains("max_tokens"));
    assert!(!fixture.log().iter().any(|line| line.contains("scratchpad")));
}

#[tokio::test]
async fn lists_tools_from_exported_archives_and_skips_mcp() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    let catalog = cli.catalog(ArtifactKind::Tool).await.expect("catalog");
    assert_eq!(catalog.len(), 2);
    assert!(!catalog[1].exportable);

    let listing = cli.list(ArtifactKind::Tool).await.expect("listing");
    let tool = listing
        .artifacts
        .get(&ArtifactName::from("hello_world"))
        .expect("listed artifact");
    assert_eq!(tool.fingerprint, hello_world().fingerprint);
    assert!(!fixture.log().iter().any(|line| line.contains("web_search")));
}

#[tokio::test]
async fn tool_upsert_passes_entry_point_folder_and_manifest() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    cli.upsert(&hello_world()).await.expect("upsert");

    let log = fixture.log();
    let line = log
        .iter()
        .find(|l| l.starts_with("tools import"))
        .expect("log line");
    assert!(line.contains("-k python"));
    assert!(line.contains("hello_world/hello_world.py"));
    assert!(line.contains(" -p "));
    assert!(line.contains("hello_world/requirements.txt"));
}

#[tokio::test]
async fn failed_deploy_is_a_promotion_error_with_stderr() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    let ok = cli.promote(&ArtifactId::agent("greeter")).await.expect("promote");
    assert_eq!(ok, PromoteOutcome::Promoted);

    let err = cli
        .promote(&ArtifactId::agent("broken"))
        .await
        .expect_err("promote should fail");
    match err {
        ArtifactError::Promotion(detail) => assert!(detail.contains("agent has no LLM")),
        other => panic!("expected promotion error, got {other:?}"),
    }
}

#[tokio::test]
async fn deploy_of_live_agent_is_already_live() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    let steady = cli
        .promote(&ArtifactId::agent("steady"))
        .await
        .expect("promote steady");
    assert_eq!(steady, PromoteOutcome::AlreadyLive);

    let pinned = cli
        .promote(&ArtifactId::agent("pinned"))
        .await
        .expect("promote pinned");
    assert_eq!(pinned, PromoteOutcome::AlreadyLive);
    assert!(fixture
        .log()
        .iter()
        .any(|line| line == "agents deploy --name steady"));
}

#[tokio::test]
async fn activation_failure_names_the_environment() {
    let fixture = Fixture::new();
    let cli = fixture.cli(Timeouts::default(), 3);

    cli.activate("wxo_test", Some("s3cret")).await.expect("activate");
    assert!(fixture
        .log()
        .iter()
        .any(|line| line == "env activate wxo_test --api-key s3cret"));

    let err = cli.activate("missing", None).await.expect_err("activation should fail");
    assert!(matches!(err, RemoteError::Activation { ref env, .. } if env == "missing"));
}

#[tokio::test]
async fn export_timeouts_are_retried_then_reported_as_transport() {
    let fixture = Fixture::new();
    let timeouts = Timeouts {
        export_secs: 1,
        retry_backoff_secs: 0,
        ..Timeouts::default()
    };
    let cli = fixture.cli(timeouts, 2);

    let err = cli
        .fetch(ArtifactKind::Tool, &ArtifactName::from("slow"))
        .await
        .expect_err("fetch should fail");
    assert!(matches!(err, ArtifactError::Transport(ref msg) if msg.contains("timed out")));

    let attempts = fixture
        .log()
        .iter()
        .filter(|line| line.starts_with("tools export -n slow"))
        .count();
    assert_eq!(attempts, 2);
}
