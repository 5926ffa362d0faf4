//! The `agentsync` binary against a scripted `orchestrate` stand-in.
#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

const AGENTS_JSON: &str = r#"{"native": [
  {"name": "greeter", "llm_config": {"model_name": "granite-3"}}
]}"#;

const TOOLS_JSON: &str = r#"[
  {"name": "hello_world", "binding": {"python": {"function": "hello_world"}}},
  {"name": "web_search", "binding": {"mcp": {"server": "search"}}}
]"#;

const GREETER_YAML: &str =
    "spec_version: v1\nkind: native\nname: greeter\ntools:\n  - hello_world\n  - web_search\n";

const HELLO_WORLD_PY: &str = "def hello_world():\n    return 'hi'\n";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A project root with `agentsync.yaml` pointing at a fake `orchestrate`.
struct Project {
    root: assert_fs::TempDir,
    home: assert_fs::TempDir,
    remote: assert_fs::TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            root: assert_fs::TempDir::new().expect("root"),
            home: assert_fs::TempDir::new().expect("home"),
            remote: assert_fs::TempDir::new().expect("remote"),
        };
        let remote = project.remote.path();
        fs::write(remote.join("agents.json"), AGENTS_JSON).expect("agents.json");
        fs::write(remote.join("tools.json"), TOOLS_JSON).expect("tools.json");
        fs::write(remote.join("greeter.yaml"), GREETER_YAML).expect("greeter.yaml");
        write_zip(
            &remote.join("hello_world.zip"),
            &[
                ("hello_world.py", HELLO_WORLD_PY),
                ("requirements.txt", "ibm-watsonx-orchestrate\n"),
            ],
        );
        write_script(remote);
        project
            .root
            .child("agentsync.yaml")
            .write_str(&format!(
                "orchestrate_bin: {}\nconcurrency: 2\ntimeouts:\n  retry_backoff_secs: 0\n",
                remote.join("orchestrate").display()
            ))
            .expect("config");
        project
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agentsync"));
        cmd.env("HOME", self.home.path())
            .env("USERPROFILE", self.home.path())
            .env_remove("WXO_API_KEY")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .arg("--root")
            .arg(self.root.path());
        cmd
    }

    fn calls(&self) -> String {
        fs::read_to_string(self.remote.path().join("calls.log")).unwrap_or_default()
    }

    fn seed_tool(&self, name: &str, body: &str) {
        self.root
            .child(format!("tools/{name}/{name}.py"))
            .write_str(body)
            .expect("tool");
        self.root
            .child(format!("tools/{name}/requirements.txt"))
            .write_str("ibm-watsonx-orchestrate\n")
            .expect("manifest");
    }

    fn seed_agent(&self, name: &str, tools: &[&str]) {
        self.root
            .child(format!("agents/{name}/agents/native/{name}.yaml"))
            .write_str(&format!("name: {name}\ntools: [{}]\n", tools.join(", ")))
            .expect("agent");
    }
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let file = fs::File::create(path).expect("zip");
    let mut zip = zip::ZipWriter::new(file);
    for (name, body) in files {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .expect("entry");
        zip.write_all(body.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

fn write_script(remote: &Path) {
    let fixtures = remote.display();
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
  "tools export") cp "{fixtures}/hello_world.zip" "$out" ;;
  "agents import") ;;
  "tools import") ;;
  "agents deploy") ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#
    );
    let path = remote.join("orchestrate");
    fs::write(&path, script).expect("script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn status_before_any_sync_is_never_synced() {
    let project = Project::new();
    project.seed_tool("hello_world", HELLO_WORLD_PY);

    project
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("NEVER SYNCED"));
    assert!(project.calls().is_empty(), "status must not call the remote");
}

#[test]
fn import_writes_the_tree_and_records_the_ledger() {
    let project = Project::new();

    project
        .cmd()
        .args(["import", "--kind", "all"])
        .assert()
        .success()
        .stdout(contains("2 added"));

    project
        .root
        .child("tools/hello_world/hello_world.py")
        .assert(HELLO_WORLD_PY);
    project
        .root
        .child("agents/greeter/agents/native/greeter.yaml")
        .assert(predicates::str::contains("granite-3"));
    assert!(!project.root.child("tools/web_search").path().exists());

    let output = project
        .cmd()
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("status json");
    assert_eq!(json["overall"], "current");
}

#[test]
fn export_after_import_changes_nothing() {
    let project = Project::new();
    project
        .cmd()
        .args(["import", "--kind", "all"])
        .assert()
        .success();

    project
        .cmd()
        .args(["export", "--kind", "all"])
        .assert()
        .success()
        .stdout(contains("0 added, 0 modified, 2 unchanged, 0 failed"));
    assert!(!project.calls().contains(" import "));
}

#[test]
fn export_pushes_new_tool_and_keeps_remote_only_ones() {
    let project = Project::new();
    project.seed_tool("new_tool", "def new_tool():\n    return 1\n");
    project.root.child("agents").create_dir_all().expect("agents");

    project
        .cmd()
        .args(["export", "--kind", "tools"])
        .assert()
        .success()
        .stdout(contains("1 added"))
        .stdout(contains("removed (kept)"));

    let calls = project.calls();
    assert!(calls.contains("tools import -k python -f"));
    assert!(calls.contains("new_tool.py"));
}

#[test]
fn unresolved_tool_fails_the_export() {
    let project = Project::new();
    project.root.child("tools").create_dir_all().expect("tools");
    project.seed_agent("lost", &["ghost"]);
    project.seed_agent("mcp_user", &["web_search"]);

    let output = project
        .cmd()
        .args(["export", "--kind", "agents", "--json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("report json");
    assert_eq!(json["success"], false);
    assert_eq!(json["counts"]["failed"], 1);
    assert_eq!(json["counts"]["added"], 1);
    let lost = json["outcomes"]
        .as_array()
        .expect("outcomes")
        .iter()
        .find(|o| o["id"] == "agent/lost")
        .expect("lost outcome");
    assert_eq!(lost["error"]["category"], "dependency_unresolved");
}

#[test]
fn export_without_tools_folder_is_fatal() {
    let project = Project::new();
    project.seed_agent("greeter", &[]);

    project
        .cmd()
        .args(["export", "--kind", "all"])
        .assert()
        .failure()
        .stderr(contains("cannot enumerate local tools"));
    assert!(!project.calls().contains("import"));
}

#[test]
fn failed_activation_stops_before_any_listing() {
    let project = Project::new();

    project
        .cmd()
        .args(["import", "--env", "missing", "--api-key", "s3cret"])
        .assert()
        .failure()
        .stderr(contains("failed to activate environment 'missing'"))
        .stderr(contains("s3cret").not());
    assert!(!project.calls().contains("list"));
}

#[test]
fn deploy_promotes_exported_agents() {
    let project = Project::new();
    project.seed_tool("hello_world", HELLO_WORLD_PY);
    project.seed_agent("helper", &["hello_world"]);

    project
        .cmd()
        .args(["export", "--kind", "agents", "--deploy"])
        .assert()
        .success()
        .stdout(contains("Deploy: 1 promoted"));
    assert!(project.calls().contains("agents deploy --name helper"));
}

#[test]
fn diff_shows_local_edits_without_writing() {
    let project = Project::new();
    project
        .cmd()
        .args(["import", "--kind", "tools"])
        .assert()
        .success();
    project.seed_tool("hello_world", "def hello_world():\n    return 'hello'\n");

    project
        .cmd()
        .args(["diff", "--direction", "export", "--kind", "tools"])
        .assert()
        .success()
        .stdout(contains("+++ local/tools/hello_world"))
        .stdout(contains("+    return 'hello'"));
    assert!(!project.calls().contains("tools import"));
}
