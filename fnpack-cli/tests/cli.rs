use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, create_dir_all, write, File};
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// Project with two functions and a config using a local directory store.
fn create_project() -> TempDir {
    let dir = tempdir().expect("Creating temp project failed");
    let root = dir.path();
    create_dir_all(root.join("src")).unwrap();
    write(root.join("src/hello.js"), "exports.hello = () => 'hi';").unwrap();
    write(root.join("src/bye.js"), "exports.bye = () => 'bye';").unwrap();
    write(
        root.join("fnpack.yml"),
        r#"service: greeter
bucket: deployments
artifact_directory: greeter/dev
functions:
  hello:
    package:
      individually: true
      exclude: ["src/bye.js"]
  bye: {}
store:
  type: local
  root: ./remote
"#,
    )
    .expect("Writing temp config failed");
    dir
}

fn zip_entries(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[test]
fn package_builds_artifacts_into_staging_dir() {
    let project = create_project();
    let mut cmd = Command::cargo_bin("fnpack").expect("Binary exists");

    cmd.arg("package")
        .arg("--config")
        .arg(project.path().join("fnpack.yml"))
        .env_remove("FNPACK_STORE_TOKEN");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Packaged").and(predicate::str::contains("hello.zip")));

    let staging = project.path().join(".fnpack");
    assert_eq!(zip_entries(&staging.join("hello.zip")), vec!["src/hello.js"]);
    assert_eq!(
        zip_entries(&staging.join("greeter.zip")),
        vec!["src/bye.js", "src/hello.js"]
    );
    assert!(!project.path().join("remote").exists());
}

#[test]
fn deploy_uploads_to_local_store() {
    let project = create_project();
    let mut cmd = Command::cargo_bin("fnpack").expect("Binary exists");

    cmd.arg("deploy")
        .arg("--config")
        .arg(project.path().join("fnpack.yml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Deploy").and(predicate::str::contains("complete")));

    let remote = project.path().join("remote/deployments/greeter/dev");
    assert!(remote.join("hello.zip").is_file());
    assert!(remote.join("greeter.zip").is_file());
}

#[test]
fn upload_before_package_fails_with_missing_artifact() {
    let project = create_project();
    let mut cmd = Command::cargo_bin("fnpack").expect("Binary exists");

    cmd.arg("upload")
        .arg("--config")
        .arg(project.path().join("fnpack.yml"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    assert!(!project.path().join("remote").exists());
}

#[test]
fn package_then_upload_ships_descriptors_first() {
    let project = create_project();
    let config = project.path().join("fnpack.yml");

    Command::cargo_bin("fnpack")
        .unwrap()
        .args(["package", "--config"])
        .arg(&config)
        .assert()
        .success();
    fs::write(
        project.path().join(".fnpack/template.json"),
        r#"{"Resources":{}}"#,
    )
    .unwrap();
    Command::cargo_bin("fnpack")
        .unwrap()
        .args(["upload", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded 1 descriptor(s)"));

    let remote = project.path().join("remote/deployments/greeter/dev");
    assert!(remote.join("template.json").is_file());
}

#[test]
fn missing_config_file_fails() {
    let mut cmd = Command::cargo_bin("fnpack").expect("Binary exists");
    cmd.args(["deploy", "--config", "does-not-exist.yml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Collects emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use fnpack_cli::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Package {
            config: std::path::PathBuf::from("dummy.yaml"),
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
