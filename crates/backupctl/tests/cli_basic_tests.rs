use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INSTANCE: &str = "/v1/projects/test-project/instances/test-instance";

/// Helper to create a test command isolated from the caller's environment
fn backupctl() -> Command {
    let mut cmd = Command::cargo_bin("backupctl").unwrap();
    cmd.env_remove("BACKUPCTL_PROFILE")
        .env_remove("BACKUPCTL_CONFIG_FILE")
        .env_remove("BACKUPCTL_PROJECT")
        .env_remove("BACKUPCTL_ACCESS_TOKEN")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn with_config(config: &Path) -> Command {
    let mut cmd = backupctl();
    cmd.arg("--config-file").arg(config);
    cmd
}

fn write_config(dir: &TempDir, endpoint: &str, default_instance: Option<&str>) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let instance_line = default_instance
        .map(|i| format!("default_instance = \"{}\"\n", i))
        .unwrap_or_default();
    std::fs::write(
        &path,
        format!(
            "default_profile = \"test\"\n\n[profiles.test]\nproject = \"test-project\"\nendpoint = \"{}\"\n{}",
            endpoint, instance_line
        ),
    )
    .unwrap();
    path
}

// ============================================================================
// Help and version
// ============================================================================

#[test]
fn test_help_flag() {
    backupctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database backup management CLI"))
        .stdout(predicate::str::contains("EXAMPLES:"));
}

#[test]
fn test_help_short_flag() {
    backupctl()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    backupctl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("backupctl"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_command_json() {
    let dir = TempDir::new().unwrap();
    with_config(&dir.path().join("missing.toml"))
        .args(["version", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_args_shows_help() {
    backupctl()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    backupctl()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_backup_commands_listed_in_help() {
    backupctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-backup"))
        .stdout(predicate::str::contains("cancel-backup"))
        .stdout(predicate::str::contains("restore-database"))
        .stdout(predicate::str::contains("create-database-with-version-retention-period"));
}

#[test]
fn test_create_backup_help_shows_defaults() {
    backupctl()
        .args(["create-backup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--database-id"))
        .stdout(predicate::str::contains("example_db"))
        .stdout(predicate::str::contains("--kms-key-name"));
}

#[test]
fn test_copy_backup_requires_source() {
    backupctl()
        .args(["copy-backup", "my-instance", "--backup-id", "copy"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--source-backup"));
}

#[test]
fn test_invalid_version_time_rejected() {
    backupctl()
        .args(["create-backup", "my-instance", "--version-time", "yesterday"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("RFC 3339"));
}

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    with_config(&dir.path().join("missing.toml"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backupctl"));
}

// ============================================================================
// Profiles
// ============================================================================

#[test]
fn test_profile_set_list_show() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    with_config(&config)
        .args([
            "profile",
            "set",
            "prod",
            "--project",
            "my-project",
            "--default-instance",
            "my-instance",
            "--access-token",
            "secret-token",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile 'prod' saved successfully."))
        .stdout(predicate::str::contains("Set as default profile."));

    with_config(&config)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prod"))
        .stdout(predicate::str::contains("(default)"))
        .stdout(predicate::str::contains("my-project"));

    with_config(&config)
        .args(["profile", "show", "prod", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"access_token_configured\": true"))
        .stdout(predicate::str::contains("\"default_instance\": \"my-instance\""))
        .stdout(predicate::str::contains("secret-token").not());
}

#[test]
fn test_profile_set_keeps_existing_fields() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    with_config(&config)
        .args([
            "profile",
            "set",
            "prod",
            "--project",
            "p",
            "--default-instance",
            "i",
        ])
        .assert()
        .success();
    with_config(&config)
        .args(["profile", "set", "prod", "--project", "p2", "--poll-interval", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set as default profile.").not());

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("project = \"p2\""));
    assert!(saved.contains("default_instance = \"i\""));
    assert!(saved.contains("poll_interval_secs = 3"));
}

#[test]
fn test_profile_set_rejects_zero_poll_interval() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    with_config(&config)
        .args(["profile", "set", "prod", "--project", "p", "--poll-interval", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--poll-interval"));

    assert!(!config.exists());
}

#[test]
fn test_profile_default_and_remove() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    for name in ["one", "two"] {
        with_config(&config)
            .args(["profile", "set", name, "--project", "p"])
            .assert()
            .success();
    }

    with_config(&config)
        .args(["profile", "default", "two"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default profile set to 'two'."));

    with_config(&config)
        .args(["profile", "remove", "two", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default profile cleared."))
        .stdout(predicate::str::contains("Profile 'two' removed successfully."));

    with_config(&config)
        .args(["profile", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 1"));
}

#[test]
fn test_profile_remove_declined() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    with_config(&config)
        .args(["profile", "set", "prod", "--project", "p"])
        .assert()
        .success();

    with_config(&config)
        .args(["profile", "remove", "prod"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile removal cancelled."));

    assert!(std::fs::read_to_string(&config).unwrap().contains("[profiles.prod]"));
}

#[test]
fn test_profile_show_unknown() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    with_config(&config)
        .args(["profile", "set", "prod", "--project", "p"])
        .assert()
        .success();

    with_config(&config)
        .args(["profile", "show", "staging"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_profile_path_reports_explicit_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    with_config(&config)
        .args(["profile", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

// ============================================================================
// Connection resolution
// ============================================================================

#[test]
fn test_backup_command_without_profile() {
    let dir = TempDir::new().unwrap();
    with_config(&dir.path().join("missing.toml"))
        .args(["list-backups", "my-instance"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("profile set"));
}

#[test]
fn test_backup_command_without_instance() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:1", None);
    with_config(&config)
        .args(["list-backups"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no default instance"))
        .stderr(predicate::str::contains("--default-instance"));
}

#[test]
fn test_unreachable_endpoint_is_connection_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:1", Some("test-instance"));
    with_config(&config)
        .args(["update-backup", "--backup-id", "b1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

// ============================================================================
// End to end against a mock admin service
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_update_backup_extends_expire_time() {
    let server = MockServer::start().await;
    let backup = format!("{}/backups/b1", INSTANCE);

    Mock::given(method("GET"))
        .and(path(backup.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/instances/test-instance/backups/b1",
            "sizeBytes": "2048",
            "state": "READY",
            "expireTime": "2099-05-15T12:00:00Z",
            "maxExpireTime": "2099-12-31T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(backup.as_str()))
        .and(query_param("updateMask", "expireTime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/instances/test-instance/backups/b1",
            "state": "READY",
            "expireTime": "2099-06-14T12:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), Some("test-instance"));

    with_config(&config)
        .args(["update-backup", "--backup-id", "b1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("expire time was updated from"))
        .stdout(predicate::str::contains("2099-06-14T12:00:00"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_database_operations_json_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/databaseOperations", INSTANCE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operations": [{
                "name": "projects/test-project/instances/test-instance/databases/restored/operations/op1",
                "metadata": {
                    "@type": "type.googleapis.com/google.spanner.admin.database.v1.OptimizeRestoredDatabaseMetadata",
                    "name": "projects/test-project/instances/test-instance/databases/restored",
                    "progress": {"progressPercent": 60}
                },
                "done": false
            }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), None);

    with_config(&config)
        .args(["list_database_operations", "test-instance"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Database projects/test-project/instances/test-instance/databases/restored restored from backup is 60% optimized.",
        ));

    with_config(&config)
        .args([
            "list-database-operations",
            "test-instance",
            "-q",
            "operations[0].progress_percent",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("60"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_backup_precondition_failure() {
    let server = MockServer::start().await;
    let backup = format!("{}/backups/b1", INSTANCE);

    Mock::given(method("GET"))
        .and(path(backup.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/instances/test-instance/backups/b1",
            "state": "READY"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(backup.as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "backup in use", "status": "FAILED_PRECONDITION"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), Some("test-instance"));

    with_config(&config)
        .args(["delete-backup", "--backup-id", "b1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("backup in use"));
}
