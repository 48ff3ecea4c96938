//! CLI integration tests that need no database.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

fn compass_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("compass");
    path
}

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("compass.toml");
    let content = format!(
        r#"[store]
url_env = "COMPASS_TEST_UNSET_DATABASE_URL"

[embedding]
provider = "disabled"

[completion]
provider = "disabled"

[server]
bind = "127.0.0.1:0"
{}"#,
        extra
    );
    fs::write(&path, content).unwrap();
    path
}

fn run_compass(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = compass_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("COMPASS_TEST_UNSET_DATABASE_URL")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run compass binary at {:?}: {}", binary, e));

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code(),
    )
}

#[test]
fn test_missing_database_url_is_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    for args in [
        vec!["search", "product management"],
        vec!["ingest", "--dry-run"],
        vec!["courses", "probe"],
    ] {
        let (_, stderr, code) = run_compass(&config, &args);
        assert_eq!(code, Some(1), "args {:?}", args);
        assert!(
            stderr.contains("configuration error"),
            "args {:?}, stderr: {}",
            args,
            stderr
        );
        assert!(stderr.contains("COMPASS_TEST_UNSET_DATABASE_URL"));
    }
}

#[test]
fn test_ingest_with_disabled_embeddings_fails_before_connecting() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let (_, stderr, code) = run_compass(&config, &["ingest"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("embedding provider is disabled"), "stderr: {}", stderr);
    assert!(!stderr.contains("COMPASS_TEST_UNSET_DATABASE_URL"));
}

#[test]
fn test_blank_search_query_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let (stdout, stderr, code) = run_compass(&config, &["search", "   "]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("'query'"), "stderr: {}", stderr);
    assert!(!stdout.contains("No results."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "\n[retrieval]\nsearch_strategy = \"telepathy\"\n");

    let (_, stderr, code) = run_compass(&config, &["search", "x"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("telepathy"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, code) = run_compass(&tmp.path().join("nope.toml"), &["ingest"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_courses_load_rejects_non_array_before_connecting() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let data = tmp.path().join("courses.json");
    fs::write(&data, r#"{"course_id": "PM101"}"#).unwrap();

    let (_, stderr, code) = run_compass(&config, &["courses", "load", data.to_str().unwrap()]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("JSON array"), "stderr: {}", stderr);
}
