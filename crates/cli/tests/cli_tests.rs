//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the CLI with an isolated home directory
fn meshgraph(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_meshgraph"))
        .args(args)
        .env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("MESHGRAPH_PROMETHEUS_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

const ANNOTATED_SNAPSHOT: &str = r#"[
  {
    "id": "wl_bookinfo_productpage-v1",
    "kind": "workload",
    "namespace": "bookinfo",
    "workload": "productpage-v1",
    "edges": [
      {
        "source": "wl_bookinfo_productpage-v1",
        "dest": "wl_bookinfo_reviews-v1",
        "metadata": { "isMTLS": 75.0 }
      },
      {
        "source": "wl_bookinfo_productpage-v1",
        "dest": "wl_bookinfo_details-v1"
      }
    ]
  },
  { "id": "wl_bookinfo_reviews-v1", "kind": "workload", "namespace": "bookinfo", "workload": "reviews-v1" },
  { "id": "wl_bookinfo_details-v1", "kind": "workload", "namespace": "bookinfo", "workload": "details-v1" }
]"#;

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = meshgraph(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Mesh Graph"), "Should show app name");
    assert!(stdout.contains("annotate"), "Should show annotate command");
    assert!(stdout.contains("queries"), "Should show queries command");
    assert!(stdout.contains("show"), "Should show show command");
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = meshgraph(home.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("meshgraph"), "Should show binary name");
}

#[test]
fn test_annotate_requires_namespace() {
    let home = TempDir::new().unwrap();
    let output = meshgraph(home.path(), &["annotate", "--input", "graph.json"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--namespace"), "Should name the missing flag");
}

#[test]
fn test_queries_json() {
    let home = TempDir::new().unwrap();
    let output = meshgraph(
        home.path(),
        &["--format", "json", "queries", "-n", "bookinfo", "--duration-secs", "300"],
    );

    assert!(output.status.success());
    let queries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outbound = queries[0]["outbound"].as_str().unwrap();
    let inbound = queries[0]["inbound"].as_str().unwrap();

    assert!(outbound.starts_with(
        "sum(rate(istio_requests_total{reporter=\"destination\",source_workload_namespace!=\"bookinfo\",destination_service_namespace=\"bookinfo\"}[300s]) > 0)"
    ));
    assert!(inbound.contains(
        "source_workload_namespace=\"bookinfo\",destination_service_namespace!~\"istio-system\"}[300s]"
    ));
}

#[test]
fn test_queries_respect_config_file() {
    let home = TempDir::new().unwrap();
    let config_dir = home.path().join(".config").join("meshgraph");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.json"),
        r#"{"duration_secs": 60, "istio_namespaces": ["istio-system", "istio-gateways"]}"#,
    )
    .unwrap();

    let output = meshgraph(home.path(), &["--format", "json", "queries", "-n", "shop"]);

    assert!(output.status.success());
    let queries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let inbound = queries[0]["inbound"].as_str().unwrap();
    assert!(inbound.contains("!~\"istio-gateways|istio-system\""));
    assert!(inbound.contains("[60s]"));
}

#[test]
fn test_show_annotated_edges() {
    let home = TempDir::new().unwrap();
    let snapshot = home.path().join("annotated.json");
    std::fs::write(&snapshot, ANNOTATED_SNAPSHOT).unwrap();

    let output = meshgraph(
        home.path(),
        &["--format", "json", "show", snapshot.to_str().unwrap()],
    );
    assert!(output.status.success());
    let edges: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(edges.as_array().unwrap().len(), 1);
    assert_eq!(edges[0]["dest"], "wl_bookinfo_reviews-v1");
    assert_eq!(edges[0]["isMTLS"], 75.0);

    let output = meshgraph(home.path(), &["show", "--all", snapshot.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("75%"));
    assert!(stdout.contains("wl_bookinfo_details-v1"));
}

#[test]
fn test_annotate_fails_when_backend_unreachable() {
    let home = TempDir::new().unwrap();
    let snapshot = home.path().join("graph.json");
    std::fs::write(&snapshot, ANNOTATED_SNAPSHOT).unwrap();

    let output = meshgraph(
        home.path(),
        &[
            "--prometheus-url",
            "http://127.0.0.1:1",
            "--query-timeout-secs",
            "2",
            "annotate",
            "--input",
            snapshot.to_str().unwrap(),
            "-n",
            "bookinfo",
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Security policy annotation failed"));
}

#[test]
fn test_show_missing_file() {
    let home = TempDir::new().unwrap();
    let output = meshgraph(home.path(), &["show", "/nonexistent/graph.json"]);

    assert!(!output.status.success());
}
