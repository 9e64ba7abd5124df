//! HTTP server and GitHub connector tests against local listeners.

mod common;

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use common::*;
use tutorial_harness::acquire::AcquisitionFilter;
use tutorial_harness::config::Config;
use tutorial_harness::connector_github::GitHubConnector;
use tutorial_harness::error::AcquisitionError;
use tutorial_harness::llm::{CompletionGateway, DisabledProvider};
use tutorial_harness::cache::InMemoryCache;
use tutorial_harness::server::run_server_with_gateway;
use tutorial_harness::traits::Connector;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn scripted() -> ScriptedProvider {
    ScriptedProvider::new()
        .on(CHAPTER, &[&chapter_text("A chapter about one idea.")])
        .on(
            DISCOVERY,
            &[&yaml(
                "- {name: Cache, description: Keeps answers., file_indices: [0, 1]}\n\
                 - {name: Router, description: Routes requests., file_indices: [2]}",
            )],
        )
        .on(
            RELATIONSHIPS,
            &[&yaml(
                "summary: A small service.\nrelationships:\n  - {from_abstraction: 1, to_abstraction: 0, label: Uses}",
            )],
        )
        .on(ORDERING, &[&yaml("- 1 # Router\n- 0 # Cache")])
}

/// Start the server on a free port and return its base URL.
async fn start_server(gateway: CompletionGateway) -> String {
    let port = find_free_port();
    let mut cfg = fast_config(2);
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg.acquisition.github_api_url = "http://127.0.0.1:9".to_string();

    tokio::spawn(async move {
        run_server_with_gateway(&cfg, gateway).await.unwrap();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

fn zip_fixture() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, content) in [
        ("tiny/src/app.py", "from router import route\n"),
        ("tiny/src/cache.py", "class Cache:\n    pass\n"),
        ("tiny/src/router.py", "def route(req):\n    return req\n"),
        ("tiny/README.txt", "not included by default globs"),
    ] {
        writer.start_file(path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn post_generate(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&body)
        .send()
        .await
        .unwrap()
}

// ─── Server ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_provider() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "scripted");
}

#[tokio::test]
async fn test_generate_from_archive_returns_zip() {
    let provider = Arc::new(scripted());
    let base = start_server(gateway(provider.clone())).await;

    let encoded = base64::engine::general_purpose::STANDARD.encode(zip_fixture());
    let resp = post_generate(&base, json!({ "archive_base64": encoded, "archive_name": "tiny.zip" })).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("tiny.zip"), "{}", disposition);

    let bytes = resp.bytes().await.unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["tiny/01_router.md", "tiny/02_cache.md", "tiny/index.md"]
    );

    let mut index = String::new();
    archive
        .by_name("tiny/index.md")
        .unwrap()
        .read_to_string(&mut index)
        .unwrap();
    assert!(index.starts_with("# Tutorial: tiny"));
    assert!(index.contains("```mermaid"));

    // README.txt is outside the default include globs.
    let discovery = provider.prompts_for(DISCOVERY);
    assert!(!discovery[0].contains("README.txt"));
    assert!(discovery[0].contains("src/cache.py"));
}

#[tokio::test]
async fn test_project_name_override() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(zip_fixture());
    let resp = post_generate(&base, json!({ "archive_base64": encoded, "project_name": "Renamed" })).await;

    assert_eq!(resp.status(), 200);
    let bytes = resp.bytes().await.unwrap();
    let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert!(archive.file_names().all(|n| n.starts_with("Renamed/")));
}

#[tokio::test]
async fn test_control_characters_in_project_name() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(zip_fixture());
    let resp = post_generate(&base, json!({ "archive_base64": encoded, "project_name": "Line\nBreak" })).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"line_break.zip\""
    );
    let bytes = resp.bytes().await.unwrap();
    let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert!(archive.file_names().all(|n| n.starts_with("line_break/")));
}

#[tokio::test]
async fn test_missing_locator_is_bad_request() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let resp = post_generate(&base, json!({ "language": "french" })).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_archive_without_matching_files_is_empty_source() {
    let base = start_server(gateway(Arc::new(scripted()))).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(zip_fixture());
    let resp = post_generate(&base, json!({ "archive_base64": encoded, "include": ["**/*.go"] })).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "empty_source");
}

#[tokio::test]
async fn test_failing_provider_is_bad_gateway() {
    let gw = CompletionGateway::new(Arc::new(DisabledProvider), Arc::new(InMemoryCache::new()));
    let base = start_server(gw).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(zip_fixture());
    let resp = post_generate(&base, json!({ "archive_base64": encoded })).await;

    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "pipeline_failed");
}

// ─── GitHub connector against a mock API ────────────────────────────

async fn start_mock_github() -> String {
    async fn repo(Path((owner, repo)): Path<(String, String)>) -> Result<Json<Value>, StatusCode> {
        if owner == "acme" && repo == "widgets" {
            Ok(Json(json!({ "default_branch": "trunk" })))
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    }

    async fn tree(Path((_, _, git_ref)): Path<(String, String, String)>) -> Result<Json<Value>, StatusCode> {
        if git_ref != "trunk" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(json!({
            "truncated": false,
            "tree": [
                { "path": "lib", "type": "tree" },
                { "path": "lib/widget.py", "type": "blob", "size": 24 },
                { "path": "lib/odd #1?.py", "type": "blob", "size": 30 },
                { "path": "lib/huge.py", "type": "blob", "size": 5000000 },
                { "path": "docs/guide.md", "type": "blob", "size": 10 },
                { "path": "setup.py", "type": "blob", "size": 12 }
            ]
        })))
    }

    async fn contents(Path((_, _, path)): Path<(String, String, String)>) -> String {
        format!("# contents of {}\n", path)
    }

    let app = Router::new()
        .route("/repos/{owner}/{repo}", get(repo))
        .route("/repos/{owner}/{repo}/git/trees/{git_ref}", get(tree))
        .route("/repos/{owner}/{repo}/contents/{*path}", get(contents));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn default_filter() -> AcquisitionFilter {
    AcquisitionFilter::from_config(&Config::minimal().acquisition).unwrap()
}

#[tokio::test]
async fn test_github_acquire_uses_default_branch() {
    let api = start_mock_github().await;
    let connector = GitHubConnector::new("https://github.com/acme/widgets", &api, None).unwrap();

    let acq = connector.acquire(&default_filter()).await.unwrap();
    assert_eq!(acq.project_name, "widgets");

    let paths: Vec<&str> = acq.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["lib/odd #1?.py", "lib/widget.py", "setup.py"]);
    assert_eq!(acq.files[0].content, "# contents of lib/odd #1?.py\n");
    assert_eq!(acq.files[1].content, "# contents of lib/widget.py\n");

    assert_eq!(acq.skipped.len(), 1);
    assert_eq!(acq.skipped[0].path, "lib/huge.py");
    assert_eq!(
        connector.source_url().as_deref(),
        Some("https://github.com/acme/widgets")
    );
}

#[tokio::test]
async fn test_github_subdirectory_is_relative() {
    let api = start_mock_github().await;
    let connector =
        GitHubConnector::new("https://github.com/acme/widgets/tree/trunk/lib", &api, None).unwrap();

    let acq = connector.acquire(&default_filter()).await.unwrap();
    let paths: Vec<&str> = acq.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["odd #1?.py", "widget.py"]);
}

#[tokio::test]
async fn test_github_missing_repo_is_not_found() {
    let api = start_mock_github().await;
    let connector = GitHubConnector::new("https://github.com/acme/nothing", &api, None).unwrap();

    let err = connector.acquire(&default_filter()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AcquisitionError>(),
        Some(AcquisitionError::NotFound(_))
    ));
}
