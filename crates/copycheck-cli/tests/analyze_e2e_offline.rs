use axum::{extract::Query, http::header, routing::get, Json, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DOC: &str = "Artificial intelligence is transforming healthcare. My cat prefers sunny windowsills.";

/// SearXNG-shaped `/search` plus two pages it links to. Returns the address and a search-hit counter.
async fn fixture() -> (SocketAddr, Arc<AtomicUsize>) {
    let searches = Arc::new(AtomicUsize::new(0));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let app = Router::new()
        .route(
            "/search",
            get({
                let searches = searches.clone();
                move |Query(q): Query<HashMap<String, String>>| {
                    let searches = searches.clone();
                    async move {
                        searches.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(q.get("format").map(String::as_str), Some("json"));
                        Json(serde_json::json!({
                            "results": [
                                {"url": format!("http://{addr}/page/a"), "title": "A", "content": "a"},
                                {"url": format!("http://{addr}/page/b"), "title": "B", "content": "b"}
                            ]
                        }))
                    }
                }
            }),
        )
        .route(
            "/page/a",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    "<html><body><nav>Home | News</nav>\
                     <p>Artificial intelligence is transforming healthcare.</p>\
                     <script>track()</script></body></html>",
                )
            }),
        )
        .route(
            "/page/b",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/plain")],
                    "Cooking pasta requires salted boiling water.",
                )
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, searches)
}

fn run(addr: SocketAddr, extra: &[&str]) -> std::process::Output {
    let bin = assert_cmd::cargo::cargo_bin!("copycheck");
    let mut cmd = std::process::Command::new(bin);
    cmd.args(["analyze", "--text", DOC, "--chunk-max-len", "60", "--threshold", "0.9"])
        .args(["--provider", "searxng", "--embedder", "none"])
        .args(extra)
        .env("COPYCHECK_SEARXNG_ENDPOINT", format!("http://{addr}"))
        .env("COPYCHECK_LOG", "debug");
    for k in [
        "COPYCHECK_ENV_FILE",
        "COPYCHECK_CACHE",
        "COPYCHECK_CACHE_DIR",
        "HTTP_PROXY",
        "HTTPS_PROXY",
        "ALL_PROXY",
        "http_proxy",
        "https_proxy",
        "all_proxy",
    ] {
        cmd.env_remove(k);
    }
    cmd.output().expect("run copycheck analyze")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_reports_copied_sentence_offline() {
    let (addr, searches) = fixture().await;

    let out = tokio::task::spawn_blocking(move || run(addr, &[])).await.unwrap();
    assert!(
        out.status.success(),
        "analyze failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    // Logs stay on stderr so stdout is one JSON document.
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse report json");

    assert_eq!(v["text"].as_str(), Some(DOC));
    assert_eq!(v["plagiarismPercentage"].as_f64(), Some(50.0));
    let results = v["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0]["chunk"].as_str(),
        Some("Artificial intelligence is transforming healthcare.")
    );
    assert_eq!(
        results[0]["matchedText"].as_str(),
        Some("Artificial intelligence is transforming healthcare.")
    );
    assert_eq!(results[0]["source"].as_str(), Some(format!("http://{addr}/page/a").as_str()));
    assert_eq!(results[0]["mode"].as_str(), Some("lexical"));
    assert_eq!(searches.load(Ordering::SeqCst), 2, "one search per chunk");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_text_format_mirrors_the_report_layout() {
    let (addr, _) = fixture().await;
    let out = tokio::task::spawn_blocking(move || run(addr, &["--format", "text"]))
        .await
        .unwrap();
    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("Plagiarism Percentage: 50.00%"), "{s}");
    assert!(s.contains("Text 1 (Similarity: 100.00%):"), "{s}");
    assert!(s.contains(&format!("Source: http://{addr}/page/a")), "{s}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_cache_is_reused_across_runs() {
    let (addr, searches) = fixture().await;
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("cache");
    let dir_s = dir.to_string_lossy().to_string();

    let d1 = dir_s.clone();
    let first = tokio::task::spawn_blocking(move || run(addr, &["--cache", "fs", "--cache-dir", &d1]))
        .await
        .unwrap();
    assert!(first.status.success());
    assert_eq!(searches.load(Ordering::SeqCst), 2);

    let second = tokio::task::spawn_blocking(move || run(addr, &["--cache", "fs", "--cache-dir", &dir_s]))
        .await
        .unwrap();
    assert!(second.status.success());
    assert_eq!(searches.load(Ordering::SeqCst), 2, "second run is served from the cache");
    assert_eq!(first.stdout, second.stdout);
}
