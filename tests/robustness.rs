//! Robustness tests for edge cases and error conditions.
//!
//! These exercise the public pipeline with local HTTP stubs and temp
//! directories, so they need neither root nor network access.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use blacklist::aggregator::{deduplicate, Dict};
use blacklist::cmd_abstraction::CommandOutput;
use blacklist::compiler::{parse_directive, CFile};
use blacklist::config::Settings;
use blacklist::diagnostics::{MemorySink, Severity};
use blacklist::error::{ConfigError, FetchError};
use blacklist::extractor::extract;
use blacklist::fetcher::Fetcher;
use blacklist::fs_abstraction::RealFileSystem;
use blacklist::orchestrator::{plan, Orchestrator};
use blacklist::parser::parse;
use blacklist::reload::ServiceReloader;

/// Counts reloads instead of restarting anything.
#[derive(Default)]
struct CountingReloader {
    calls: AtomicUsize,
}

#[async_trait]
impl ServiceReloader for CountingReloader {
    async fn reload(&self) -> Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        })
    }
}

/// Serve the same HTTP response on `count` connections.
async fn serve(status: &str, body: String, count: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    tokio::spawn(async move {
        for _ in 0..count {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}/list.txt", addr)
}

fn settings_in(dir: &Path) -> Settings {
    Settings {
        dir: dir.join("dnsmasq.d"),
        lock_file: dir.join("blacklist.lock"),
        timeout_secs: 5,
        retries: 0,
        retry_delay_ms: 0,
        ..Default::default()
    }
}

fn directives(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| parse_directive(l).is_some())
        .map(str::to_string)
        .collect()
}

fn url_config(urls: &[String]) -> String {
    let mut sources = String::new();
    for (i, url) in urls.iter().enumerate() {
        sources.push_str(&format!("        source list{} {{\n            url {}\n        }}\n", i, url));
    }
    format!(
        "blacklist {{\n    dns-redirect-ip 0.0.0.0\n    hosts {{\n{}    }}\n}}\n",
        sources
    )
}

/// A refused connection surfaces as a transport failure, not a panic
#[tokio::test]
async fn test_unreachable_host() {
    let temp = TempDir::new().unwrap();
    let fetcher = Fetcher::new(&settings_in(temp.path())).unwrap();
    let fetched = fetcher.fetch_url("http://127.0.0.1:1/hosts").await;
    assert!(matches!(fetched.error, Some(FetchError::Transport { .. })));
    assert!(fetched.content.is_empty());
}

/// A malformed URL is reported as a request-form failure
#[tokio::test]
async fn test_malformed_url() {
    let temp = TempDir::new().unwrap();
    let fetcher = Fetcher::new(&settings_in(temp.path())).unwrap();
    let fetched = fetcher.fetch_url("not a url").await;
    assert!(matches!(fetched.error, Some(FetchError::RequestForm { .. })));
}

/// An HTTP error page is content, and extracts to nothing
#[tokio::test]
async fn test_http_error_body_is_content() {
    let temp = TempDir::new().unwrap();
    let url = serve("404 Not Found", "<html>gone</html>".to_string(), 1).await;
    let fetcher = Fetcher::new(&settings_in(temp.path())).unwrap();
    let fetched = fetcher.fetch_url(&url).await;
    assert!(fetched.is_ok());
    assert!(extract(&String::from_utf8_lossy(&fetched.content), None)
        .domains
        .is_empty());
}

/// An empty 200 response warns and removes the unit's previous file
#[tokio::test]
async fn test_empty_response_warns() {
    let temp = TempDir::new().unwrap();
    let settings = settings_in(temp.path());
    let path = settings.dir.join("hosts.url.blacklist.conf");
    std::fs::create_dir_all(&settings.dir).unwrap();
    std::fs::write(&path, "address=/old.example.com/0.0.0.0\n").unwrap();

    let url = serve("200 OK", String::new(), 1).await;
    let sink = Arc::new(MemorySink::new());
    let reloader = Arc::new(CountingReloader::default());
    let report = Orchestrator::new(settings)
        .with_sink(sink.clone())
        .with_reloader(reloader.clone())
        .run(&url_config(&[url.clone()]))
        .await;

    assert!(report.success, "{:?}", report.diagnostics);
    let warning = sink
        .events()
        .into_iter()
        .find(|d| d.severity == Severity::Warning)
        .unwrap();
    assert_eq!(warning.message, format!("No data returned for {}...", url));
    assert!(!path.exists());
    assert_eq!(reloader.calls.load(Ordering::SeqCst), 1);
}

/// A failing source is an error, but the other sources still compile
#[tokio::test]
async fn test_failed_source_does_not_stop_run() {
    let temp = TempDir::new().unwrap();
    let settings = settings_in(temp.path());
    let good = serve("200 OK", "0.0.0.0 ads.example.com\n".to_string(), 1).await;
    let bad = "http://127.0.0.1:1/hosts".to_string();

    let report = Orchestrator::new(settings.clone())
        .with_sink(Arc::new(MemorySink::new()))
        .with_reloader(Arc::new(CountingReloader::default()))
        .run(&url_config(&[bad, good]))
        .await;

    assert!(!report.success);
    assert_eq!(report.errors().count(), 1);
    assert_eq!(
        directives(&settings.dir.join("hosts.url.blacklist.conf")),
        vec!["address=/ads.example.com/0.0.0.0"]
    );
}

/// Output does not depend on the size of the download pool
#[tokio::test]
async fn test_cores_do_not_change_output() {
    let mut outputs = Vec::new();
    for cores in [1, 8] {
        let temp = TempDir::new().unwrap();
        let mut urls = Vec::new();
        for i in 0..6 {
            let body = format!(
                "0.0.0.0 shared.example.com\n0.0.0.0 only{}.example.com\n0.0.0.0 also{}.example.net\n",
                i,
                i % 3
            );
            urls.push(serve("200 OK", body, 1).await);
        }
        let settings = Settings {
            cores,
            ..settings_in(temp.path())
        };
        let report = Orchestrator::new(settings.clone())
            .with_sink(Arc::new(MemorySink::new()))
            .with_reloader(Arc::new(CountingReloader::default()))
            .run(&url_config(&urls))
            .await;
        assert!(report.success, "{:?}", report.diagnostics);
        outputs.push(directives(&settings.dir.join("hosts.url.blacklist.conf")));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].len(), 10);
    assert_eq!(outputs[0][0], "address=/shared.example.com/0.0.0.0");
}

/// Everything a run writes is expected by the next scan
#[tokio::test]
async fn test_compiled_files_are_not_stale() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("hosts.txt");
    std::fs::write(&source, "127.0.0.1 ads.example.com\n127.0.0.1 pixel.example.org\n").unwrap();
    let config = format!(
        "blacklist {{\n domains {{\n include adsrvr.org\n }}\n hosts {{\n include beap.gemini.yahoo.com\n source local {{\n file {}\n }}\n }}\n}}\n",
        source.display()
    );
    let settings = settings_in(temp.path());

    let report = Orchestrator::new(settings.clone())
        .with_sink(Arc::new(MemorySink::new()))
        .with_reloader(Arc::new(CountingReloader::default()))
        .run(&config)
        .await;
    assert!(report.success, "{:?}", report.diagnostics);

    let tree = parse(&config).unwrap();
    let expected: HashSet<PathBuf> = plan(&tree, &settings)
        .unwrap()
        .iter()
        .map(|u| u.target().path.clone())
        .collect();
    let cfile = CFile::scan(&RealFileSystem, &settings.stale_glob(), &expected).unwrap();
    assert_eq!(cfile.found.len(), 3);
    assert!(cfile.stale.is_empty());
}

/// Files in the output directory that do not match the extension survive
#[tokio::test]
async fn test_foreign_files_survive_cleanup() {
    let temp = TempDir::new().unwrap();
    let settings = settings_in(temp.path());
    std::fs::create_dir_all(&settings.dir).unwrap();
    let foreign = settings.dir.join("local.conf");
    let stale = settings.dir.join("hosts.url.blacklist.conf");
    std::fs::write(&foreign, "server=1.1.1.1\n").unwrap();
    std::fs::write(&stale, "address=/old.example.com/0.0.0.0\n").unwrap();

    let report = Orchestrator::new(settings)
        .with_sink(Arc::new(MemorySink::new()))
        .with_reloader(Arc::new(CountingReloader::default()))
        .run("blacklist {\n disabled true\n domains {\n }\n}\n")
        .await;

    assert!(report.success, "{:?}", report.diagnostics);
    assert_eq!(report.removed, vec![stale.clone()]);
    assert!(foreign.exists());
    assert!(!stale.exists());
}

/// Configuration errors are reported, never panics
#[test]
fn test_config_error_cases() {
    assert_eq!(parse("").unwrap_err(), ConfigError::MissingRoot);
    assert_eq!(
        parse("blacklist {\n exclude msdn.com\n}\n").unwrap_err(),
        ConfigError::NoAreas
    );
    assert!(matches!(
        parse("blacklist {\n dns-redirect-ip 300.1.1.1\n hosts {\n }\n}\n"),
        Err(ConfigError::InvalidIp(_))
    ));
    assert!(matches!(
        parse("blacklist {\n hosts {\n"),
        Err(ConfigError::MalformedBlock { .. })
    ));
    assert!(matches!(
        parse("blacklist {\n hosts {\n }\n}\n}\n"),
        Err(ConfigError::MalformedBlock { .. })
    ));
}

/// Large inputs extract and deduplicate without trouble
#[test]
fn test_large_input_handling() {
    let mut text = String::with_capacity(2_000_000);
    for i in 0..50_000 {
        text.push_str(&format!("0.0.0.0 host{}.example.com\n", i % 25_000));
    }
    let extracted = extract(&text, None);
    assert_eq!(extracted.domains.len(), 50_000);

    let merged = deduplicate(extracted.domains.iter().map(String::as_str), &Dict::new());
    assert_eq!(merged.domains.len(), 25_000);
    assert_eq!(merged.duplicates, 25_000);
}

/// Unicode and control characters are dropped, not mangled
#[test]
fn test_unicode_handling() {
    let extracted = extract(
        "0.0.0.0 ads.example.com\n0.0.0.0 пример.рф\n0.0.0.0 bad\u{0}name.com\n日本語\n",
        None,
    );
    assert_eq!(extracted.domains, vec!["ads.example.com"]);
}

/// Blank and comment-only input yields nothing
#[test]
fn test_empty_and_whitespace() {
    for input in ["", "   ", "\n\n\n", "# comment\n// comment\n! comment\n", "\t\r\n"] {
        assert!(extract(input, None).domains.is_empty(), "{:?}", input);
    }
}

/// Settings files that do not parse are rejected
#[test]
fn test_yaml_malformed_input() {
    let temp = TempDir::new().unwrap();
    let path: PathBuf = temp.path().join("blacklist.yaml");
    for input in ["dir: [unclosed", "cores: -1", "empty_area_policy: sometimes"] {
        std::fs::write(&path, input).unwrap();
        assert!(Settings::load(&path).is_err(), "{:?}", input);
    }
}
