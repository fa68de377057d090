use devdocs_ingest::config::{
    Config, CrawlerConfig, ExtractConfig, OutputConfig, SourceConfig, TargetEntry,
    UserAgentConfig,
};
use devdocs_ingest::crawler::CodeBlock;
use devdocs_ingest::storage::{SqliteStorage, Storage};
use devdocs_ingest::{Ingestor, JobStatus};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at a mock documentation server
fn create_test_config(server: &MockServer, concurrency: u32, delay_ms: u64, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency,
            inter_batch_delay_ms: delay_ms,
            request_timeout_ms: 5_000,
            max_retries: 1,
            retry_backoff_ms: 1,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        source: SourceConfig {
            index_url: format!("{}/docs/{{target}}/index.json", server.uri()),
            page_base_url: server.uri(),
            page_suffix: ".html".to_string(),
        },
        extract: ExtractConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        targets: vec![TargetEntry {
            slug: "rust".to_string(),
        }],
    }
}

fn page_html(index: usize, revision: &str) -> String {
    format!(
        r#"<html><head><title>Page {index}</title></head><body>
        <nav>Site navigation</nav>
        <div class="_content">
          <h1>Item {index}</h1>
          <p>Documentation for item number {index}, revision {revision}.</p>
          <pre data-language="rust">fn item_{index}() {{}}</pre>
        </div>
        </body></html>"#
    )
}

async fn mount_manifest(server: &MockServer, pages: usize) {
    let entries: Vec<String> = (0..pages)
        .map(|i| format!(r#"{{"name": "std::item{i}", "path": "std/item{i}", "type": "Functions"}}"#))
        .collect();
    Mock::given(method("GET"))
        .and(path("/docs/rust/index.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"{{"entries": [{}]}}"#, entries.join(","))),
        )
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, index: usize, revision: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/rust/std/item{index}.html")))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html(index, revision)))
        .mount(server)
        .await;
}

async fn mount_site(server: &MockServer, pages: usize) {
    mount_manifest(server, pages).await;
    for i in 0..pages {
        mount_page(server, i, "a").await;
    }
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("devdocs.db").to_string_lossy().into_owned()
}

fn ingestor(config: Config) -> Ingestor<SqliteStorage> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    Ingestor::new(config, storage).unwrap()
}

#[tokio::test]
async fn test_full_ingest_single_target() {
    let server = MockServer::start().await;
    mount_site(&server, 5).await;
    let dir = TempDir::new().unwrap();
    let db = db_path(&dir);

    let ingestor = ingestor(create_test_config(&server, 2, 0, &db));
    let job = ingestor.run("rust").await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_items, 5);
    assert_eq!(job.items_processed, 5);
    assert_eq!(job.items_new, 5);
    assert_eq!(job.items_failed, 0);
    assert_eq!(job.progress, 100);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_message.is_none());
    drop(ingestor);

    // Reopen the database and inspect what was stored
    let storage = SqliteStorage::new(Path::new(&db)).unwrap();
    assert_eq!(storage.count_content("rust").unwrap(), 5);
    assert_eq!(storage.get_job(job.id).unwrap(), job);

    let url = format!("{}/rust/std/item3.html", server.uri());
    let entry = storage.get_content(&url).unwrap().unwrap();
    assert_eq!(entry.title, "Item 3");
    assert_eq!(
        entry.body,
        "Item 3 Documentation for item number 3, revision a."
    );
    assert_eq!(
        entry.code_blocks,
        vec![CodeBlock {
            language: "rust".to_string(),
            code: "fn item_3() {}".to_string(),
        }]
    );
    assert_eq!(entry.topics, vec!["rust", "functions", "std", "item3"]);
    assert!(entry.keywords.contains(&"documentation".to_string()));

    let source = storage.get_source("rust").unwrap().unwrap();
    assert_eq!(source.page_count, 5);
    assert_eq!(source.run_count, 1);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_site(&server, 5).await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 2, 0, &db_path(&dir)));
    ingestor.run("rust").await.unwrap();
    let second = ingestor.run("rust").await.unwrap();

    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.items_new, 0);
    assert_eq!(second.items_updated, 0);
    assert_eq!(second.items_unchanged, 5);

    let jobs = ingestor.jobs(Some("rust")).unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second.id);
}

#[tokio::test]
async fn test_changed_page_is_updated() {
    let server = MockServer::start().await;
    mount_site(&server, 3).await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 3, 0, &db_path(&dir)));
    ingestor.run("rust").await.unwrap();

    server.reset().await;
    mount_manifest(&server, 3).await;
    mount_page(&server, 0, "a").await;
    mount_page(&server, 1, "b").await;
    mount_page(&server, 2, "a").await;

    let job = ingestor.run("rust").await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_updated, 1);
    assert_eq!(job.items_unchanged, 2);
    assert_eq!(job.items_new, 0);
}

#[tokio::test]
async fn test_manifest_server_error_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/rust/index.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 2, 0, &db_path(&dir)));
    let job = ingestor.run("rust").await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.total_items, 0);
    assert_eq!(job.items_processed, 0);
    assert!(job.started_at.is_none());
    let message = job.error_message.unwrap();
    assert!(message.contains("Manifest unavailable"));
    assert!(message.contains("500"));
}

#[tokio::test]
async fn test_single_page_failure_is_isolated() {
    let server = MockServer::start().await;
    mount_manifest(&server, 10).await;
    for i in 0..10 {
        if i == 2 {
            Mock::given(method("GET"))
                .and(path("/rust/std/item2.html"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        } else {
            mount_page(&server, i, "a").await;
        }
    }
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 4, 0, &db_path(&dir)));
    let job = ingestor.run("rust").await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_processed, 10);
    assert_eq!(job.items_failed, 1);
    assert_eq!(job.items_new, 9);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn test_empty_manifest_completes() {
    let server = MockServer::start().await;
    mount_manifest(&server, 0).await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 2, 0, &db_path(&dir)));
    let job = ingestor.run("rust").await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_items, 0);
    assert_eq!(job.progress, 100);
}

#[tokio::test]
async fn test_cancel_between_batches() {
    let server = MockServer::start().await;
    mount_site(&server, 6).await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 2, 200, &db_path(&dir)));
    let (job_id, handle) = ingestor.trigger("rust").unwrap();
    assert!(ingestor.cancel(job_id));

    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.items_processed, 2);
    assert_eq!(job.total_items, 6);
    assert_eq!(ingestor.job(job_id).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_pause_and_resume_sum_counters() {
    let server = MockServer::start().await;
    mount_site(&server, 5).await;
    let dir = TempDir::new().unwrap();

    let ingestor = ingestor(create_test_config(&server, 2, 50, &db_path(&dir)));
    let (job_id, handle) = ingestor.trigger("rust").unwrap();
    assert!(ingestor.pause(job_id));

    let paused = handle.await.unwrap().unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert_eq!(paused.items_processed, 2);
    assert_eq!(paused.progress, 40);

    let job = ingestor.resume(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_processed, 5);
    assert_eq!(job.items_new, 5);
    assert_eq!(job.total_items, 5);
    assert_eq!(job.progress, 100);
    assert!(job.is_consistent());
}
