//! Integration tests for catalog fetching and merging
//!
//! These tests use wiremock to stand in for the search endpoint and run the
//! fetch-then-merge cycle end-to-end against a temporary staging directory.

use async_trait::async_trait;
use catalog_harvest::catalog::CatalogMerger;
use catalog_harvest::config::{HttpConfig, SearchConfig};
use catalog_harvest::fetch::{
    build_http_client, fetch_catalog, page_count, BackoffPolicy, BackoffScheduler,
    HttpSearchClient, PaginatedFetcher, SearchApi, SearchError, SearchReply, SearchRequest,
};
use catalog_harvest::staging::StagingArea;
use catalog_harvest::storage::{lock_storage, share, RunStatus, SharedStorage, SqliteStorage};
use catalog_harvest::{ConfigError, HarvestError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_config(endpoint: &str) -> SearchConfig {
    SearchConfig {
        endpoint: endpoint.to_string(),
        page_size: 1000,
        locale: "en-US".to_string(),
        sort_key: "ACTIVE_DATE".to_string(),
    }
}

fn http_fetcher(server: &MockServer, staging: StagingArea) -> PaginatedFetcher<HttpSearchClient> {
    let endpoint = format!("{}/search", server.uri());
    let client = build_http_client(&HttpConfig::default()).expect("client");
    let api = HttpSearchClient::new(client, &endpoint).expect("endpoint");
    PaginatedFetcher::new(
        api,
        BackoffScheduler::new(BackoffPolicy::none()),
        staging,
        search_config(&endpoint),
    )
}

fn memory_storage() -> SharedStorage {
    share(SqliteStorage::open_in_memory().expect("in-memory database"))
}

fn entry(key: &str, title: &str) -> Value {
    json!({
        "dbId": key,
        "title": title,
        "collectionFeature": "bothImagesAndIndex",
        "recordCount": "1,000",
        "collection": "Census & Voter Lists"
    })
}

fn page_body(token: Option<&str>, entries: Vec<Value>) -> Value {
    json!({
        "TotalResults": 2500,
        "PagingInfo": { "PagingToken": token },
        "gridData": entries
    })
}

/// Mounts a probe reporting 2500 results and three pages chained by tokens
async fn mount_three_pages(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "RecordsPerPage": 1 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(Some("probe"), vec![])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "pagingInfo": { "PageNumber": 1, "RecordsPerPage": 1000, "PagingToken": "" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            Some("tokenA"),
            vec![entry("X", "Old title"), entry("A", "Alpha")],
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "pagingInfo": { "PageNumber": 2, "PagingToken": "tokenA" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(Some("tokenB"), vec![entry("B", "Beta")])),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "pagingInfo": { "PageNumber": 3, "PagingToken": "tokenB" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            None,
            vec![entry("X", "New title"), json!({ "title": "no key" })],
        )))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_pages_chained_by_token() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path());
    let mut fetcher = http_fetcher(&server, staging.clone());

    let pages = fetcher.fetch_all("run-1", 1000).await.unwrap();
    assert_eq!(pages.len(), 3);

    let tokens: Vec<&str> = pages.iter().map(|p| p.request_token.as_str()).collect();
    assert_eq!(tokens, vec!["", "tokenA", "tokenB"]);
    assert_eq!(pages[2].next_token, "");

    // Every page was staged in order
    let staged = staging.read_pages("run-1").unwrap();
    let indices: Vec<u32> = staged.iter().map(|p| p.page_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(staged[1].body["PagingInfo"]["PagingToken"], "tokenB");
}

#[tokio::test]
async fn test_fetch_then_merge_last_page_wins() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path());
    let storage = memory_storage();
    let mut fetcher = http_fetcher(&server, staging.clone());

    let report = fetch_catalog(&mut fetcher, &storage, "hash", 1000).await.unwrap();
    assert_eq!(report.total_results, 2500);
    assert_eq!(report.pages, 3);
    assert_eq!(
        lock_storage(&storage).unwrap().get_run(report.run_id).unwrap().status,
        RunStatus::Completed
    );

    let merger = CatalogMerger::new(staging, storage.clone());
    let merged = merger.merge_latest().unwrap().expect("completed run");
    assert_eq!(merged.traversal_id, report.traversal_id);
    assert_eq!(merged.pages, 3);
    assert_eq!(merged.entries, 5);
    assert_eq!(merged.distinct_keys, 3);
    assert_eq!(merged.skipped, 1);

    let store = lock_storage(&storage).unwrap();
    assert_eq!(store.count_collections().unwrap(), 3);
    let x = store.get_collection("X").unwrap().expect("collection X");
    assert_eq!(x.collection.title.as_deref(), Some("New title"));
    assert_eq!(x.collection.record_count, Some(1000));
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path());
    let storage = memory_storage();
    let mut fetcher = http_fetcher(&server, staging.clone());
    let report = fetch_catalog(&mut fetcher, &storage, "hash", 1000).await.unwrap();

    let merger = CatalogMerger::new(staging, storage.clone());
    merger.merge(&report.traversal_id).unwrap();
    let first: Vec<_> = lock_storage(&storage)
        .unwrap()
        .list_collections()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.collection))
        .collect();

    merger.merge(&report.traversal_id).unwrap();
    let second: Vec<_> = lock_storage(&storage)
        .unwrap()
        .list_collections()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.collection))
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_throttled_page_recovers_after_one_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "RecordsPerPage": 1 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalResults": 10,
            "PagingInfo": { "PagingToken": "probe" },
            "gridData": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "PageNumber": 1, "RecordsPerPage": 10 } })))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "PageNumber": 1, "RecordsPerPage": 10 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalResults": 10,
            "PagingInfo": { "PagingToken": null },
            "gridData": [entry("A", "Alpha")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut fetcher = http_fetcher(&server, StagingArea::new(dir.path()));
    let pages = fetcher.fetch_all("run-7", 10).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].body["gridData"][0]["dbId"], "A");
}

#[tokio::test]
async fn test_repeated_throttle_fails_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "RecordsPerPage": 1 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalResults": 20,
            "PagingInfo": { "PagingToken": "probe" },
            "gridData": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "PageNumber": 1, "RecordsPerPage": 10 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalResults": 20,
            "PagingInfo": { "PagingToken": "next" },
            "gridData": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "pagingInfo": { "PageNumber": 2 } })))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path());
    let storage = memory_storage();
    let mut fetcher = http_fetcher(&server, staging.clone());

    let err = fetch_catalog(&mut fetcher, &storage, "hash", 10)
        .await
        .unwrap_err();
    match err {
        HarvestError::RateLimitExceeded {
            page_index,
            retries,
            ..
        } => {
            assert_eq!(page_index, 1);
            assert_eq!(retries, 1);
        }
        other => panic!("unexpected error: {}", other),
    }

    let store = lock_storage(&storage).unwrap();
    let run = store.get_latest_run(None).unwrap().expect("run");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());

    // The page before the fault stays staged
    assert_eq!(staging.read_pages(&run.traversal_id()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_probe_without_total_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PagingInfo": { "PagingToken": "" },
            "gridData": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut fetcher = http_fetcher(&server, StagingArea::new(dir.path()));
    let err = fetcher.fetch_all("run-1", 100).await.unwrap_err();
    assert!(matches!(err, HarvestError::Decode { .. }));
}

/// Search endpoint serving `total` results, counting calls
struct CountingApi {
    total: u64,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl SearchApi for CountingApi {
    async fn search(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SearchReply::from_body(json!({
            "TotalResults": self.total,
            "PagingInfo": { "PagingToken": format!("t{}", request.paging_info.page_number) },
            "gridData": []
        }))
    }
}

#[tokio::test]
async fn test_page_requests_cover_total() {
    let cases: [(u64, u32); 7] = [
        (0, 1000),
        (1, 1000),
        (999, 1000),
        (1000, 1000),
        (1001, 1000),
        (2500, 1000),
        (7, 3),
    ];
    for (total, page_size) in cases {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let api = CountingApi {
            total,
            calls: calls.clone(),
        };
        let mut fetcher = PaginatedFetcher::new(
            api,
            BackoffScheduler::new(BackoffPolicy::none()),
            StagingArea::new(dir.path()),
            search_config("http://localhost/search"),
        );

        let pages = fetcher.fetch_all("run-1", page_size).await.unwrap();
        let expected = total.div_ceil(page_size as u64) as u32;
        assert_eq!(page_count(total, page_size), expected);
        assert_eq!(pages.len() as u32, expected, "total {} size {}", total, page_size);

        // One probe plus one request per page
        assert_eq!(
            calls.load(Ordering::SeqCst),
            expected + 1,
            "total {} size {}",
            total,
            page_size
        );
    }
}

fn counting_fetcher(total: u64, calls: Arc<AtomicU32>, dir: &TempDir) -> PaginatedFetcher<CountingApi> {
    PaginatedFetcher::new(
        CountingApi { total, calls },
        BackoffScheduler::new(BackoffPolicy::none()),
        StagingArea::new(dir.path()),
        search_config("http://localhost/search"),
    )
}

#[tokio::test]
async fn test_zero_page_size_is_rejected_before_any_request() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let mut fetcher = counting_fetcher(2500, calls.clone(), &dir);
    let storage = memory_storage();

    let err = fetch_catalog(&mut fetcher, &storage, "h", 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarvestError::Config(ConfigError::Validation(_))
    ));
    assert!(matches!(
        fetcher.fetch_all("run-1", 0).await,
        Err(HarvestError::Config(ConfigError::Validation(_)))
    ));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(lock_storage(&storage)
        .unwrap()
        .get_latest_run(None)
        .unwrap()
        .is_none());
}

/// Search endpoint that drops the run row behind the storage's back, then fails
struct RunDroppingApi {
    db_path: PathBuf,
}

#[async_trait]
impl SearchApi for RunDroppingApi {
    async fn search(&self, _request: &SearchRequest) -> Result<SearchReply, SearchError> {
        let conn = rusqlite::Connection::open(&self.db_path).expect("second connection");
        conn.execute("DELETE FROM runs", []).expect("delete runs");
        Err(SearchError::Status(503))
    }
}

#[tokio::test]
async fn test_traversal_fault_survives_failed_status_update() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let storage = share(SqliteStorage::new(&db_path).unwrap());
    let mut fetcher = PaginatedFetcher::new(
        RunDroppingApi { db_path },
        BackoffScheduler::new(BackoffPolicy::none()),
        StagingArea::new(dir.path().join("staging")),
        search_config("http://localhost/search"),
    );

    let err = fetch_catalog(&mut fetcher, &storage, "h", 1000)
        .await
        .unwrap_err();
    assert!(
        matches!(err, HarvestError::ProbeFailed { retries: 1, .. }),
        "unexpected error: {}",
        err
    );
}
