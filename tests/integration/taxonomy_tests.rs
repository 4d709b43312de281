//! Integration tests for taxonomy crawling and collection details
//!
//! These tests use wiremock to serve the browse and collection-info
//! endpoints and check what ends up in the store.

use catalog_harvest::config::HttpConfig;
use catalog_harvest::fetch::{build_http_client, BackoffPolicy, BackoffScheduler};
use catalog_harvest::storage::{lock_storage, share, SharedStorage, SqliteStorage};
use catalog_harvest::taxonomy::{BrowseError, HttpBrowseClient, TaxonomyCrawler};
use catalog_harvest::{Collection, HarvestError};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawler(server: &MockServer, storage: SharedStorage, max_depth: u32) -> TaxonomyCrawler<HttpBrowseClient> {
    let client = build_http_client(&HttpConfig::default()).expect("client");
    let api = HttpBrowseClient::new(
        client,
        &format!("{}/browse", server.uri()),
        &format!("{}/info", server.uri()),
    )
    .expect("endpoints");
    TaxonomyCrawler::new(
        api,
        BackoffScheduler::new(BackoffPolicy::none()),
        storage,
        max_depth,
    )
}

fn memory_storage() -> SharedStorage {
    share(SqliteStorage::open_in_memory().expect("in-memory database"))
}

fn level(has_child_levels: bool, values: &[&str]) -> Value {
    let entries: Vec<Value> = values
        .iter()
        .map(|v| json!({ "value": v, "label": format!("{} label", v) }))
        .collect();
    json!({ "hasChildLevels": has_child_levels, "entries": entries })
}

async fn mount_level(server: &MockServer, key: &str, browse_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/browse"))
        .and(query_param("dbId", key))
        .and(query_param("path", browse_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_builds_and_attaches_tree() {
    let server = MockServer::start().await;
    mount_level(&server, "A", "", level(true, &["B", "C"])).await;
    mount_level(&server, "A", "B", level(true, &[])).await;
    mount_level(&server, "A", "C", level(false, &["D"])).await;

    let storage = memory_storage();
    let mut crawler = crawler(&server, storage.clone(), 8);
    let outcome = crawler.crawl_and_attach("A").await.unwrap();

    assert_eq!(outcome.requests, 3);
    assert_eq!(outcome.nodes, 3);
    assert_eq!(outcome.depth, 2);
    assert_eq!(outcome.depth_limit_reached, 0);

    let sections = lock_storage(&storage).unwrap().get_sections("A").unwrap();
    assert_eq!(sections, outcome.sections);

    let values: Vec<&str> = sections.iter().map(|s| s.value.as_str()).collect();
    assert_eq!(values, vec!["B", "C"]);
    assert_eq!(sections[0].label, "B label");
    assert!(!sections[0].has_children);
    assert!(sections[0].children.is_empty());
    assert!(sections[1].has_children);
    assert_eq!(sections[1].children.len(), 1);
    assert_eq!(sections[1].children[0].value, "D");
    assert!(sections[1].children[0].children.is_empty());
}

#[tokio::test]
async fn test_crawl_stops_at_depth_cap() {
    let server = MockServer::start().await;
    mount_level(&server, "A", "", level(true, &["B", "C"])).await;
    mount_level(&server, "A", "B", level(true, &["E"])).await;
    mount_level(&server, "A", "C", level(true, &["D"])).await;

    let storage = memory_storage();
    let outcome = crawler(&server, storage, 2).crawl("A").await.unwrap();

    // Third-level paths are never requested
    assert_eq!(outcome.requests, 3);
    assert_eq!(outcome.depth, 2);
    assert_eq!(outcome.depth_limit_reached, 2);
    assert!(outcome.sections[1].children[0].has_children);
}

#[tokio::test]
async fn test_failed_crawl_keeps_stored_tree() {
    let server = MockServer::start().await;
    mount_level(&server, "A", "", level(true, &["B", "C"])).await;
    mount_level(&server, "A", "B", level(false, &["B1"])).await;
    mount_level(&server, "A", "C", level(false, &["C1"])).await;

    let storage = memory_storage();
    crawler(&server, storage.clone(), 8)
        .crawl_and_attach("A")
        .await
        .unwrap();
    let before = lock_storage(&storage).unwrap().get_sections("A").unwrap();
    assert_eq!(before.len(), 2);

    // Second crawl: the tree changed and the second branch keeps failing
    server.reset().await;
    mount_level(&server, "A", "", level(true, &["X", "Y"])).await;
    mount_level(&server, "A", "X", level(false, &["X1"])).await;
    Mock::given(method("GET"))
        .and(path("/browse"))
        .and(query_param("path", "Y"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let err = crawler(&server, storage.clone(), 8)
        .crawl_and_attach("A")
        .await
        .unwrap_err();
    match err {
        HarvestError::Browse {
            collection_key,
            path,
            source,
        } => {
            assert_eq!(collection_key, "A");
            assert_eq!(path, "Y");
            assert!(matches!(source, BrowseError::Status(503)));
        }
        other => panic!("unexpected error: {}", other),
    }

    let after = lock_storage(&storage).unwrap().get_sections("A").unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_enrich_merges_details_into_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .and(query_param("dbId", "5058"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "imageInfo": {
                "dbId": "5058",
                "structureType": { "1": "State", "2": "County", "3": "Township" },
                "collectionInfo": {
                    "databaseName": "1790usfedcen",
                    "primaryCategoryName": "Census & Voter Lists",
                    "primaryCategoryId": 35,
                    "publicationYear": "2010",
                    "sourceInfo": "First Census of the United States",
                    "isYearbook": false,
                    "canSaveImage": true
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = memory_storage();
    let mut existing = Collection::new("5058");
    existing.title = Some("1790 United States Federal Census".to_string());
    lock_storage(&storage)
        .unwrap()
        .upsert_collection(&existing)
        .unwrap();

    let collection = crawler(&server, storage.clone(), 8)
        .enrich("5058")
        .await
        .unwrap();
    assert_eq!(collection.database_name.as_deref(), Some("1790usfedcen"));

    let store = lock_storage(&storage).unwrap();
    let stored = store.get_collection("5058").unwrap().expect("collection").collection;
    assert_eq!(stored.title.as_deref(), Some("1790 United States Federal Census"));
    assert_eq!(stored.category_name.as_deref(), Some("Census & Voter Lists"));
    assert_eq!(stored.category_id.as_deref(), Some("35"));
    assert_eq!(stored.publication_year, Some(2010));
    assert_eq!(stored.is_yearbook, Some(false));
    assert_eq!(stored.can_save_image, Some(true));
    assert_eq!(
        stored.navigation_levels,
        Some(vec![
            "State".to_string(),
            "County".to_string(),
            "Township".to_string()
        ])
    );
    assert_eq!(store.count_collections().unwrap(), 1);
}

#[tokio::test]
async fn test_enrich_unknown_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let storage = memory_storage();
    let err = crawler(&server, storage.clone(), 8)
        .enrich("nope")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarvestError::Browse {
            source: BrowseError::NotFound(_),
            ..
        }
    ));
    assert_eq!(lock_storage(&storage).unwrap().count_collections().unwrap(), 0);
}
