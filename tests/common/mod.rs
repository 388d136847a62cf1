//! Shared test harness: a tempfile-backed pool plus an in-process beacon.
#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use timevault::beacon::testing::TestBeacon;
use timevault::db::{self, DbPool};
use timevault::services::items::CreateItemRequest;
use timevault::services::ItemService;

pub struct TestApp {
    pub pool: DbPool,
    pub beacon: Arc<TestBeacon>,
    pub service: ItemService<TestBeacon>,
    _dir: TempDir,
}

pub fn spawn(seed: &[u8]) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("timevault-test.db");
    let pool = db::create_pool(db_path.to_str().expect("utf-8 path")).expect("pool");
    db::init_schema(&mut pool.get().expect("conn")).expect("schema");

    let beacon = Arc::new(TestBeacon::new(seed));
    let service = ItemService::new(pool.clone(), beacon.clone());

    TestApp {
        pool,
        beacon,
        service,
        _dir: dir,
    }
}

pub fn text_item(content: &str, duration_minutes: i64) -> CreateItemRequest {
    CreateItemRequest {
        kind: "text".to_string(),
        content: content.to_string(),
        duration_minutes: Some(duration_minutes),
        decrypt_at: None,
        metadata: None,
    }
}

pub fn text_item_at(content: &str, decrypt_at: i64) -> CreateItemRequest {
    CreateItemRequest {
        kind: "text".to_string(),
        content: content.to_string(),
        duration_minutes: None,
        decrypt_at: Some(decrypt_at),
        metadata: None,
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
