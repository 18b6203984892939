//! Shared test harness: a tempdir-backed store plus a scripted gateway.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use sync_server::gateway::mock::MockGateway;
use sync_server::{
    CatalogDownloadJob, DbService, JobHandle, JobOutcome, JobQueue, SyncConfig, SyncContext,
};

pub struct TestHarness {
    pub ctx: SyncContext,
    pub gateway: Arc<MockGateway>,
    pub queue: JobQueue,
    _work_dir: TempDir,
}

pub async fn harness() -> TestHarness {
    harness_with(|_| {}).await
}

pub async fn harness_with(tune: impl FnOnce(&mut SyncConfig)) -> TestHarness {
    let work_dir = TempDir::new().expect("tempdir");
    let mut config = SyncConfig::with_work_dir(work_dir.path().to_string_lossy().to_string());
    tune(&mut config);

    let db = DbService::new(&config.database_path).await.expect("db");
    let gateway = Arc::new(MockGateway::new());
    let ctx = SyncContext::new(db, gateway.clone(), Arc::new(config));

    TestHarness {
        ctx,
        gateway,
        queue: JobQueue::new(),
        _work_dir: work_dir,
    }
}

impl TestHarness {
    /// Enqueue one reconciliation pass and return its handle.
    pub fn start_sync(&self) -> JobHandle {
        self.queue
            .enqueue(Box::new(CatalogDownloadJob::new(self.ctx.clone())))
    }

    /// Run one reconciliation pass to completion.
    pub async fn run_sync(&self) -> JobOutcome {
        let mut handle = self.start_sync();
        handle.wait().await
    }

    /// Stub an empty product feed (count = 0).
    pub fn stub_no_products(&self) {
        self.gateway.stub("item/count", json!({"count": 0}));
    }
}

/// Category row as the ERP's `catalog/list` feed serializes it.
pub fn category_json(id: i64, parent: i64, name: &str) -> Value {
    json!({
        "idZvena": id.to_string(),
        "idParent": parent.to_string(),
        "nameZvena": name,
        "poryadok": "0",
        "opisanie": "",
        "link": shared::util::slugify(name),
        "ind1": "", "ind2": "", "ind3": "",
        "foto": ""
    })
}

/// Product row as the ERP's `item/list` feed serializes it.
pub fn item_json(id: i64, category: i64, name: &str, price: &str) -> Value {
    json!({
        "idTovar": id.to_string(),
        "vStrukture": category.to_string(),
        "name": name,
        "poryadok": "0",
        "opisanie": "",
        "opisanieDop": "",
        "link": shared::util::slugify(name),
        "artikul": format!("A-{id}"),
        "strihKod": "",
        "sebestomost": "0",
        "price": price,
        "opt_price": "0",
        "edIzmer": "шт.",
        "ves": "0",
        "strana": "",
        "proizv": "",
        "tags": "",
        "changeDate": "",
        "kolvo": "1",
        "ind1": "", "ind2": "", "ind3": "", "ind4": "", "ind5": "",
        "foto": ""
    })
}
