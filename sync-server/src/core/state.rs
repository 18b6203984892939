//! Shared engine state
//!
//! One value wiring the store, gateway, configuration, event bus and
//! notifier together; every sync job is constructed from a clone of this.

use std::sync::Arc;

use crate::core::config::SyncConfig;
use crate::core::events::EventBus;
use crate::core::notifier::{LogNotifier, Notifier};
use crate::db::repository::{
    AttributeRepository, CategoryRepository, MediaRepository, OrderRepository, ProductRepository,
};
use crate::db::DbService;
use crate::gateway::ErpGateway;

#[derive(Clone)]
pub struct SyncContext {
    pub db: DbService,
    pub gateway: Arc<dyn ErpGateway>,
    pub config: Arc<SyncConfig>,
    pub bus: EventBus,
    pub notifier: Arc<dyn Notifier>,
}

impl SyncContext {
    pub fn new(db: DbService, gateway: Arc<dyn ErpGateway>, config: Arc<SyncConfig>) -> Self {
        Self {
            db,
            gateway,
            config,
            bus: EventBus::new(),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.db.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.db.pool.clone())
    }

    pub fn attributes(&self) -> AttributeRepository {
        AttributeRepository::new(self.db.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.db.pool.clone())
    }

    pub fn media(&self) -> MediaRepository {
        MediaRepository::new(self.db.pool.clone())
    }
}
