use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::identity::IdentityStore;
use crate::services::schedule_analysis::ScheduleAnalyzer;
use crate::store::DocumentStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityStore>,
    redis: RedisHandle,
    analyzer: Arc<dyn ScheduleAnalyzer>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityStore>,
        redis: RedisHandle,
        analyzer: Arc<dyn ScheduleAnalyzer>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, identity, redis, analyzer }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub(crate) fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.inner.identity
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn analyzer(&self) -> &Arc<dyn ScheduleAnalyzer> {
        &self.inner.analyzer
    }

    pub(crate) fn transaction_attempts(&self) -> u32 {
        self.inner.settings.store().transaction_attempts
    }
}
