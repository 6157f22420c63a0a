//! API shared state

use std::sync::Arc;

use crate::aggregator::MetricsAggregator;
use crate::lifecycle::AlertEngine;
use crate::storage::AlertStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The lifecycle engine performing every alert mutation
    pub engine: Arc<AlertEngine>,

    /// Aggregator for metric summaries in the stats endpoint
    pub aggregator: Arc<MetricsAggregator>,

    /// Direct store handle for health checks
    pub store: Arc<dyn AlertStore>,

    /// Retention used by the cleanup endpoint when no days are given
    pub default_retention_days: u32,
}

impl ApiState {
    pub fn new(
        engine: Arc<AlertEngine>,
        aggregator: Arc<MetricsAggregator>,
        store: Arc<dyn AlertStore>,
        default_retention_days: u32,
    ) -> Self {
        Self {
            engine,
            aggregator,
            store,
            default_retention_days,
        }
    }
}
