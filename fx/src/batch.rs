//! Batch conversion with bounded concurrency.

use std::sync::Arc;

use fxgate_common::ConversionError;
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use crate::conversion::{ConversionRequest, ConversionResult};
use crate::engine::ConversionEngine;

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Largest accepted batch.
    pub max_batch_size: usize,
    /// Conversions in flight at once.
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            concurrency: 16,
        }
    }
}

/// Outcome of one item in a batch.
pub type ItemOutcome = Result<ConversionResult, ConversionError>;

/// Runs many conversions, keeping input order and isolating failures.
pub struct BatchCoordinator {
    engine: Arc<ConversionEngine>,
    config: BatchConfig,
}

impl BatchCoordinator {
    /// Create a new coordinator.
    pub fn new(engine: Arc<ConversionEngine>, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    /// Batch configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Convert every request. Output position `i` answers input position `i`.
    ///
    /// Only an oversized batch fails as a whole.
    #[instrument(skip(self, requests), fields(size = requests.len()))]
    pub async fn convert_batch(
        &self,
        requests: Vec<ConversionRequest>,
    ) -> Result<Vec<ItemOutcome>, ConversionError> {
        if requests.len() > self.config.max_batch_size {
            warn!(max = self.config.max_batch_size, "Batch rejected");
            return Err(ConversionError::BatchTooLarge {
                size: requests.len(),
                max: self.config.max_batch_size,
            });
        }

        let engine = &self.engine;
        let outcomes: Vec<ItemOutcome> = stream::iter(requests)
            .map(|request| async move { engine.convert(&request).await })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!(
            succeeded = outcomes.len() - failed,
            failed,
            "Batch completed"
        );

        Ok(outcomes)
    }
}
