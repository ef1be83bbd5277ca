//! Evidence collectors.
//!
//! Each collector gathers one category of evidence for a run. Collectors
//! run concurrently and never see each other's output; a failure only costs
//! that collector's category.

pub mod knowledge;
pub mod logs;

use thiserror::Error;

use crate::evidence::{Evidence, Source};
use crate::pipeline::AnalysisRequest;
use crate::plan::Plan;

pub use self::knowledge::{KnowledgeBase, KnowledgeCollector};
pub use self::logs::{LogRecord, LogRecordCollector};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collector unavailable: {0}")]
    Unavailable(String),
    #[error("collector timed out after {0}s")]
    Timeout(u64),
    #[error("collector misconfigured: {0}")]
    Configuration(String),
    #[error("collector panicked: {0}")]
    Panicked(String),
    #[error("collector returned malformed data: {0}")]
    Malformed(String),
}

/// Read-only inputs shared by every collector of a run.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub request: AnalysisRequest,
    pub plan: Plan,
}

/// Trait for all evidence collectors
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Name used in the trace and error log.
    fn name(&self) -> &str;

    /// Primary category this collector produces.
    fn source(&self) -> Source;

    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError>;
}
