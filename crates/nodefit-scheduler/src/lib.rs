//! Nodefit Scheduler - Resource fit filtering and scoring
//!
//! This crate provides:
//! - Pod request aggregation (init containers, sidecars, overhead)
//! - The resource fit filter with label-derived capability checks
//! - Least/most allocated and requested-to-capacity-ratio scoring
//! - Queueing hints deciding when a rejected pod should be retried
//! - A scheduling driver and requeue controller built on the plugin

pub mod config;
pub mod cycle_state;
pub mod error;
pub mod fit;
pub mod plugin;
pub mod requests;
pub mod requeue;
pub mod scheduler;
pub mod score;
pub mod snapshot;
pub mod types;

// Re-export commonly used types
pub use config::{FeatureGates, FitArgs, ScoringStrategyConfig, ScoringStrategyType};
pub use cycle_state::CycleState;
pub use error::{Result, SchedulerError};
pub use fit::{fits, fits_request, is_fit, InsufficientResource};
pub use plugin::Fit;
pub use scheduler::{Evaluation, ScheduleResult, Scheduler};
pub use score::{ResourceAllocationScorer, ScoringStrategy};
pub use snapshot::{NodeLister, Snapshot};
pub use types::{Code, FilterResult, QueueingHint, ScoreResult, Status};
