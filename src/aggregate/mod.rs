//! Result aggregation over settled waves.

mod aggregator;

pub use aggregator::{
    assess_conflict_severity, suggest_resolution, AggregationMetrics, AggregationWarning,
    ConsolidatedAggregation, FileConflict, ResultAggregator, TaskSummary, WarningKind,
    WaveAggregation,
};
