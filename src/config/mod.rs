//! Configuration types, loaded from `config.toml` with serde defaults.

mod settings;

pub use settings::{
    AggregatorConfig, DispatcherConfig, ExecutorConfig, MergeEngineConfig, RiptideConfig,
    RulesConfig,
};
