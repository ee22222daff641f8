// HumanizeAI Core Services
// Text processing, configuration, provider access and the humanizer engine

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod humanizer;

pub use text_processor::*;
pub use config_store::*;
pub use providers::*;

pub use humanizer::{
    BackendError,
    ChatParaphraseBackend,
    GenerationBackend,
    HumanizeEngine,
    HumanizeError,
    LocalEntropyOracle,
    MetricsEngine,
    PerplexityOracle,
};
