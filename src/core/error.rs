use thiserror::Error;

use crate::engine::ExecutionError;
use crate::module::LoadError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Module load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
