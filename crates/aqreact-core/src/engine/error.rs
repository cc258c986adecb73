use std::path::PathBuf;
use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::config::model::ShapeInconsistency;
use crate::core::grid::GridError;
use crate::engine::commands::CommandLogError;
use crate::engine::script::ScriptError;

/// Errors surfaced by the engine layer and the workflows built on it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    CommandLog(#[from] CommandLogError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Shape(#[from] ShapeInconsistency),

    #[error("required external files are missing: {}", format_paths(.paths))]
    MissingExternalFiles { paths: Vec<PathBuf> },

    #[error("command log carries no initial-condition vector")]
    MissingInitialConditions,

    #[error("initial-condition vector has {found} entries, expected {expected}")]
    InitialConditionShape { expected: usize, found: usize },

    #[error("engine rejected command '{key}': {message}")]
    Engine { key: String, message: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}
