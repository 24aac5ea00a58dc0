use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found. Looked for:\n\
        - current directory: stackforge.local.yaml, stackforge.yaml\n\
        - ./.stackforge/stackforge.yaml\n\
        - ~/.config/stackforge/stackforge.yaml\n\
        A path can also be given with STACKFORGE_CONFIG or --config"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
