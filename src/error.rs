use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FitError>;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule error ({rule_id}): {message}")]
    Rule { rule_id: String, message: String },

    #[error("Host description error: {0}")]
    HostDescription(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FitError {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Shorthand used by rules that cannot form a judgment because of a defect.
    pub fn rule(rule_id: &str, message: impl Into<String>) -> Self {
        Self::Rule {
            rule_id: rule_id.to_string(),
            message: message.into(),
        }
    }
}
