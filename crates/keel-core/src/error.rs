//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid installer spec: {message}")]
    InvalidSpec { message: String },

    #[error("Failed to parse installer spec: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid port number: {port}")]
    InvalidPort { port: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
