use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("failed to read credentials file at {0}")]
    CredentialsRead(PathBuf),

    #[error("failed to parse credentials file: {0}")]
    CredentialsParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid time window {year}-{month:02}")]
    InvalidWindow { year: i32, month: u32 },

    #[error("invalid raster: {0}")]
    Raster(String),

    #[error("invalid export object name: {0}")]
    InvalidObjectName(String),

    #[error("Earth Engine request failed: {0}")]
    EngineHttp(String),

    #[error("Earth Engine returned status {status}: {message}")]
    EngineStatus { status: u16, message: String },

    #[error("Cloud Storage request failed: {0}")]
    StorageHttp(String),

    #[error("Cloud Storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("malformed feature collection {name}: {message}")]
    FeatureCollection { name: String, message: String },

    #[error("columnar write failed: {0}")]
    Table(String),

    #[error("{0} export submissions were rejected")]
    RejectedSubmissions(usize),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
