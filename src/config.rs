use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::registry::{self, VariableSpec};

pub const DEFAULT_CONFIG_FILE: &str = "zonal-harvest.json";
pub const DEFAULT_REGION_ASSET: &str = "projects/geo-analysis-472713/assets/json_provinces";

pub const ENV_SERVICE_ACCOUNT: &str = "SERVICE_ACCOUNT";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_BUCKET: &str = "GCS_BUCKET";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub raw_prefix: Option<String>,
    #[serde(default)]
    pub local_prefix: Option<String>,
    #[serde(default)]
    pub region_asset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub start_year: i32,
    pub end_year: i32,
    pub variables: Vec<&'static VariableSpec>,
    pub batch_size: usize,
    pub cooldown: Duration,
    pub raw_prefix: String,
    pub local_prefix: String,
    pub region_asset: String,
}

impl ResolvedConfig {
    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.start_year..=self.end_year
    }

    pub fn months(&self) -> impl Iterator<Item = u32> + '_ {
        1..=12u32
    }

    pub fn job_count(&self) -> usize {
        let years = (self.end_year - self.start_year + 1) as usize;
        self.variables.len() * years * 12
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        Self::resolve_config(Self::load(path)?)
    }

    /// Reads the run configuration without validating it. A missing default
    /// file yields an empty config; a missing explicit path is an error.
    pub fn load(path: Option<&str>) -> Result<Config, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| HarvestError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let start_year = config.start_year.unwrap_or(2015);
        let end_year = config.end_year.unwrap_or(2024);
        if end_year < start_year {
            return Err(HarvestError::InvalidConfig(format!(
                "end_year {end_year} is before start_year {start_year}"
            )));
        }

        let batch_size = config.batch_size.unwrap_or(20);
        if batch_size == 0 {
            return Err(HarvestError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let variables = registry::select(&config.variables)?;

        Ok(ResolvedConfig {
            schema_version,
            start_year,
            end_year,
            variables,
            batch_size,
            cooldown: Duration::from_secs(config.cooldown_secs.unwrap_or(25)),
            raw_prefix: non_empty(config.raw_prefix, "raw_export", "raw_prefix")?,
            local_prefix: non_empty(config.local_prefix, "local_raw", "local_prefix")?,
            region_asset: non_empty(config.region_asset, DEFAULT_REGION_ASSET, "region_asset")?,
        })
    }
}

fn non_empty(value: Option<String>, default: &str, field: &str) -> Result<String, HarvestError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(HarvestError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    project_id: String,
}

/// Environment-provided identity and target bucket, read once at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub service_account: String,
    pub key_file: PathBuf,
    pub project_id: String,
    pub bucket: String,
    pub access_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, HarvestError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(HarvestError::MissingEnv(name))
        };
        let service_account = required(ENV_SERVICE_ACCOUNT)?;
        let key_file = PathBuf::from(required(ENV_CREDENTIALS)?);
        let bucket = required(ENV_BUCKET)?;
        let access_token = lookup(ENV_ACCESS_TOKEN)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let content = fs::read_to_string(&key_file)
            .map_err(|_| HarvestError::CredentialsRead(key_file.clone()))?;
        let key: ServiceAccountKey = serde_json::from_str(&content)
            .map_err(|err| HarvestError::CredentialsParse(err.to_string()))?;
        if key.client_email != service_account {
            tracing::warn!(
                service_account = %service_account,
                key_email = %key.client_email,
                "service account does not match the key file"
            );
        }

        Ok(Self {
            service_account,
            key_file,
            project_id: key.project_id,
            bucket,
            access_token,
        })
    }
}
