use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::Credentials;
use crate::error::HarvestError;
use crate::expression::export_request;
use crate::job::ExportJob;

pub const DEFAULT_ENGINE_URL: &str = "https://earthengine.googleapis.com/v1";

/// Starts an export and returns the engine's task handle without waiting for
/// the export to finish.
pub trait EngineClient: Send + Sync {
    fn start_export(&self, job: &ExportJob) -> Result<String, HarvestError>;
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
}

#[derive(Clone)]
pub struct EarthEngineHttpClient {
    client: Client,
    base_url: String,
    project: String,
    bucket: String,
}

impl EarthEngineHttpClient {
    pub fn new(credentials: &Credentials) -> Result<Self, HarvestError> {
        Self::with_base_url(credentials, DEFAULT_ENGINE_URL)
    }

    pub fn with_base_url(credentials: &Credentials, base_url: &str) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .default_headers(default_headers(credentials)?)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HarvestError::EngineHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: credentials.project_id.clone(),
            bucket: credentials.bucket.clone(),
        })
    }

    fn export_url(&self) -> String {
        format!("{}/projects/{}/table:export", self.base_url, self.project)
    }
}

impl EngineClient for EarthEngineHttpClient {
    fn start_export(&self, job: &ExportJob) -> Result<String, HarvestError> {
        let body = export_request(job, &self.bucket);
        tracing::debug!(description = %job.description(), "engine.request");
        let response = self
            .client
            .post(self.export_url())
            .json(&body)
            .send()
            .map_err(|err| HarvestError::EngineHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Earth Engine request failed".to_string());
            return Err(HarvestError::EngineStatus { status, message });
        }
        let operation: Operation = response
            .json()
            .map_err(|err| HarvestError::EngineHttp(err.to_string()))?;
        Ok(operation.name)
    }
}

/// Header set shared by the engine and storage clients.
pub(crate) fn default_headers(credentials: &Credentials) -> Result<HeaderMap, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("zonal-harvest/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?,
    );
    if let Some(token) = &credentials.access_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Accepts every job without contacting the engine, keeping the submitted
/// object names in order.
#[derive(Debug, Default)]
pub struct DryRunEngine {
    submitted: Mutex<Vec<String>>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl EngineClient for DryRunEngine {
    fn start_export(&self, job: &ExportJob) -> Result<String, HarvestError> {
        let mut guard = self
            .submitted
            .lock()
            .map_err(|_| HarvestError::EngineHttp("dry-run recorder poisoned".to_string()))?;
        guard.push(job.object_name());
        Ok(format!("dry-run/{}", job.description()))
    }
}
