use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::engine::default_headers;
use crate::error::HarvestError;

pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com/storage/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub name: String,
    pub size: Option<u64>,
}

pub trait StorageClient: Send + Sync {
    /// Every object under `prefix`, across all listing pages.
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, HarvestError>;
    fn fetch_text(&self, name: &str) -> Result<String, HarvestError>;
}

/// Objects under `<prefix>/` whose name ends in `.<extension>`; directory
/// markers and unrelated files are skipped.
pub fn list_exports<S: StorageClient + ?Sized>(
    client: &S,
    prefix: &str,
    extension: &str,
) -> Result<Vec<RemoteObject>, HarvestError> {
    let prefix = format!("{}/", prefix.trim_end_matches('/'));
    let suffix = format!(".{extension}");
    let mut objects = client
        .list(&prefix)?
        .into_iter()
        .filter(|object| !object.name.ends_with('/') && object.name.ends_with(&suffix))
        .collect::<Vec<_>>();
    objects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(objects)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Clone)]
pub struct GcsHttpClient {
    client: Client,
    base_url: String,
    bucket: String,
}

impl GcsHttpClient {
    pub fn new(credentials: &Credentials) -> Result<Self, HarvestError> {
        Self::with_base_url(credentials, DEFAULT_STORAGE_URL)
    }

    pub fn with_base_url(credentials: &Credentials, base_url: &str) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .default_headers(default_headers(credentials)?)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HarvestError::StorageHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: credentials.bucket.clone(),
        })
    }

    fn objects_url(&self, object: Option<&str>) -> Result<Url, HarvestError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| HarvestError::StorageHttp(err.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HarvestError::StorageHttp(format!("bad base url {}", self.base_url)))?;
            segments.pop_if_empty().extend(["b", self.bucket.as_str(), "o"]);
            if let Some(object) = object {
                segments.push(object);
            }
        }
        Ok(url)
    }

    fn send(&self, url: Url) -> Result<reqwest::blocking::Response, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HarvestError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Cloud Storage request failed".to_string());
            return Err(HarvestError::StorageStatus { status, message });
        }
        Ok(response)
    }
}

impl StorageClient for GcsHttpClient {
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, HarvestError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.objects_url(None)?;
            url.query_pairs_mut().append_pair("prefix", prefix);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: ObjectList = self
                .send(url)?
                .json()
                .map_err(|err| HarvestError::StorageHttp(err.to_string()))?;
            objects.extend(page.items.into_iter().map(|item| RemoteObject {
                size: item.size.and_then(|size| size.parse().ok()),
                name: item.name,
            }));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(prefix, count = objects.len(), "storage.list");
        Ok(objects)
    }

    fn fetch_text(&self, name: &str) -> Result<String, HarvestError> {
        let mut url = self.objects_url(Some(name))?;
        url.query_pairs_mut().append_pair("alt", "media");
        self.send(url)?
            .text()
            .map_err(|err| HarvestError::StorageHttp(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedListing(Vec<&'static str>);

    impl StorageClient for FixedListing {
        fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, HarvestError> {
            Ok(self
                .0
                .iter()
                .filter(|name| name.starts_with(prefix))
                .map(|name| RemoteObject {
                    name: name.to_string(),
                    size: None,
                })
                .collect())
        }

        fn fetch_text(&self, name: &str) -> Result<String, HarvestError> {
            Err(HarvestError::StorageHttp(format!("not fetched: {name}")))
        }
    }

    #[test]
    fn listing_keeps_only_raw_exports() {
        let storage = FixedListing(vec![
            "raw_export/",
            "raw_export/NDVI/",
            "raw_export/NDVI/NDVI_2015_02.geojson",
            "raw_export/NDVI/NDVI_2015_01.geojson",
            "raw_export/NDVI/NDVI_2015_01.json",
            "raw_export_old/LST/LST_2015_01.geojson",
        ]);
        let names = list_exports(&storage, "raw_export", "geojson")
            .unwrap()
            .into_iter()
            .map(|object| object.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "raw_export/NDVI/NDVI_2015_01.geojson",
                "raw_export/NDVI/NDVI_2015_02.geojson",
            ]
        );
    }

    #[test]
    fn media_url_escapes_object_name() {
        let credentials = Credentials {
            service_account: "svc@example.iam.gserviceaccount.com".to_string(),
            key_file: "key.json".into(),
            project_id: "geo-analysis".to_string(),
            bucket: "geo-bucket".to_string(),
            access_token: None,
        };
        let client = GcsHttpClient::with_base_url(&credentials, "http://localhost:9/storage/v1").unwrap();
        let url = client
            .objects_url(Some("raw_export/NDVI/NDVI_2015_01.geojson"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9/storage/v1/b/geo-bucket/o/raw_export%2FNDVI%2FNDVI_2015_01.geojson"
        );
    }
}
