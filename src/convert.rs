use std::fs;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::domain::{FileFormat, JobKey};
use crate::error::HarvestError;
use crate::flatten::flatten_collection;
use crate::storage::{StorageClient, list_exports};
use crate::table::{ColumnKind, serialize_parquet, to_seeded_record_batch};

const TABLE_EXTENSION: &str = "parquet";

// Tags the export stamps on every feature; present in every table so that an
// empty or property-less collection still converts to a readable file.
const TAG_COLUMNS: &[(&str, ColumnKind)] = &[
    ("month", ColumnKind::Int),
    ("variable", ColumnKind::Utf8),
    ("year", ColumnKind::Int),
];

/// Maps raw export object names onto the local output tree.
#[derive(Debug, Clone)]
pub struct LocalLayout {
    output_root: Utf8PathBuf,
    raw_prefix: String,
    local_prefix: String,
}

impl LocalLayout {
    pub fn new(output_root: Utf8PathBuf, raw_prefix: &str, local_prefix: &str) -> Self {
        Self {
            output_root,
            raw_prefix: raw_prefix.trim_matches('/').to_string(),
            local_prefix: local_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(output_root: Utf8PathBuf, config: &ResolvedConfig) -> Self {
        Self::new(output_root, &config.raw_prefix, &config.local_prefix)
    }

    pub fn raw_prefix(&self) -> &str {
        &self.raw_prefix
    }

    /// `raw_export/NDVI/NDVI_2015_01.geojson` → `<root>/local_raw/NDVI/NDVI_2015_01.geojson`
    pub fn record_path(&self, object_name: &str) -> Result<Utf8PathBuf, HarvestError> {
        let invalid = || HarvestError::InvalidObjectName(object_name.to_string());
        let relative = object_name
            .strip_prefix(self.raw_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(Utf8Path::new)
            .ok_or_else(invalid)?;
        // Only plain names may follow the prefix; `..` or a root would escape
        // the output tree.
        if !relative
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
        {
            return Err(invalid());
        }
        Ok(self.output_root.join(&self.local_prefix).join(relative))
    }

    pub fn table_path(&self, object_name: &str) -> Result<Utf8PathBuf, HarvestError> {
        Ok(self.record_path(object_name)?.with_extension(TABLE_EXTENSION))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    pub object: String,
    pub key: Option<JobKey>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub record_path: String,
    pub table_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConvertOutcome {
    /// Nothing under the raw prefix yet; exports may still be running.
    NoObjects { prefix: String },
    Converted { files: Vec<ConvertedFile> },
}

/// Flattens one fetched payload and writes the record file and the table file.
pub fn convert_payload(
    layout: &LocalLayout,
    object_name: &str,
    text: &str,
) -> Result<ConvertedFile, HarvestError> {
    let record_path = layout.record_path(object_name)?;
    let table_path = layout.table_path(object_name)?;

    let rows = flatten_collection(object_name, text)?;
    let records =
        serde_json::to_vec(&rows).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    write_bytes_atomic(&record_path, &records)?;

    let batch = to_seeded_record_batch(&rows, TAG_COLUMNS)?;
    let columns = batch
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<_>>();
    write_bytes_atomic(&table_path, &serialize_parquet(&batch)?)?;

    Ok(ConvertedFile {
        object: object_name.to_string(),
        key: JobKey::from_object_name(object_name).ok(),
        rows: rows.len(),
        columns,
        record_path: record_path.to_string(),
        table_path: table_path.to_string(),
    })
}

pub struct ConvertPipeline<'a, S: StorageClient + ?Sized> {
    storage: &'a S,
    layout: LocalLayout,
    format: FileFormat,
}

impl<'a, S: StorageClient + ?Sized> ConvertPipeline<'a, S> {
    pub fn new(storage: &'a S, layout: LocalLayout) -> Self {
        Self {
            storage,
            layout,
            format: FileFormat::GeoJson,
        }
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<ConvertOutcome, HarvestError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; checking storage".to_string(),
            elapsed: None,
        });
        let objects = list_exports(self.storage, self.layout.raw_prefix(), self.format.extension())?;
        if objects.is_empty() {
            sink.event(ProgressEvent {
                message: "phase=Resolve; no files found, export may still be running".to_string(),
                elapsed: None,
            });
            return Ok(ConvertOutcome::NoObjects {
                prefix: self.layout.raw_prefix().to_string(),
            });
        }
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; found {} files", objects.len()),
            elapsed: None,
        });

        let mut files = Vec::with_capacity(objects.len());
        for object in &objects {
            sink.event(ProgressEvent {
                message: format!("phase=Download; downloading {}", object.name),
                elapsed: None,
            });
            let start = std::time::Instant::now();
            let text = self.storage.fetch_text(&object.name)?;
            let converted = convert_payload(&self.layout, &object.name, &text)?;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Store; converted to {} ({} rows)",
                    converted.table_path, converted.rows
                ),
                elapsed: Some(start.elapsed()),
            });
            files.push(converted);
        }

        sink.event(ProgressEvent {
            message: format!("phase=Done; converted {} files", files.len()),
            elapsed: None,
        });
        Ok(ConvertOutcome::Converted { files })
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("no parent directory for {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".zonal-harvest")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    std::io::Write::write_all(&mut temp, content)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}
