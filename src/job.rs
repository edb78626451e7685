use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{Aggregation, FileFormat, JobKey, Reducer, TimeWindow};
use crate::error::HarvestError;
use crate::registry::{self, VariableSpec};

/// Reference to the externally hosted region polygons. Cloned into every job,
/// never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCollection(Arc<str>);

impl RegionCollection {
    pub fn new(asset_id: &str) -> Self {
        Self(Arc::from(asset_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for RegionCollection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl fmt::Display for RegionCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source images filtered to the window with a single band selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSelection {
    pub collection_id: String,
    pub band: String,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RasterPlan {
    pub source: SourceSelection,
    pub composite: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordTags {
    pub year: i32,
    pub month: u32,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportJob {
    pub key: JobKey,
    pub raster: RasterPlan,
    pub regions: RegionCollection,
    pub reducer: Reducer,
    pub scale: u32,
    pub tags: RecordTags,
    /// Object path without extension; the engine appends the format's extension.
    pub file_prefix: String,
    pub format: FileFormat,
}

impl ExportJob {
    pub fn description(&self) -> String {
        self.key.description()
    }

    pub fn object_name(&self) -> String {
        format!("{}.{}", self.file_prefix, self.format.extension())
    }
}

#[derive(Debug, Clone)]
pub struct JobBuilder {
    raw_prefix: String,
    regions: RegionCollection,
    format: FileFormat,
}

impl JobBuilder {
    pub fn new(raw_prefix: &str, regions: RegionCollection) -> Self {
        Self {
            raw_prefix: raw_prefix.trim_matches('/').to_string(),
            regions,
            format: FileFormat::GeoJson,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(&config.raw_prefix, RegionCollection::new(&config.region_asset))
    }

    pub fn build(
        &self,
        year: i32,
        month: u32,
        spec: &VariableSpec,
    ) -> Result<ExportJob, HarvestError> {
        let window = TimeWindow::new(year, month)?;
        let key = JobKey::new(spec.name, window);
        let file_prefix = format!("{}/{}/{}", self.raw_prefix, spec.name, key.file_stem());

        Ok(ExportJob {
            raster: RasterPlan {
                source: SourceSelection {
                    collection_id: spec.collection_id.to_string(),
                    band: spec.band.to_string(),
                    window,
                },
                composite: spec.aggregation,
            },
            regions: self.regions.clone(),
            reducer: spec.aggregation.region_reducer(),
            scale: spec.scale,
            tags: RecordTags {
                year,
                month,
                variable: spec.name.to_string(),
            },
            file_prefix,
            format: self.format,
            key,
        })
    }

    pub fn build_named(&self, year: i32, month: u32, name: &str) -> Result<ExportJob, HarvestError> {
        self.build(year, month, registry::lookup(name)?)
    }
}

/// Every (variable, year, month) key in submission order.
pub fn plan_keys(config: &ResolvedConfig) -> Result<Vec<JobKey>, HarvestError> {
    let mut keys = Vec::with_capacity(config.job_count());
    for spec in &config.variables {
        for year in config.years() {
            for month in config.months() {
                keys.push(JobKey::new(spec.name, TimeWindow::new(year, month)?));
            }
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;
    use crate::config::{Config, ConfigLoader};

    fn builder() -> JobBuilder {
        JobBuilder::new("raw_export", RegionCollection::new("projects/p/assets/regions"))
    }

    #[test]
    fn output_path_layout() {
        let job = builder().build_named(2015, 1, "NDVI").unwrap();
        assert_eq!(job.file_prefix, "raw_export/NDVI/NDVI_2015_01");
        assert_eq!(job.object_name(), "raw_export/NDVI/NDVI_2015_01.geojson");
        assert_eq!(job.description(), "NDVI_2015_1");
    }

    #[test]
    fn fire_count_always_sums_regions() {
        let job = builder().build_named(2020, 8, "FireCount").unwrap();
        assert_eq!(job.raster.composite, Aggregation::ThresholdCount);
        assert_eq!(job.reducer, Reducer::Sum);
        assert_eq!(job.scale, 1000);
    }

    #[test]
    fn tags_match_key() {
        let job = builder().build_named(2018, 12, "Rainfall").unwrap();
        assert_eq!(job.tags.year, 2018);
        assert_eq!(job.tags.month, 12);
        assert_eq!(job.tags.variable, "Rainfall");
        assert_eq!(job.raster.source.window.end().to_string(), "2019-01-01");
    }

    #[test]
    fn unknown_variable_fails_build() {
        assert_matches!(
            builder().build_named(2018, 1, "Humidity"),
            Err(HarvestError::UnknownVariable(_))
        );
    }

    #[test]
    fn full_product_paths_are_unique() {
        let config = ConfigLoader::resolve_config(Config::default()).unwrap();
        let builder = JobBuilder::from_config(&config);
        let mut paths = HashSet::new();
        for key in plan_keys(&config).unwrap() {
            let job = builder
                .build_named(key.window.year(), key.window.month(), &key.variable)
                .unwrap();
            assert!(paths.insert(job.object_name()));
        }
        assert_eq!(paths.len(), 600);
    }
}
