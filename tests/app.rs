use std::sync::Mutex;

use camino::Utf8PathBuf;

use zonal_harvest::app::{App, ProgressEvent, ProgressSink};
use zonal_harvest::config::{Config, ConfigLoader};
use zonal_harvest::convert::ConvertOutcome;
use zonal_harvest::domain::Aggregation;
use zonal_harvest::engine::DryRunEngine;
use zonal_harvest::error::HarvestError;
use zonal_harvest::storage::{RemoteObject, StorageClient};
use zonal_harvest::throttle::Unthrottled;

#[derive(Default)]
struct EmptyStorage {
    listed: Mutex<Vec<String>>,
}

impl StorageClient for EmptyStorage {
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, HarvestError> {
        self.listed.lock().unwrap().push(prefix.to_string());
        Ok(Vec::new())
    }

    fn fetch_text(&self, name: &str) -> Result<String, HarvestError> {
        Err(HarvestError::StorageHttp(format!("unexpected fetch of {name}")))
    }
}

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for CollectingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn app() -> App<DryRunEngine, EmptyStorage> {
    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    App::new(config, DryRunEngine::new(), EmptyStorage::default())
}

#[test]
fn plan_lists_full_product_in_submission_order() {
    let result = app().plan().unwrap();
    assert_eq!(result.jobs.len(), 600);

    let first = &result.jobs[0];
    assert_eq!(first.description, "NDVI_2015_1");
    assert_eq!(first.object_name, "raw_export/NDVI/NDVI_2015_01.geojson");

    let last = result.jobs.last().unwrap();
    assert_eq!(last.key.variable, "FireCount");
    assert_eq!(last.composite, Aggregation::ThresholdCount);
    assert_eq!(last.band, "FireMask");
}

#[test]
fn dry_run_export_records_every_job() {
    let app = app();
    let sink = CollectingSink::default();
    let report = app.export(&mut Unthrottled, &sink).unwrap();

    assert_eq!(report.started(), 600);
    assert!(report.pauses.is_empty());
    assert_eq!(app.engine().submitted().len(), 600);

    let messages = sink.messages.lock().unwrap();
    assert!(messages[0].contains("starting 600 exports"));
    assert!(messages.last().unwrap().contains("600 tasks submitted"));
}

#[test]
fn convert_with_nothing_exported_reports_no_objects() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let sink = CollectingSink::default();

    let outcome = app().convert(root, &sink).unwrap();

    assert!(matches!(outcome, ConvertOutcome::NoObjects { .. }));
    assert!(
        sink.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.contains("export may still be running"))
    );
}

#[test]
fn variables_come_from_registry() {
    let result = app().variables();
    assert_eq!(result.variables.len(), 5);
    assert_eq!(result.variables[3].name, "Rainfall");
}
