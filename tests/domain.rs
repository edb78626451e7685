use std::str::FromStr;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use zonal_harvest::composite::{Raster, composite, reduce_zones};
use zonal_harvest::domain::{Aggregation, JobKey, Reducer, TimeWindow};
use zonal_harvest::error::HarvestError;
use zonal_harvest::job::{JobBuilder, RegionCollection};
use zonal_harvest::registry;

fn builder() -> JobBuilder {
    JobBuilder::new(
        "raw_export",
        RegionCollection::new("projects/geo-analysis-472713/assets/json_provinces"),
    )
}

#[test]
fn window_is_half_open_month() {
    let window = TimeWindow::new(2016, 2).unwrap();
    assert_eq!(window.start(), NaiveDate::from_ymd_opt(2016, 2, 1).unwrap());
    assert_eq!(window.end(), NaiveDate::from_ymd_opt(2016, 3, 1).unwrap());
    assert_eq!(window.to_string(), "2016-02");
}

#[test]
fn object_name_round_trips_to_key() {
    let job = builder().build_named(2019, 7, "SoilMoisture").unwrap();
    assert_eq!(
        job.object_name(),
        "raw_export/SoilMoisture/SoilMoisture_2019_07.geojson"
    );
    let key = JobKey::from_object_name(&job.object_name()).unwrap();
    assert_eq!(key, job.key);
}

#[test]
fn object_name_with_bad_month_is_rejected() {
    assert_matches!(
        JobKey::from_object_name("raw_export/NDVI/NDVI_2015_13.geojson"),
        Err(HarvestError::InvalidObjectName(_))
    );
    assert_matches!(
        JobKey::from_object_name("raw_export/NDVI/readme.txt"),
        Err(HarvestError::InvalidObjectName(_))
    );
}

#[test]
fn key_parses_from_display_form() {
    let key = JobKey::from_str("Rainfall:2023-11").unwrap();
    assert_eq!(key.variable, "Rainfall");
    assert_eq!(key.window, TimeWindow::new(2023, 11).unwrap());
    assert_eq!(key.to_string(), "Rainfall:2023-11");
    assert_eq!(key.description(), "Rainfall_2023_11");
}

#[test]
fn registry_lists_five_variables_in_order() {
    let names = registry::all()
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["NDVI", "LST", "SoilMoisture", "Rainfall", "FireCount"]
    );
}

#[test]
fn zones_reduce_composited_pixels() {
    let frames = [
        Raster::from_values(2, 1, &[1.0, 4.0]).unwrap(),
        Raster::from_values(2, 1, &[3.0, 6.0]).unwrap(),
    ];
    let mean = composite(Aggregation::Mean, &frames).unwrap();
    let zones = vec![vec![0], vec![0, 1]];
    assert_eq!(
        reduce_zones(&mean, &zones, Reducer::Sum),
        vec![Some(2.0), Some(7.0)]
    );
}
