use std::io::Write;
use std::time::Duration;

use assert_matches::assert_matches;

use zonal_harvest::config::{Config, ConfigLoader, Credentials};
use zonal_harvest::error::HarvestError;

#[test]
fn config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"start_year": 2020, "end_year": 2021, "variables": ["Rainfall", "NDVI"], "cooldown_secs": 5}}"#
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(file.path().to_str()).unwrap();
    assert_eq!(resolved.start_year, 2020);
    assert_eq!(resolved.end_year, 2021);
    assert_eq!(resolved.cooldown, Duration::from_secs(5));
    assert_eq!(resolved.batch_size, 20);
    let names = resolved
        .variables
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["NDVI", "Rainfall"]);
    assert_eq!(resolved.job_count(), 48);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(HarvestError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(file.path().to_str()),
        Err(HarvestError::ConfigParse(_))
    );
}

#[test]
fn inverted_year_range_is_rejected() {
    let config = Config {
        start_year: Some(2024),
        end_year: Some(2015),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );
}

#[test]
fn unknown_variable_is_rejected() {
    let config = Config {
        variables: vec!["Snowfall".to_string()],
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::UnknownVariable(name)) if name == "Snowfall"
    );
}

#[test]
fn blank_prefix_is_rejected() {
    let config = Config {
        raw_prefix: Some(" / ".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );
}

#[test]
fn credentials_read_key_file() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    write!(
        key,
        r#"{{"type": "service_account", "client_email": "svc@geo.iam.gserviceaccount.com", "project_id": "geo-analysis"}}"#
    )
    .unwrap();
    let key_path = key.path().to_str().unwrap().to_string();

    let credentials = Credentials::from_lookup(|name| match name {
        "SERVICE_ACCOUNT" => Some("svc@geo.iam.gserviceaccount.com".to_string()),
        "GOOGLE_APPLICATION_CREDENTIALS" => Some(key_path.clone()),
        "GCS_BUCKET" => Some("geo-bucket".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(credentials.project_id, "geo-analysis");
    assert_eq!(credentials.bucket, "geo-bucket");
    assert!(credentials.access_token.is_none());
}

#[test]
fn blank_bucket_counts_as_missing() {
    let result = Credentials::from_lookup(|name| match name {
        "SERVICE_ACCOUNT" => Some("svc@geo.iam.gserviceaccount.com".to_string()),
        "GOOGLE_APPLICATION_CREDENTIALS" => Some("/nonexistent/key.json".to_string()),
        "GCS_BUCKET" => Some("   ".to_string()),
        _ => None,
    });
    assert_matches!(result, Err(HarvestError::MissingEnv("GCS_BUCKET")));
}

#[test]
fn unreadable_key_file_is_reported() {
    let result = Credentials::from_lookup(|name| match name {
        "SERVICE_ACCOUNT" => Some("svc@geo.iam.gserviceaccount.com".to_string()),
        "GOOGLE_APPLICATION_CREDENTIALS" => Some("/nonexistent/key.json".to_string()),
        "GCS_BUCKET" => Some("geo-bucket".to_string()),
        _ => None,
    });
    assert_matches!(result, Err(HarvestError::CredentialsRead(_)));
}
