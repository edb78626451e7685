use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

static OBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)([A-Za-z][A-Za-z0-9]*)_(\d{4})_(\d{2})\.[A-Za-z]+$")
        .expect("object name pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    Mean,
    Sum,
    ThresholdCount,
}

impl Aggregation {
    /// Region reducer applied over the composite. Detection counts are always
    /// summed per region.
    pub fn region_reducer(self) -> Reducer {
        match self {
            Aggregation::Mean => Reducer::Mean,
            Aggregation::Sum | Aggregation::ThresholdCount => Reducer::Sum,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Sum => write!(f, "sum"),
            Aggregation::ThresholdCount => write!(f, "threshold-count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Sum,
}

impl Reducer {
    pub fn algorithm(self) -> &'static str {
        match self {
            Reducer::Mean => "Reducer.mean",
            Reducer::Sum => "Reducer.sum",
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Mean => write!(f, "mean"),
            Reducer::Sum => write!(f, "sum"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    GeoJson,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::GeoJson => "geojson",
        }
    }

    pub fn engine_name(self) -> &'static str {
        match self {
            FileFormat::GeoJson => "GEO_JSON",
        }
    }
}

/// One calendar month as the half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimeWindow {
    year: i32,
    month: u32,
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeWindow {
    pub fn new(year: i32, month: u32) -> Result<Self, HarvestError> {
        let invalid = || HarvestError::InvalidWindow { year, month };
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let end = start
            .checked_add_months(Months::new(1))
            .ok_or_else(invalid)?;
        Ok(Self {
            year,
            month,
            start,
            end,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub variable: String,
    pub window: TimeWindow,
}

impl JobKey {
    pub fn new(variable: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            variable: variable.into(),
            window,
        }
    }

    /// `NDVI_2015_01`
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{:02}",
            self.variable,
            self.window.year(),
            self.window.month()
        )
    }

    /// Task description as shown in the engine's task list, month unpadded.
    pub fn description(&self) -> String {
        format!(
            "{}_{}_{}",
            self.variable,
            self.window.year(),
            self.window.month()
        )
    }

    pub fn from_object_name(name: &str) -> Result<Self, HarvestError> {
        let caps = OBJECT_NAME
            .captures(name)
            .ok_or_else(|| HarvestError::InvalidObjectName(name.to_string()))?;
        let year = caps[2]
            .parse::<i32>()
            .map_err(|_| HarvestError::InvalidObjectName(name.to_string()))?;
        let month = caps[3]
            .parse::<u32>()
            .map_err(|_| HarvestError::InvalidObjectName(name.to_string()))?;
        let window = TimeWindow::new(year, month)
            .map_err(|_| HarvestError::InvalidObjectName(name.to_string()))?;
        Ok(Self::new(&caps[1], window))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.variable, self.window)
    }
}

impl FromStr for JobKey {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || HarvestError::InvalidObjectName(value.to_string());
        let (variable, window) = value.trim().split_once(':').ok_or_else(invalid)?;
        let (year, month) = window.split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        if variable.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(variable, TimeWindow::new(year, month)?))
    }
}
