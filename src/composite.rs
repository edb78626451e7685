//! In-memory reference semantics for the per-pixel composites and zonal
//! reductions that export jobs ask the engine to compute.

use crate::domain::{Aggregation, Reducer};
use crate::error::HarvestError;

/// Single-band grid. `None` marks a masked pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<Option<f64>>,
}

impl Raster {
    pub fn new(width: usize, height: usize, pixels: Vec<Option<f64>>) -> Result<Self, HarvestError> {
        if pixels.len() != width * height {
            return Err(HarvestError::Raster(format!(
                "expected {} pixels for {width}x{height}, got {}",
                width * height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_values(width: usize, height: usize, values: &[f64]) -> Result<Self, HarvestError> {
        Self::new(width, height, values.iter().copied().map(Some).collect())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[Option<f64>] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels[y * self.width + x]
    }
}

/// Collapses a time series of frames into one raster. Masked pixels are
/// skipped; a pixel masked in every frame stays masked.
pub fn composite(aggregation: Aggregation, frames: &[Raster]) -> Result<Raster, HarvestError> {
    let first = frames
        .first()
        .ok_or_else(|| HarvestError::Raster("no frames in time window".to_string()))?;
    if let Some(frame) = frames
        .iter()
        .find(|frame| frame.width != first.width || frame.height != first.height)
    {
        return Err(HarvestError::Raster(format!(
            "frame shape {}x{} differs from {}x{}",
            frame.width, frame.height, first.width, first.height
        )));
    }

    let pixels = (0..first.pixels.len())
        .map(|index| {
            let series = frames.iter().filter_map(|frame| frame.pixels[index]);
            match aggregation {
                Aggregation::Mean => mean(series),
                Aggregation::Sum => sum(series),
                Aggregation::ThresholdCount => sum(series.map(|v| if v > 0.0 { 1.0 } else { 0.0 })),
            }
        })
        .collect();

    Raster::new(first.width, first.height, pixels)
}

/// Reduces the raster over each zone, given as pixel indices. Zones with no
/// unmasked pixel yield `None`.
pub fn reduce_zones(raster: &Raster, zones: &[Vec<usize>], reducer: Reducer) -> Vec<Option<f64>> {
    zones
        .iter()
        .map(|zone| {
            let values = zone
                .iter()
                .filter_map(|&index| raster.pixels.get(index).copied().flatten());
            match reducer {
                Reducer::Mean => mean(values),
                Reducer::Sum => sum(values),
            }
        })
        .collect()
}

fn sum(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));
    (count > 0).then(|| total / count as f64)
}
