// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Fit Bands
//!
//! Robust bands drawn around the per-attempt predictions for charting:
//!
//! - the distance band follows the identity line (projected = actual) shifted
//!   by the median residual;
//! - the cost band is flat at the median split cost.
//!
//! Two movement bands describe the intensity table against distance: the
//! movement intensity itself and the work bias (leg work over arm work on
//! the opening split). Both are flat at their median.
//!
//! Half-widths start at a scaled median absolute deviation and widen until
//! the target share of points is covered.

use serde::Serialize;
use tracing::{info, warn};

use super::fitter::median_sorted;
use crate::config::BandSettings;
use crate::models::positive;

/// One (x, y) observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPoint {
    pub x: f64,
    pub y: f64,
}

impl BandPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandSample {
    pub x: f64,
    pub center: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMetadata {
    pub slope: f64,
    pub intercept: f64,
    pub coverage_ratio: f64,
    pub source_points: usize,
    pub widenings: usize,
    pub x_min: f64,
    pub x_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    DistanceFit,
    DistanceCost,
    MovementIntensity,
    WorkBias,
}

impl BandKind {
    pub fn key(&self) -> &'static str {
        match self {
            BandKind::DistanceFit => "distance_fit",
            BandKind::DistanceCost => "distance_cost",
            BandKind::MovementIntensity => "movement_intensity",
            BandKind::WorkBias => "work_bias",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitBand {
    pub kind: BandKind,
    pub band_width: f64,
    pub samples: Vec<BandSample>,
    pub metadata: BandMetadata,
}

/// Observations for every band of a dataset
#[derive(Debug, Clone, Default)]
pub struct BandInputs {
    /// (actual distance, projected distance)
    pub distance_fit: Vec<BandPoint>,
    /// (actual distance, split cost)
    pub distance_cost: Vec<BandPoint>,
    /// (athlete distance, movement intensity)
    pub movement_intensity: Vec<BandPoint>,
    /// (athlete distance, leg/arm work ratio)
    pub work_bias: Vec<BandPoint>,
}

/// Bands of one dataset; a band is absent when it had too few points
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FitBands {
    pub distance_fit: Option<FitBand>,
    pub distance_cost: Option<FitBand>,
    pub movement_intensity: Option<FitBand>,
    pub work_bias: Option<FitBand>,
}

#[derive(Debug, Clone, Default)]
pub struct BandBuilder {
    settings: BandSettings,
}

/// Shape of a flat band
struct FlatShape {
    kind: BandKind,
    min_half_width: f64,
    max_widenings: usize,
    /// Extend the sampled domain past the largest x
    padded: bool,
}

impl BandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &BandSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Band around projected distance against actual distance
    pub fn distance_band(&self, points: &[BandPoint]) -> Option<FitBand> {
        let points = self.enough(BandKind::DistanceFit, points)?;

        let residuals: Vec<f64> = points.iter().map(|point| point.y - point.x).collect();
        let shift = median(&residuals)?;
        let deviations: Vec<f64> = residuals.iter().map(|r| (r - shift).abs()).collect();
        let initial = (median(&deviations)? * self.settings.mad_scale).max(self.settings.min_distance_half_width);

        let (half_width, coverage, widenings) =
            self.widen(&residuals, shift, initial, self.settings.max_widenings);
        let xs: Vec<f64> = points.iter().map(|point| point.x).collect();
        let (domain, x_min, x_max) = self.domain(&xs, true);

        info!(
            band.kind = BandKind::DistanceFit.key(),
            band.shift = shift,
            band.width = half_width * 2.0,
            band.coverage = coverage,
            band.points = points.len(),
            "Distance band built"
        );

        Some(FitBand {
            kind: BandKind::DistanceFit,
            band_width: half_width * 2.0,
            samples: domain.iter().map(|&x| sample(x, x + shift, half_width)).collect(),
            metadata: BandMetadata {
                slope: 1.0,
                intercept: shift,
                coverage_ratio: coverage,
                source_points: points.len(),
                widenings,
                x_min,
                x_max,
            },
        })
    }

    /// Flat band around the median split cost
    pub fn cost_band(&self, points: &[BandPoint]) -> Option<FitBand> {
        self.flat_band(
            FlatShape {
                kind: BandKind::DistanceCost,
                min_half_width: self.settings.min_cost_half_width,
                max_widenings: self.settings.max_widenings,
                padded: true,
            },
            points,
        )
    }

    /// Flat band around the median movement intensity
    pub fn movement_intensity_band(&self, points: &[BandPoint]) -> Option<FitBand> {
        self.flat_band(self.movement_shape(BandKind::MovementIntensity), points)
    }

    /// Flat band around the median leg/arm work ratio
    pub fn work_bias_band(&self, points: &[BandPoint]) -> Option<FitBand> {
        self.flat_band(self.movement_shape(BandKind::WorkBias), points)
    }

    pub fn build(&self, inputs: &BandInputs) -> FitBands {
        FitBands {
            distance_fit: self.distance_band(&inputs.distance_fit),
            distance_cost: self.cost_band(&inputs.distance_cost),
            movement_intensity: self.movement_intensity_band(&inputs.movement_intensity),
            work_bias: self.work_bias_band(&inputs.work_bias),
        }
    }

    fn movement_shape(&self, kind: BandKind) -> FlatShape {
        FlatShape {
            kind,
            min_half_width: self.settings.min_movement_half_width,
            max_widenings: self.settings.movement_max_widenings,
            padded: false,
        }
    }

    fn flat_band(&self, shape: FlatShape, points: &[BandPoint]) -> Option<FitBand> {
        let points = self.enough(shape.kind, points)?;

        let values: Vec<f64> = points.iter().map(|point| point.y).collect();
        let center = median(&values)?;
        let residuals: Vec<f64> = values.iter().map(|value| value - center).collect();
        let deviations: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let initial = (median(&deviations)? * self.settings.mad_scale).max(shape.min_half_width);

        let (half_width, coverage, widenings) = self.widen(&residuals, 0.0, initial, shape.max_widenings);
        let xs: Vec<f64> = points.iter().map(|point| point.x).collect();
        let (domain, x_min, x_max) = self.domain(&xs, shape.padded);

        info!(
            band.kind = shape.kind.key(),
            band.center = center,
            band.width = half_width * 2.0,
            band.coverage = coverage,
            band.points = points.len(),
            "Flat band built"
        );

        Some(FitBand {
            kind: shape.kind,
            band_width: half_width * 2.0,
            samples: domain.iter().map(|&x| sample(x, center, half_width)).collect(),
            metadata: BandMetadata {
                slope: 0.0,
                intercept: center,
                coverage_ratio: coverage,
                source_points: points.len(),
                widenings,
                x_min,
                x_max,
            },
        })
    }

    /// Usable points, or `None` when there are fewer than the configured minimum
    fn enough(&self, kind: BandKind, points: &[BandPoint]) -> Option<Vec<BandPoint>> {
        let points = usable(points);
        if points.len() < self.settings.min_points {
            warn!(
                band.kind = kind.key(),
                band.points = points.len(),
                band.required = self.settings.min_points,
                "Insufficient points for band"
            );
            return None;
        }
        Some(points)
    }

    fn widen(&self, residuals: &[f64], center: f64, initial: f64, max_widenings: usize) -> (f64, f64, usize) {
        let mut half_width = initial;
        let mut coverage = coverage_of(residuals, center, half_width);
        let mut widenings = 0;
        while coverage < self.settings.coverage_target && widenings < max_widenings {
            half_width *= self.settings.widen_factor;
            coverage = coverage_of(residuals, center, half_width);
            widenings += 1;
        }
        (half_width, coverage, widenings)
    }

    /// Evenly spaced x values from the smallest point to the largest
    ///
    /// A padded domain runs a little past the largest point. An unpadded
    /// domain over a single x collapses to its two end points.
    fn domain(&self, xs: &[f64], padded: bool) -> (Vec<f64>, f64, f64) {
        let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min_x.is_finite() || !max_x.is_finite() {
            return (Vec::new(), 0.0, 0.0);
        }
        let start = min_x;
        let end = if padded {
            let span = (max_x - min_x).max(1.0);
            max_x + (span * 0.1).max(10.0)
        } else {
            max_x
        };
        if end - start <= f64::EPSILON * end.abs().max(1.0) {
            return (vec![start, end], start, end);
        }
        let count = self.settings.sample_count.max(1);
        let step = (end - start) / (count.saturating_sub(1).max(1)) as f64;
        let domain = (0..count).map(|index| start + step * index as f64).collect();
        (domain, start, end)
    }
}

fn usable(points: &[BandPoint]) -> Vec<BandPoint> {
    points
        .iter()
        .copied()
        .filter(|point| positive(point.x) && positive(point.y))
        .collect()
}

fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_sorted(&sorted)
}

/// Share of residuals within `half_width` of `center`
fn coverage_of(residuals: &[f64], center: f64, half_width: f64) -> f64 {
    if residuals.is_empty() || half_width <= 0.0 {
        return 0.0;
    }
    let inside = residuals
        .iter()
        .filter(|residual| (*residual - center).abs() <= half_width)
        .count();
    inside as f64 / residuals.len() as f64
}

fn sample(x: f64, center: f64, half_width: f64) -> BandSample {
    let (lower, upper) = {
        let lower = center - half_width;
        let upper = center + half_width;
        if lower > upper {
            (upper, lower)
        } else {
            (lower, upper)
        }
    };
    BandSample {
        x,
        center,
        lower: lower.max(0.0),
        upper: upper.max(0.0),
    }
}
