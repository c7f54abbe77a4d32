//! Robust residual statistics over correlated ground control points.
//!
//! Points are filtered on correlation and the tool's outlier flag, converted
//! to pixel units, then refined by repeatedly discarding points further than
//! `k` standard deviations from the mean on either axis. CEP90 and the
//! absolute means are taken over the final inlier set.
//!
//! Empty sets propagate as NaN rather than errors.

use crate::config::StatisticsConfig;
use crate::types::{
    clean_name, round_to, AbsoluteResidualSummary, CorrelationPoint, GqaError, GqaResult,
    Residual, XyStat,
};
use ndarray::{Array1, Axis, Zip};

/// Mean and sample standard deviation of the x/y residuals of a point set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStatistics {
    pub mean: XyStat,
    pub stddev: XyStat,
}

/// Output of the statistics engine
#[derive(Debug, Clone, PartialEq)]
pub struct GqaStatistics {
    pub final_gcp_count: usize,
    pub residual: Residual,
    /// Inlier count before refinement followed by the count after each iteration
    pub inlier_counts: Vec<usize>,
}

impl GqaStatistics {
    /// All-NaN statistics for an empty point set
    pub fn degenerate(iterations: usize) -> Self {
        Self {
            final_gcp_count: 0,
            residual: Residual::nan(),
            inlier_counts: vec![0; iterations + 1],
        }
    }
}

/// Pixel-unit residuals of the accepted points, one array per axis
#[derive(Debug, Clone, PartialEq)]
struct PixelResiduals {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl PixelResiduals {
    fn len(&self) -> usize {
        self.x.len()
    }

    fn radial(&self) -> Array1<f64> {
        Zip::from(&self.x)
            .and(&self.y)
            .map_collect(|x, y| (x * x + y * y).sqrt())
    }

    fn statistics(&self) -> AxisStatistics {
        AxisStatistics {
            mean: XyStat::new(mean(&self.x), mean(&self.y)),
            stddev: XyStat::new(sample_stddev(&self.x), sample_stddev(&self.y)),
        }
    }

    /// Keep points within `k` standard deviations of the mean on both axes
    fn refine(&self, current: &AxisStatistics, k: f64) -> Self {
        let keep: Vec<usize> = self
            .x
            .iter()
            .zip(self.y.iter())
            .enumerate()
            .filter(|(_, (x, y))| {
                (*x - current.mean.x).abs() < k * current.stddev.x
                    && (*y - current.mean.y).abs() < k * current.stddev.y
            })
            .map(|(i, _)| i)
            .collect();

        Self {
            x: self.x.select(Axis(0), &keep),
            y: self.y.select(Axis(0), &keep),
        }
    }
}

fn mean(values: &Array1<f64>) -> f64 {
    values.mean().unwrap_or(f64::NAN)
}

/// Sample standard deviation (ddof = 1); NaN below two values
fn sample_stddev(values: &Array1<f64>) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    values.std(1.0)
}

/// Quantile with linear interpolation between order statistics; NaN when empty
pub fn quantile(values: &Array1<f64>, q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

/// Absolute residual rows keyed by their trailing label token (`x`/`y`)
fn absolute_residuals(table: &AbsoluteResidualSummary) -> GqaResult<XyStat> {
    let lookup = |axis: &str| {
        table
            .iter()
            .find(|(label, _)| clean_name(label).rsplit('_').next() == Some(axis))
            .map(|(_, value)| *value)
            .ok_or_else(|| {
                GqaError::Parse(format!("absolute residual table has no '{}' row", axis))
            })
    };
    Ok(XyStat::new(lookup("x")?, lookup("y")?))
}

/// Compute GQA statistics for a parsed point table.
///
/// `resolution` is the unsigned (x, y) reference pixel size used to convert
/// residuals to pixels.
pub fn calculate_gqa(
    points: &[CorrelationPoint],
    absolute: &AbsoluteResidualSummary,
    resolution: (f64, f64),
    config: &StatisticsConfig,
) -> GqaResult<GqaStatistics> {
    let (xres, yres) = resolution;
    if xres == 0.0 || yres == 0.0 || !xres.is_finite() || !yres.is_finite() {
        return Err(GqaError::InvalidInput(format!(
            "invalid reference resolution ({}, {})",
            xres, yres
        )));
    }

    let accepted: Vec<&CorrelationPoint> = points
        .iter()
        .filter(|p| p.correlation > config.correlation_coefficient && p.outlier == 1)
        .collect();
    let mut subset = PixelResiduals {
        x: accepted.iter().map(|p| p.x_residual / xres).collect(),
        y: accepted.iter().map(|p| p.y_residual / yres).collect(),
    };

    log::info!(
        "{} of {} points pass correlation > {} and outlier filter",
        subset.len(),
        points.len(),
        config.correlation_coefficient
    );

    if subset.x.is_empty() {
        log::warn!("No points left after filtering; statistics are NaN");
        return Ok(GqaStatistics::degenerate(config.iterations));
    }

    let original = subset.statistics();
    let mut current = original;
    let mut inlier_counts = vec![subset.len()];

    for iteration in 0..config.iterations {
        subset = subset.refine(&current, config.standard_deviations);
        current = subset.statistics();
        inlier_counts.push(subset.len());
        log::debug!("Iteration {}: {} inliers", iteration + 1, subset.len());
    }

    let cep90 = quantile(&subset.radial(), 0.9);
    let abs_mean = XyStat::new(mean(&subset.x.mapv(f64::abs)), mean(&subset.y.mapv(f64::abs)));
    let abs = absolute_residuals(absolute)?;

    let places = config.decimal_places;
    Ok(GqaStatistics {
        final_gcp_count: subset.len(),
        residual: Residual {
            mean: original.mean.rounded(places),
            stddev: original.stddev.rounded(places),
            iterative_mean: current.mean.rounded(places),
            iterative_stddev: current.stddev.rounded(places),
            abs_iterative_mean: abs_mean.rounded(places),
            abs: abs.rounded(places),
            cep90: round_to(cep90, places),
        },
        inlier_counts,
    })
}
