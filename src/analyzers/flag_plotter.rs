use crate::error::{ProcessingError, Result};
use crate::models::{is_accepted_flag, Observation, PartitionDataset, Profile};
use crate::utils::constants::{PLOTS_DIR, PLOT_EXTENSION};
use crate::writers::{DatasetWriter, OBSERVATION_VARIABLES, PROFILE_VARIABLES};
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

const PLOT_SIZE: (u32, u32) = (1024, 768);

fn plot_error(e: impl std::fmt::Display) -> ProcessingError {
    ProcessingError::Plot(e.to_string())
}

/// Scatter plots of one persisted variable against another, optionally
/// restricted to samples whose quality flag is accepted.
pub struct FlagPlotter {
    dataset: PartitionDataset,
    output_dir: PathBuf,
}

impl FlagPlotter {
    pub fn new(dataset: PartitionDataset, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset,
            output_dir: output_dir.into(),
        }
    }

    /// Load a partition file; plots go next to it unless `output_dir` is given.
    pub fn open(path: &Path, output_dir: Option<&Path>) -> Result<Self> {
        let dataset = DatasetWriter::new(".").read_dataset(path)?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Ok(Self::new(dataset, output_dir))
    }

    pub fn dataset(&self) -> &PartitionDataset {
        &self.dataset
    }

    /// Raw values of a profile- or observation-indexed variable.
    pub fn variable(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let profile = |f: fn(&Profile) -> Option<f64>| -> Vec<Option<f64>> {
            self.dataset.profiles.iter().map(f).collect()
        };
        let observation = |f: fn(&Observation) -> Option<f64>| -> Vec<Option<f64>> {
            self.dataset.observations.iter().map(f).collect()
        };

        Ok(match name {
            "lat" => profile(|p| Some(p.lat)),
            "lon" => profile(|p| Some(p.lon)),
            "timestamp" => profile(|p| Some(p.timestamp as f64)),
            "shallowest_depth" => profile(|p| p.shallowest_depth),
            "deepest_depth" => profile(|p| Some(p.deepest_depth)),
            "depth" => observation(|o| o.depth),
            "press" => observation(|o| o.press),
            "temp" => observation(|o| o.temp),
            "psal" => observation(|o| o.psal),
            _ => {
                return Err(ProcessingError::Plot(format!(
                    "Unknown variable '{}', expected one of {:?} or {:?}",
                    name, PROFILE_VARIABLES, OBSERVATION_VARIABLES
                )))
            }
        })
    }

    /// The `<name>_flag` array, if the variable has one.
    pub fn flags(&self, name: &str) -> Option<Vec<Option<u8>>> {
        let flag: fn(&Observation) -> Option<u8> = match name {
            "depth" => |o| o.depth_flag,
            "press" => |o| o.press_flag,
            "temp" => |o| o.temp_flag,
            "psal" => |o| o.psal_flag,
            _ => return None,
        };
        Some(self.dataset.observations.iter().map(flag).collect())
    }

    /// Values to plot; in clean mode samples with a rejected flag become missing.
    pub fn series(&self, name: &str, clean: bool) -> Result<Vec<Option<f64>>> {
        let values = self.variable(name)?;
        if !clean {
            return Ok(values);
        }
        Ok(match self.flags(name) {
            Some(flags) => values
                .into_iter()
                .zip(flags)
                .map(|(value, flag)| value.filter(|_| is_accepted_flag(flag)))
                .collect(),
            None => values,
        })
    }

    pub fn plot_path(&self, var1: &str, var2: &str, clean: bool) -> PathBuf {
        let suffix = if clean { "_clean" } else { "" };
        self.output_dir
            .join(PLOTS_DIR)
            .join(format!("{}_{}{}.{}", var1, var2, suffix, PLOT_EXTENSION))
    }

    /// Render `var2` against `var1` with the y axis pointing down.
    pub fn plot(&self, var1: &str, var2: &str, clean: bool) -> Result<PathBuf> {
        let xs = self.series(var1, clean)?;
        let ys = self.series(var2, clean)?;
        if xs.len() != ys.len() {
            return Err(ProcessingError::Plot(format!(
                "{} has {} values but {} has {}",
                var1,
                xs.len(),
                var2,
                ys.len()
            )));
        }

        let points: Vec<(f64, f64)> = xs
            .into_iter()
            .zip(ys)
            .filter_map(|(x, y)| Some((x?, y?)))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();

        let path = self.plot_path(var1, var2, clean);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let title = if clean {
            format!("{} x {} clean", var1, var2)
        } else {
            format!("{} x {}", var1, var2)
        };

        // the backend borrows `path` until it is dropped
        {
            let root = SVGBackend::new(&path, PLOT_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(&title, ("sans-serif", 24).into_font())
                .margin(20)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(
                    axis_range(points.iter().map(|&(x, _)| x)),
                    axis_range(points.iter().map(|&(_, y)| -y)),
                )
                .map_err(plot_error)?;

            chart
                .configure_mesh()
                .x_desc(var1)
                .y_desc(var2)
                .y_label_formatter(&|v| format!("{:.1}", -v))
                .draw()
                .map_err(plot_error)?;

            chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y)| Circle::new((x, -y), 2, BLUE.filled())),
                )
                .map_err(plot_error)?;

            root.present().map_err(plot_error)?;
        }

        info!(points = points.len(), "Wrote {}", path.display());
        Ok(path)
    }
}

fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if !min.is_finite() || !max.is_finite() {
        0.0..1.0
    } else if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        min..max
    }
}
