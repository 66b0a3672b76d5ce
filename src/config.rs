use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::model::{Direction, MetricSpec};
use crate::error::{Error, Result};

/// One comparison chart: which tag to draw, its axis label and output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub tag: String,
    pub label: String,
    pub file_name: String,
}

impl PlotSpec {
    fn new(tag: &str, label: &str, file_name: &str) -> Self {
        Self {
            tag: tag.to_string(),
            label: label.to_string(),
            file_name: file_name.to_string(),
        }
    }
}

/// Report settings. Every field falls back to the built-in defaults when
/// absent from a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Tags extracted when none are given on the command line.
    pub default_tags: Vec<String>,
    /// Metrics listed by the summary, in report order.
    pub metrics: Vec<MetricSpec>,
    /// Charts drawn by the comparison plot.
    pub plots: Vec<PlotSpec>,
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_tags: ["train_loss", "train_acc", "test_loss", "test_acc", "test_acc_top5"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            metrics: vec![
                MetricSpec::new("train_loss", "Training Loss", Direction::Min),
                MetricSpec::new("test_loss", "Test Loss", Direction::Min),
                MetricSpec::new("train_acc", "Training Accuracy", Direction::Max),
                MetricSpec::new("test_acc", "Test Accuracy", Direction::Max),
                MetricSpec::new("test_acc_top5", "Test Top-5 Accuracy", Direction::Max),
            ],
            plots: vec![
                PlotSpec::new("train_loss", "Training Loss", "training_loss_vs_epoch.png"),
                PlotSpec::new("train_acc", "Training Accuracy", "training_accuracy_vs_epoch.png"),
                PlotSpec::new("test_loss", "Test Loss", "test_loss_vs_epoch.png"),
                PlotSpec::new("test_acc", "Test Accuracy", "test_accuracy_vs_epoch.png"),
            ],
            plot_width: 700,
            plot_height: 400,
        }
    }
}

impl ReportConfig {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::not_found("config file", path));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Use `path` when given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.plot_width == 0 || self.plot_height == 0 {
            return Err(Error::InvalidArgument(format!(
                "plot size must be positive, got {}x{}",
                self.plot_width, self.plot_height
            )));
        }
        if self.default_tags.is_empty() {
            return Err(Error::InvalidArgument(
                "default_tags must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
