use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::Deserialize;

use crate::{
    aggregate::{AggregateOptions, TrendPeriod},
    dataset::ScoreRange,
};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_DATASET: &str = "patients.csv";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to the certificate file.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Deserialize)]
pub struct DatasetSettings {
    pub path: PathBuf,
    pub score_min: f64,
    pub score_max: f64,
}

impl DatasetSettings {
    pub(crate) fn score_range(&self) -> ScoreRange {
        ScoreRange {
            min: self.score_min,
            max: self.score_max,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardSettings {
    pub trend_period: TrendPeriod,
    pub histogram_bins: usize,
}

impl DashboardSettings {
    pub(crate) fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            trend_period: self.trend_period,
            histogram_bins: self.histogram_bins,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub dataset: DatasetSettings,
    pub dashboard: DashboardSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    ///
    /// Without a file, the defaults alone are used.
    pub fn from_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = AggregateOptions::default();
        let score_range = ScoreRange::default();
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("dataset.path", DEFAULT_DATASET)?
            .set_default("dataset.score_min", score_range.min)?
            .set_default("dataset.score_max", score_range.max)?
            .set_default("dashboard.trend_period", "month")?
            .set_default(
                "dashboard.histogram_bins",
                i64::try_from(defaults.histogram_bins).unwrap_or(i64::MAX),
            )?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let range = self.dataset.score_range();
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(ConfigError::Message(format!(
                "invalid score range {}..={}",
                range.min, range.max
            )));
        }
        if self.dashboard.histogram_bins == 0 {
            return Err(ConfigError::Message(
                "histogram_bins must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_without_file() {
        let settings = Settings::from_file(None).unwrap();
        assert_eq!(settings.web.address, DEFAULT_ADDR.parse().unwrap());
        assert_eq!(settings.dataset.path, PathBuf::from(DEFAULT_DATASET));
        assert_eq!(settings.dataset.score_range(), ScoreRange::default());
        assert_eq!(
            settings.dashboard.aggregate_options(),
            AggregateOptions::default()
        );
    }

    #[test]
    fn file_overrides_defaults() {
        let (_dir, path) = write(
            r#"
            [web]
            address = "0.0.0.0:9000"

            [dataset]
            path = "data/hospital.csv"
            score_min = 1
            score_max = 5

            [dashboard]
            trend_period = "week"
            "#,
        );
        let settings = Settings::from_file(Some(&path)).unwrap();
        assert_eq!(settings.web.address, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(settings.dataset.path, PathBuf::from("data/hospital.csv"));
        assert_eq!(
            settings.dataset.score_range(),
            ScoreRange { min: 1.0, max: 5.0 }
        );
        assert_eq!(settings.dashboard.trend_period, TrendPeriod::Week);
        assert_eq!(settings.dashboard.histogram_bins, 20);
    }

    #[test]
    fn rejects_inverted_score_range() {
        let (_dir, path) = write(
            r"
            [dataset]
            score_min = 10
            score_max = 1
            ",
        );
        assert!(Settings::from_file(Some(&path)).is_err());
    }

    #[test]
    fn rejects_zero_histogram_bins() {
        let (_dir, path) = write(
            r"
            [dashboard]
            histogram_bins = 0
            ",
        );
        let err = Settings::from_file(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("histogram_bins"));
    }

    #[test]
    fn rejects_bad_address() {
        let (_dir, path) = write(
            r#"
            [web]
            address = "localhost"
            "#,
        );
        assert!(Settings::from_file(Some(&path)).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::from_file(Some(&path)).is_err());
    }
}
