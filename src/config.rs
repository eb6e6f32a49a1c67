//! Configuration management and validation.
//!
//! Provides the run configuration: where the schema document and parameters
//! live, which years and statistics to compute, and how samples are located
//! in the source table. Every field has a default, so a YAML file only needs
//! to name what it changes.

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DURATION_COLUMN, DEFAULT_FROM_YEAR,
    DEFAULT_PARAMETER_PREFIX, DEFAULT_SCHEMA_PATH, DEFAULT_TIMESTAMP_COLUMN, DEFAULT_TIMEZONE,
};
use crate::database::Identifier;
use crate::database::mysql::Timeouts;
use crate::error::{CommuteError, Result};
use crate::processor::statistics::StatName;
use chrono_tz::Tz;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Supported compression algorithms for Parquet export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    #[default]
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Main configuration for a statistics run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Hierarchical prefix all parameters live under
    pub parameter_prefix: String,

    /// Schema document path
    pub schema_path: PathBuf,

    /// First year enumerated; the last is the current year
    pub from_year: i32,

    /// IANA time zone samples are grouped in
    pub timezone: String,

    /// Source column holding the UTC sample timestamp
    pub timestamp_column: String,

    /// Source column holding the duration sample
    pub duration_column: String,

    /// Statistics computed per group
    pub statistics: Vec<String>,

    pub connect_timeout_secs: u64,

    /// Read/write timeout for the connection, unset to wait indefinitely
    pub io_timeout_secs: Option<u64>,

    /// Upsert records at the end of the run
    pub write_enabled: bool,

    /// Compression for `--export`
    pub export_compression: CompressionAlgorithm,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parameter_prefix: DEFAULT_PARAMETER_PREFIX.to_string(),
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            from_year: DEFAULT_FROM_YEAR,
            timezone: DEFAULT_TIMEZONE.to_string(),
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            duration_column: DEFAULT_DURATION_COLUMN.to_string(),
            statistics: StatName::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            io_timeout_secs: None,
            write_enabled: true,
            export_compression: CompressionAlgorithm::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CommuteError::configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| {
            CommuteError::configuration(format!("malformed config {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Create configuration with a custom parameter prefix
    pub fn with_parameter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.parameter_prefix = prefix.into();
        self
    }

    /// Create configuration with a custom schema document path
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    /// Create configuration with a custom first year
    pub fn with_from_year(mut self, year: i32) -> Self {
        self.from_year = year;
        self
    }

    /// Create configuration with a custom grouping time zone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Create configuration with a narrowed statistics battery
    pub fn with_statistics<I, S>(mut self, statistics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statistics = statistics.into_iter().map(Into::into).collect();
        self
    }

    /// Compute statistics without writing them
    pub fn without_writes(mut self) -> Self {
        self.write_enabled = false;
        self
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse().map_err(|_| {
            CommuteError::configuration(format!("unknown time zone '{}'", self.timezone))
        })
    }

    /// The configured battery, in declaration order without duplicates
    pub fn statistics(&self) -> Result<Vec<StatName>> {
        let mut battery = Vec::with_capacity(self.statistics.len());
        for name in &self.statistics {
            let stat: StatName = name
                .parse()
                .map_err(|e| CommuteError::configuration(format!("{e}")))?;
            if !battery.contains(&stat) {
                battery.push(stat);
            }
        }
        Ok(battery)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            io: self.io_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.parameter_prefix.is_empty() || !self.parameter_prefix.starts_with('/') {
            return Err(CommuteError::configuration(format!(
                "parameter prefix '{}' must start with '/'",
                self.parameter_prefix
            )));
        }
        if self.from_year < 1970 {
            return Err(CommuteError::configuration(format!(
                "from_year {} is before 1970",
                self.from_year
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(CommuteError::configuration(
                "connect_timeout_secs must be greater than 0",
            ));
        }
        self.timezone()?;
        Identifier::new(&self.timestamp_column)?;
        Identifier::new(&self.duration_column)?;
        if self.statistics()?.is_empty() {
            return Err(CommuteError::configuration(
                "at least one statistic must be configured",
            ));
        }
        Ok(())
    }
}
