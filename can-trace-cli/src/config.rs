//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_trace_decoder::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Trace files to process
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Message tables, in namespace order
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    pub path: PathBuf,
    /// Column namespace; defaults to dbc1, dbc2, ... by position
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output directory (default: next to each trace file)
    pub dir: Option<PathBuf>,
    /// Text written for empty cells
    #[serde(default = "default_null_text")]
    pub null_text: String,
    /// Write per-row decoded records
    #[serde(default)]
    pub decoded: bool,
    /// Write the aggregated table
    #[serde(default = "default_true")]
    pub aggregated: bool,
}

fn default_null_text() -> String {
    "null".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            null_text: default_null_text(),
            decoded: false,
            aggregated: true,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_trace_decoder::{ColumnRef, Reducer};
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            files = ["drive_01.csv", "drive_02.csv"]
            tables = [
                { path = "motor_controller.dbc" },
                { path = "bms.json", name = "bms" },
            ]

            [pipeline]
            bucket_ms = 500
            naming = "prefixed"

            [pipeline.columns]
            timestamp = "Time"
            frame_id = "Frame ID"
            data = "Data"

            [pipeline.trace]
            delimiter = ","
            skip_rows = 0

            [pipeline.reducers]
            default = "mean"
            overrides = { MC_PH_CURR = "max" }

            [pipeline.derived]
            efficiency = 0.92

            [output]
            dir = "out"
            null_text = ""
            decoded = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.files.len(), 2);
        assert_eq!(config.input.tables[0].name, None);
        assert_eq!(config.input.tables[1].name.as_deref(), Some("bms"));

        let pipeline = &config.pipeline;
        assert_eq!(pipeline.bucket_ms, 500);
        assert_eq!(pipeline.columns.frame_id, ColumnRef::name("Frame ID"));
        assert_eq!(pipeline.trace.delimiter, ',');
        assert_eq!(pipeline.reducers.reducer_for("dbc1_MC_PH_CURR", "MC_PH_CURR"), Reducer::Max);

        let derived = pipeline.derived.as_ref().unwrap();
        assert_eq!(derived.efficiency, 0.92);
        assert_eq!(derived.motor_speed_column, "dbc1_MC_MOTOR_SPEED");

        assert_eq!(config.output.dir, Some(PathBuf::from("out")));
        assert_eq!(config.output.null_text, "");
        assert!(config.output.decoded);
        assert!(config.output.aggregated);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.input.files.is_empty());
        assert_eq!(config.pipeline.bucket_ms, 1000);
        assert_eq!(config.output.null_text, "null");
        assert!(!config.output.decoded);
    }

    #[test]
    fn test_load_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[input\nfiles = 3").unwrap();
        file.flush().unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{}", err).contains("Failed to parse config file"));
    }
}
