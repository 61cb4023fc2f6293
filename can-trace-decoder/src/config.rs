//! Pipeline configuration types
//!
//! Everything the pipeline needs to know about a trace file and how to
//! aggregate it is passed in explicitly through `PipelineConfig`. Every field
//! has a default matching the common semicolon-separated exporter layout, so an
//! empty TOML/JSON section deserializes to a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase-to-DC current conversion factor
pub const DEFAULT_CURRENT_FACTOR: f64 = 0.866;
/// Motor rpm to vehicle speed (km/h) conversion factor
pub const DEFAULT_SPEED_FACTOR: f64 = 0.012551909;
/// Drivetrain efficiency in eco mode
pub const ECO_EFFICIENCY: f64 = 0.73;
/// Drivetrain efficiency in boost mode
pub const BOOST_EFFICIENCY: f64 = 0.92;

/// Configuration for one run of the decode/aggregate pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Where the trace fields live in each record
    #[serde(default)]
    pub columns: ColumnMapping,

    /// Physical layout of the trace file
    #[serde(default)]
    pub trace: TraceFormat,

    /// How merged signal columns are named
    #[serde(default)]
    pub naming: ColumnNaming,

    /// Separator between table name and signal name in prefixed columns
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Aggregation bucket width in milliseconds (default: one second)
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: u64,

    /// Per-column reducer choice
    #[serde(default)]
    pub reducers: ReducerPolicy,

    /// Derived quantities computed after aggregation (None disables them)
    #[serde(default = "default_derived")]
    pub derived: Option<DerivedConfig>,

    /// Normalize and decode rows on the rayon thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Maximum number of row errors kept verbatim in the batch report
    #[serde(default = "default_max_error_samples")]
    pub max_error_samples: usize,
}

fn default_true() -> bool {
    true
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_bucket_ms() -> u64 {
    1000
}

fn default_derived() -> Option<DerivedConfig> {
    Some(DerivedConfig::default())
}

fn default_max_error_samples() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            trace: TraceFormat::default(),
            naming: ColumnNaming::default(),
            separator: default_separator(),
            bucket_ms: default_bucket_ms(),
            reducers: ReducerPolicy::default(),
            derived: default_derived(),
            parallel: true,
            max_error_samples: default_max_error_samples(),
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the column mapping
    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    /// Builder method: set the trace file layout
    pub fn with_trace_format(mut self, trace: TraceFormat) -> Self {
        self.trace = trace;
        self
    }

    /// Builder method: set the column naming mode
    pub fn with_naming(mut self, naming: ColumnNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Builder method: set the bucket width
    pub fn with_bucket_ms(mut self, bucket_ms: u64) -> Self {
        self.bucket_ms = bucket_ms;
        self
    }

    /// Builder method: override the reducer for a column or bare signal name
    pub fn with_reducer(mut self, column: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.overrides.insert(column.into(), reducer);
        self
    }

    /// Builder method: set or disable derived quantities
    pub fn with_derived(mut self, derived: Option<DerivedConfig>) -> Self {
        self.derived = derived;
        self
    }

    /// Builder method: enable or disable parallel row processing
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Bucket width, never below one millisecond
    pub fn bucket_width_ms(&self) -> i64 {
        self.bucket_ms.max(1) as i64
    }
}

/// Reference to a trace column by header name or zero-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Position(usize),
    Name(String),
}

impl ColumnRef {
    pub fn name(name: impl Into<String>) -> Self {
        ColumnRef::Name(name.into())
    }
}

/// Mapping from trace fields to exporter columns
///
/// Exporters disagree on column names and order, so nothing is guessed:
/// the default is the positional layout `Index;Timestamp;Time;Type;Frame ID;Length;Data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub index: Option<ColumnRef>,
    #[serde(default)]
    pub timestamp: Option<ColumnRef>,
    pub frame_id: ColumnRef,
    #[serde(default)]
    pub length: Option<ColumnRef>,
    pub data: ColumnRef,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            index: Some(ColumnRef::Position(0)),
            timestamp: Some(ColumnRef::Position(2)),
            frame_id: ColumnRef::Position(4),
            length: Some(ColumnRef::Position(5)),
            data: ColumnRef::Position(6),
        }
    }
}

impl ColumnMapping {
    /// Mapping by header names; index and length are left unmapped
    pub fn by_name(
        timestamp: impl Into<String>,
        frame_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            index: None,
            timestamp: Some(ColumnRef::name(timestamp)),
            frame_id: ColumnRef::name(frame_id),
            length: None,
            data: ColumnRef::name(data),
        }
    }
}

/// Physical layout of a CSV trace export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFormat {
    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Metadata lines before the header row
    #[serde(default = "default_skip_rows")]
    pub skip_rows: usize,
    /// Whether a header row follows the metadata lines
    #[serde(default = "default_true")]
    pub has_headers: bool,
}

fn default_delimiter() -> char {
    ';'
}

fn default_skip_rows() -> usize {
    2
}

impl Default for TraceFormat {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            skip_rows: default_skip_rows(),
            has_headers: true,
        }
    }
}

/// How merged signal columns are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnNaming {
    /// Bare signal names with one table, `<table><sep><signal>` with several
    #[default]
    Auto,
    /// Always `<table><sep><signal>`
    Prefixed,
}

/// Reduction applied to one column within a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Max,
    Min,
    First,
    Last,
}

impl Reducer {
    /// Reduce the present values of a bucket; `None` when there are none
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        match self {
            Reducer::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Reducer::Max => values.iter().copied().reduce(f64::max),
            Reducer::Min => values.iter().copied().reduce(f64::min),
            Reducer::First => values.first().copied(),
            Reducer::Last => values.last().copied(),
        }
    }
}

/// Per-column reducer choice: a default plus explicit overrides
///
/// Override keys match either the full column name (`dbc2_Battery_Current`)
/// or the bare signal name (`Battery_Current`); the full name wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducerPolicy {
    #[serde(default = "default_reducer")]
    pub default: Reducer,
    #[serde(default)]
    pub overrides: BTreeMap<String, Reducer>,
}

fn default_reducer() -> Reducer {
    Reducer::Mean
}

impl Default for ReducerPolicy {
    fn default() -> Self {
        // Peak battery current/voltage matter more than their average
        let overrides = [
            ("Battery_Current".to_string(), Reducer::Max),
            ("Battery_Voltage".to_string(), Reducer::Max),
        ]
        .into_iter()
        .collect();

        Self {
            default: Reducer::Mean,
            overrides,
        }
    }
}

impl ReducerPolicy {
    /// Policy with no overrides
    pub fn uniform(default: Reducer) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Reducer for a column
    pub fn reducer_for(&self, column: &str, signal: &str) -> Reducer {
        self.overrides
            .get(column)
            .or_else(|| self.overrides.get(signal))
            .copied()
            .unwrap_or(self.default)
    }
}

/// Inputs and constants for derived quantities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedConfig {
    /// Motor phase current column (A)
    #[serde(default = "default_phase_current_column")]
    pub phase_current_column: String,
    /// Motor speed column (rpm)
    #[serde(default = "default_motor_speed_column")]
    pub motor_speed_column: String,
    /// Controller DC bus voltage column (V)
    #[serde(default = "default_dc_voltage_column")]
    pub dc_voltage_column: String,
    /// Battery current column (A)
    #[serde(default = "default_battery_current_column")]
    pub battery_current_column: String,
    /// Battery voltage column (V)
    #[serde(default = "default_battery_voltage_column")]
    pub battery_voltage_column: String,
    #[serde(default = "default_current_factor")]
    pub current_factor: f64,
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
}

fn default_phase_current_column() -> String {
    "dbc1_MC_PH_CURR".to_string()
}

fn default_motor_speed_column() -> String {
    "dbc1_MC_MOTOR_SPEED".to_string()
}

fn default_dc_voltage_column() -> String {
    "dbc1_MC_DC_VOLT".to_string()
}

fn default_battery_current_column() -> String {
    "dbc2_Battery_Current".to_string()
}

fn default_battery_voltage_column() -> String {
    "dbc2_Battery_Voltage".to_string()
}

fn default_current_factor() -> f64 {
    DEFAULT_CURRENT_FACTOR
}

fn default_speed_factor() -> f64 {
    DEFAULT_SPEED_FACTOR
}

fn default_efficiency() -> f64 {
    ECO_EFFICIENCY
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self {
            phase_current_column: default_phase_current_column(),
            motor_speed_column: default_motor_speed_column(),
            dc_voltage_column: default_dc_voltage_column(),
            battery_current_column: default_battery_current_column(),
            battery_voltage_column: default_battery_voltage_column(),
            current_factor: DEFAULT_CURRENT_FACTOR,
            speed_factor: DEFAULT_SPEED_FACTOR,
            efficiency: ECO_EFFICIENCY,
        }
    }
}

impl DerivedConfig {
    /// Default inputs with boost-mode efficiency
    pub fn boost() -> Self {
        Self {
            efficiency: BOOST_EFFICIENCY,
            ..Self::default()
        }
    }
}
