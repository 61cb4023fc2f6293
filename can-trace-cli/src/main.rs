//! CAN Trace Decoder CLI Application
//!
//! Command-line front end for the can-trace-decoder library. It adds:
//! - Configuration file loading (TOML) with command-line overrides
//! - Batch processing of several trace files in parallel
//! - CSV output of aggregated and per-row decoded values
//! - A console summary per file

use anyhow::{bail, Context, Result};
use can_trace_decoder::config::{BOOST_EFFICIENCY, ECO_EFFICIENCY};
use can_trace_decoder::{Decoder, PipelineConfig};
use clap::Parser;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

mod config;
mod output;
mod report;

use config::{AppConfig, OutputConfig};

/// CAN Trace Decoder - Decode, merge and aggregate CAN trace exports
#[derive(Parser, Debug)]
#[command(name = "can-trace-cli")]
#[command(about = "Decode CSV CAN traces against DBC/JSON tables and aggregate per second", long_about = None)]
#[command(version)]
struct Args {
    /// Trace file(s) to process (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    trace: Vec<PathBuf>,

    /// DBC file(s), namespaced dbc1, dbc2, ... in order (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// JSON table file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    table: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory (default: next to each trace file)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Also write per-row decoded records
    #[arg(long)]
    decoded: bool,

    /// Do not write the aggregated table
    #[arg(long)]
    no_aggregate: bool,

    /// Do not compute derived quantities
    #[arg(long)]
    no_derived: bool,

    /// Drive mode used for the power efficiency
    #[arg(long, value_enum)]
    mode: Option<DriveMode>,

    /// Field delimiter of the trace files
    #[arg(long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Metadata lines before the header row
    #[arg(long, value_name = "COUNT")]
    skip_rows: Option<usize>,

    /// Aggregation bucket width in milliseconds
    #[arg(long, value_name = "MS")]
    bucket_ms: Option<u64>,

    /// Text written for empty cells
    #[arg(long, value_name = "TEXT")]
    null_text: Option<String>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DriveMode {
    Eco,
    Boost,
}

impl DriveMode {
    fn efficiency(self) -> f64 {
        match self {
            DriveMode::Eco => ECO_EFFICIENCY,
            DriveMode::Boost => BOOST_EFFICIENCY,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Trace Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_trace_decoder::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let config = apply_overrides(config, &args);

    let decoder = load_tables(&config, &args)?;
    if !decoder.has_tables() {
        bail!("No message table loaded; pass --dbc, --table or list tables in the config file");
    }
    if !args.quiet {
        print!("{}", report::render_tables(&decoder.table_stats()));
    }

    let traces = unique_traces(config.input.files.iter().chain(&args.trace));
    if traces.is_empty() {
        bail!("No trace file given; pass --trace or list files in the config file");
    }

    if let Some(dir) = &config.output.dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    }

    let bases = output::output_bases(&traces, config.output.dir.as_deref());

    // Each file is independent; one failure never stops the others
    let results: Vec<(PathBuf, Result<String>)> = traces
        .par_iter()
        .zip(bases.par_iter())
        .map(|(path, base)| {
            let result = process_file(path, base, &decoder, &config.pipeline, &config.output);
            (path.clone(), result)
        })
        .collect();

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(summary) => {
                if !args.quiet {
                    print!("{}", summary);
                }
            }
            Err(e) => {
                failed += 1;
                log::error!("{}: {:#}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} trace files failed", failed, results.len());
    }

    Ok(())
}

/// Command-line flags take precedence over the configuration file
fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    let pipeline = &mut config.pipeline;

    if let Some(delimiter) = args.delimiter {
        pipeline.trace.delimiter = delimiter;
    }
    if let Some(skip_rows) = args.skip_rows {
        pipeline.trace.skip_rows = skip_rows;
    }
    if let Some(bucket_ms) = args.bucket_ms {
        pipeline.bucket_ms = bucket_ms;
    }
    if args.no_derived {
        pipeline.derived = None;
    }
    if let (Some(mode), Some(derived)) = (args.mode, pipeline.derived.as_mut()) {
        derived.efficiency = mode.efficiency();
    }

    if let Some(dir) = &args.output_dir {
        config.output.dir = Some(dir.clone());
    }
    if let Some(null_text) = &args.null_text {
        config.output.null_text = null_text.clone();
    }
    if args.decoded {
        config.output.decoded = true;
    }
    if args.no_aggregate {
        config.output.aggregated = false;
    }

    config
}

/// Trace files in input order, each listed once
fn unique_traces<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut traces = Vec::new();
    for path in paths {
        if seen.insert(path) {
            traces.push(path.clone());
        } else {
            log::warn!("Trace {:?} given more than once, processing it once", path);
        }
    }
    traces
}

/// Load configured tables first, then the ones given on the command line
fn load_tables(config: &AppConfig, args: &Args) -> Result<Decoder> {
    let mut decoder = Decoder::new();

    for table in &config.input.tables {
        decoder
            .load_table_file(&table.path, table.name.as_deref())
            .with_context(|| format!("Failed to load table {:?}", table.path))?;
    }
    for path in &args.dbc {
        decoder
            .add_dbc(path)
            .with_context(|| format!("Failed to load DBC {:?}", path))?;
    }
    for path in &args.table {
        decoder
            .add_json(path)
            .with_context(|| format!("Failed to load table {:?}", path))?;
    }

    Ok(decoder)
}

/// Decode one trace file, write its outputs next to `base` and return its summary
fn process_file(
    path: &Path,
    base: &Path,
    decoder: &Decoder,
    pipeline: &PipelineConfig,
    settings: &OutputConfig,
) -> Result<String> {
    let result = decoder
        .decode_trace_file(path, pipeline)
        .with_context(|| format!("Failed to decode {:?}", path))?;

    if settings.aggregated {
        let target = output::output_path(base, "aggregated");
        output::write_aggregated_file(&target, &result.aggregated, &settings.null_text)?;
        log::info!("Wrote {} buckets to {:?}", result.aggregated.len(), target);
    }
    if settings.decoded {
        let target = output::output_path(base, "decoded");
        output::write_decoded_file(&target, &result.layout, &result.rows, &settings.null_text)?;
        log::info!("Wrote {} decoded rows to {:?}", result.rows.len(), target);
    }

    Ok(report::render_file(path, &result.report))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
