//! indirect-reduce: command-line reduction of IN16B Doppler runs.
//!
//! `reduce` unmirrors one or more raw runs into energy-transfer spectra and
//! optionally saves and plots them; `info` summarises a raw run.

use clap::{Parser, Subcommand, ValueEnum};

use indirect_algorithms::{BatchController, EnergySource, EnergyTransfer, OutputEntry};
use indirect_core::{
    Analyser, FacilityConfig, ReductionConfig, Reflection, SpectrumStore, UnmirrorOption,
};
use indirect_io::{read_saved_workspace, read_workspace, FileResultSink, FileRunSource, SaveFormat};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IndirectIo(#[from] indirect_io::Error),

    #[error("Reduction error: {0}")]
    Core(#[from] indirect_core::Error),

    #[error("Facility configuration error: {0}")]
    FacilityConfig(#[from] serde_json::Error),
}

/// File format of saved workspaces.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Processed NeXus (requires the hdf5 feature)
    Nexus,
    /// JSON workspace records
    Json,
}

impl From<Format> for SaveFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Nexus => Self::Nexus,
            Format::Json => Self::Json,
        }
    }
}

/// Energy-transfer reduction of mirrored Doppler backscattering data.
#[derive(Parser)]
#[command(name = "indirect-reduce")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce raw runs to energy transfer
    Reduce(ReduceArgs),

    /// Show information about a raw run
    Info {
        /// Raw run file (.nxs, or .json record)
        input: PathBuf,
    },
}

#[derive(clap::Args)]
#[allow(clippy::struct_excessive_bools)]
struct ReduceArgs {
    /// Raw run files
    #[arg(required = true)]
    runs: Vec<PathBuf>,

    /// Detector grouping map; defaults to the instrument's grouping file
    #[arg(long)]
    map_file: Option<PathBuf>,

    /// Calibration workspace (.json record or processed .nxs)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Unmirror option (0 to 7)
    #[arg(short, long, default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=7))]
    unmirror_option: u8,

    /// Analyser crystal
    #[arg(long, default_value = "silicon")]
    analyser: String,

    /// Analyser reflection
    #[arg(long, default_value = "111")]
    reflection: String,

    /// Keep the intermediate workspaces
    #[arg(long)]
    control_mode: bool,

    /// Sum all runs before reducing
    #[arg(long)]
    sum_runs: bool,

    /// Data is not mirrored (forces option 0)
    #[arg(long)]
    no_mirror_sense: bool,

    /// Save the reduced workspaces
    #[arg(short, long)]
    save: bool,

    /// Write the summed spectrum for plotting
    #[arg(short, long)]
    plot: bool,

    /// Directory receiving saved and plotted files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Save format
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Facility configuration (JSON)
    #[arg(long)]
    facility_config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn load_facility(path: Option<&Path>) -> Result<FacilityConfig> {
    match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None => Ok(FacilityConfig::default()),
    }
}

fn build_config(args: &ReduceArgs) -> Result<ReductionConfig> {
    let mut config = ReductionConfig::new(args.runs.iter().cloned())
        .with_unmirror_option(UnmirrorOption::try_from(args.unmirror_option)?)
        .with_control_mode(args.control_mode)
        .with_sum_runs(args.sum_runs)
        .with_mirror_sense(!args.no_mirror_sense)
        .with_save(args.save)
        .with_plot(args.plot);
    config.analyser = args.analyser.parse::<Analyser>()?;
    config.reflection = args.reflection.parse::<Reflection>()?;
    if let Some(map_file) = &args.map_file {
        config = config.with_map_file(map_file);
    }
    if let Some(path) = &args.calibration {
        config = config.with_calibration(read_saved_workspace(path)?);
    }
    Ok(config)
}

fn print_entry(label: &str, entry: Option<&OutputEntry>) {
    if let Some(entry) = entry {
        println!("{label:<18} {entry}");
    }
}

fn reduce(args: &ReduceArgs) -> Result<()> {
    let facility = load_facility(args.facility_config.as_deref())?;
    let config = build_config(args)?;

    let source = FileRunSource::new();
    let mut sink = FileResultSink::new(&args.output_dir);
    if let Some(format) = args.format {
        sink = sink.with_format(format.into());
    }
    let controller = BatchController::new(&source, &sink, facility);
    let mut store = SpectrumStore::new();

    let start = Instant::now();
    let output = controller.run(&config, &mut store)?;

    let runs: Vec<String> = output.runs.iter().map(ToString::to_string).collect();
    println!(
        "Reduced run(s) {} in {:.2}s",
        runs.join(", "),
        start.elapsed().as_secs_f64()
    );
    print_entry("Reduced:", Some(&output.reduced));
    print_entry("Raw:", output.raw.as_ref());
    print_entry("Monitor:", output.monitor.as_ref());
    print_entry("Grouped detectors:", output.det_grouped.as_ref());
    print_entry("Normalised:", output.mnorm.as_ref());
    print_entry("Calibrated:", output.vnorm.as_ref());
    for path in &output.saved {
        println!("Saved: {}", path.display());
    }
    if let Some(name) = &output.plotted {
        println!("Plotted: {name}");
    }
    Ok(())
}

fn info(input: &Path) -> Result<()> {
    let ws = read_workspace(input)?;
    let meta = &ws.metadata;

    println!("File: {}", input.display());
    println!("Run: {}", meta.run_number);
    println!("Instrument: {}", meta.instrument);
    println!("Spectra: {} (monitor included)", ws.num_spectra());
    println!("Channels: {}", ws.num_bins());
    for (name, value) in &meta.logs {
        println!("  {name} = {value}");
    }

    let source = EnergySource::from_metadata(meta);
    let half_points = (ws.x().len() - 1) / 2 + 1;
    let transfer = EnergyTransfer::new(half_points, source)?;
    println!(
        "Energy transfer per half ({half_points} points): {}{}",
        transfer.formula(),
        if source.has_caveat() { " (check Doppler mode)" } else { "" }
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Reduce(args) => reduce(&args),
        Commands::Info { input } => info(&input),
    }
}
