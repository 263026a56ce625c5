use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::{Path, PathBuf};

use placeagg::aggregate::{AggregateOptions, Progress};
use placeagg::analysis::{EdgeMassPipeline, NhdPipeline, edge_masses, nhd_matrix};
use placeagg::output::{self, MatrixFormat};
use placeagg::placement::{MassNorm, SampleOptions};
use placeagg::runtime;

#[derive(Parser)]
#[command(
    name = "placeagg",
    version,
    about = "Aggregate phylogenetic placement samples over a shared reference tree"
)]
struct Cli {
    /// Number of worker threads (default: environment hints, then all cores).
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Log debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pairwise Node Histogram Distance between samples.
    Nhd(NhdArgs),
    /// Placement mass per edge, accumulated over all samples.
    HeatTree(HeatTreeArgs),
}

#[derive(Args)]
struct InputArgs {
    /// jplace files, or directories containing them.
    #[arg(required = true)]
    jplace_path: Vec<PathBuf>,

    /// Use only the most likely placement of each pquery, with full weight.
    #[arg(long)]
    point_mass: bool,

    /// Count every pquery name once, regardless of its multiplicity.
    #[arg(long)]
    ignore_multiplicities: bool,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, default_value = "")]
    file_prefix: String,

    #[arg(long)]
    allow_file_overwriting: bool,

    /// Also write the result as .npz.
    #[arg(long)]
    npz: bool,
}

#[derive(Args)]
struct NhdArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Bins per node histogram.
    #[arg(
        long,
        default_value_t = 25,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    histogram_bins: usize,

    #[arg(long, value_enum, default_value_t = MatrixFormat::Matrix)]
    matrix_format: MatrixFormat,

    #[arg(long)]
    omit_matrix_labels: bool,
}

#[derive(Args)]
struct HeatTreeArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[arg(long, value_enum, default_value_t = MassNorm::Relative)]
    mass_norm: MassNorm,
}

impl InputArgs {
    fn sample_options(&self, mass_norm: MassNorm) -> SampleOptions {
        SampleOptions {
            point_mass: self.point_mass,
            ignore_multiplicities: self.ignore_multiplicities,
            mass_norm,
        }
    }
}

/// Expands directories to their `*.jplace` files (sorted); files are kept as given.
fn collect_jplace_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("list {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jplace"))
                .collect();
            found.sort();
            debug!("[input] {} jplace files in {}", found.len(), input.display());
            out.extend(found);
        } else if input.is_file() {
            out.push(input.clone());
        } else {
            bail!("input {:?} does not exist", input);
        }
    }
    Ok(out)
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} files {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        BarProgress { bar }
    }
}

impl Progress for BarProgress {
    fn file_done(&self, done: usize, total: usize, path: &Path) {
        debug!("[input] processed file {done} of {total}: {}", path.display());
        self.bar.set_position(done as u64);
        self.bar.set_message(path.display().to_string());
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn run_nhd(args: &NhdArgs, options: &AggregateOptions) -> Result<()> {
    let out = &args.output;
    let tsv = output::output_path(&out.out_dir, &out.file_prefix, "nhd_matrix", "tsv");
    let npz = output::output_path(&out.out_dir, &out.file_prefix, "nhd_matrix", "npz");
    let mut targets = vec![tsv.clone()];
    if out.npz {
        targets.push(npz.clone());
    }
    output::check_nonexistent(&targets, out.allow_file_overwriting)?;

    let paths = collect_jplace_paths(&args.input.jplace_path)?;
    info!("[nhd] {} input files, {} histogram bins", paths.len(), args.histogram_bins);
    let pipeline = NhdPipeline {
        sample_options: args.input.sample_options(MassNorm::Absolute),
        bins: args.histogram_bins,
    };
    let matrix = {
        let progress = BarProgress::new(paths.len());
        nhd_matrix(&paths, &pipeline, options, &progress)?
    };

    info!("[nhd] writing distance matrix to {}", tsv.display());
    let names = output::sample_names(&paths);
    let labels = (!args.omit_matrix_labels).then_some(names.as_slice());
    let mut w = output::create_output(&tsv)?;
    output::write_matrix(&mut w, &matrix, labels, args.matrix_format, "Sample")?;
    if out.npz {
        output::save_matrix_npz(&npz, &matrix)?;
        info!("[nhd] matrix also saved to {}", npz.display());
    }
    Ok(())
}

fn run_heat_tree(args: &HeatTreeArgs, options: &AggregateOptions) -> Result<()> {
    let out = &args.output;
    let tsv = output::output_path(&out.out_dir, &out.file_prefix, "edge_masses", "tsv");
    let npz = output::output_path(&out.out_dir, &out.file_prefix, "edge_masses", "npz");
    let mut targets = vec![tsv.clone()];
    if out.npz {
        targets.push(npz.clone());
    }
    output::check_nonexistent(&targets, out.allow_file_overwriting)?;

    let paths = collect_jplace_paths(&args.input.jplace_path)?;
    info!("[heat-tree] {} input files, mass norm {:?}", paths.len(), args.mass_norm);
    let pipeline = EdgeMassPipeline {
        sample_options: args.input.sample_options(args.mass_norm),
    };
    let result = {
        let progress = BarProgress::new(paths.len());
        edge_masses(&paths, &pipeline, options, &progress)?
    };

    info!("[heat-tree] writing edge masses to {}", tsv.display());
    let mut w = output::create_output(&tsv)?;
    output::write_edge_masses(&mut w, &result.tree, &result.masses)?;
    if out.npz {
        output::save_edge_masses_npz(&npz, &result.tree, &result.masses)?;
        info!("[heat-tree] masses also saved to {}", npz.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    runtime::configure_thread_pool(cli.threads);
    // the global pool is already sized from --threads
    let options = AggregateOptions::default();

    match &cli.command {
        Command::Nhd(args) => run_nhd(args, &options),
        Command::HeatTree(args) => run_heat_tree(args, &options),
    }
}
