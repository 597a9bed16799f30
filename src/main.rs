//! KARST: K-mer Annotation, Restriction & Scoring Toolkit
//!
//! Usage: karst <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;

use karst_genomics::counts::StreamError;
use karst_genomics::engine::ExternalEngine;
use karst_genomics::pipeline::{AnnotateCommand, ConservCommand, KfilterCommand};
use karst_genomics::rules::GcProfile;

#[derive(Parser)]
#[command(name = "karst")]
#[command(version)]
#[command(about = "KARST: K-mer Annotation, Restriction & Scoring Toolkit - k-mer filtering and effectiveness scoring", long_about = None)]
struct Cli {
    /// Verbose progress output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sub-k-mer filter set and sweep full k-mers against it
    Kfilter {
        /// Input sequence files
        #[arg(value_name = "INPUT_FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Size of output k-mers
        #[arg(short = 'k', long, default_value = "21")]
        ksize: usize,

        /// Size of sub-k-mers; a k-mer is filtered if any sub-k-mer
        /// window matches the filter set
        #[arg(short = 's', long, default_value = "16")]
        subksize: usize,

        /// Format of the input files (fasta, fastq)
        #[arg(short = 'f', long, default_value = "fasta")]
        format: String,

        /// Output file of filtered k-mers
        #[arg(short = 'o', long)]
        out: PathBuf,

        /// File of unwanted k-mers, sorted, at the sub-k-mer size
        #[arg(short = 'r', long)]
        filter: PathBuf,

        /// Location of temporary files
        #[arg(short = 't', long)]
        tempdir: Option<PathBuf>,

        /// Directory containing the counting engine's `count` and
        /// `stream` binaries
        #[arg(short = 'e', long, default_value = "kanalyze")]
        engine: PathBuf,

        /// Force gzip decoding of the filter file
        #[arg(short = 'z', long, conflicts_with = "no_filter_gz")]
        filter_gz: bool,

        /// Force plain-text reading of the filter file
        #[arg(short = 'Z', long)]
        no_filter_gz: bool,

        /// Omit the stream index column from output rows
        #[arg(long)]
        no_index: bool,
    },

    /// Score filtered k-mers with the annotation battery
    Annotate {
        /// Input file: `kmer,passFlag,position` rows from kfilter
        #[arg(short = 'i', long = "in")]
        input: PathBuf,

        /// Output file
        #[arg(short = 'o', long)]
        out: PathBuf,

        /// Size of the k-mers being annotated
        #[arg(short = 'k', long, default_value = "21")]
        ksize: usize,

        /// GC-content acceptance band
        #[arg(long, default_value = "40-60", value_parser = ["40-60", "30-52"])]
        gc_band: String,

        /// Gene file (`name\tstart\tend`, 1-based inclusive)
        #[arg(short = 'g', long)]
        gene: Option<PathBuf>,

        /// File of k-mers and conservation scores
        #[arg(short = 'c', long)]
        conservation: Option<PathBuf>,

        /// Conservation threshold for the disqualifying lookup rule
        #[arg(long, default_value = "0.9")]
        threshold: f64,

        /// Use gene/conservation files for annotation only (do not
        /// alter scores)
        #[arg(short = 'a', long)]
        annotate_only: bool,

        /// Also evaluate the reverse complement of each k-mer
        #[arg(short = 'r', long)]
        reverse: bool,

        /// Write the score regardless of disqualifying filters as an
        /// additional column
        #[arg(short = 's', long)]
        score: bool,
    },

    /// Build a conservation table from reference sequences
    Conserv {
        /// Reference sequence files, one record per file
        #[arg(value_name = "INPUT_FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Size of output k-mers
        #[arg(short = 'k', long, default_value = "21")]
        ksize: usize,

        /// Format of the input files (fasta, fastq)
        #[arg(short = 'f', long, default_value = "fasta")]
        format: String,

        /// Output file
        #[arg(short = 'o', long)]
        out: PathBuf,

        /// Location of temporary files
        #[arg(short = 't', long)]
        tempdir: Option<PathBuf>,

        /// Directory containing the counting engine binaries
        #[arg(short = 'e', long, default_value = "kanalyze")]
        engine: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let result = match cli.command {
        Commands::Kfilter {
            inputs,
            ksize,
            subksize,
            format,
            out,
            filter,
            tempdir,
            engine,
            filter_gz,
            no_filter_gz,
            no_index,
        } => run_kfilter(
            inputs,
            ksize,
            subksize,
            format,
            out,
            filter,
            tempdir,
            engine,
            filter_gz,
            no_filter_gz,
            no_index,
        ),

        Commands::Annotate {
            input,
            out,
            ksize,
            gc_band,
            gene,
            conservation,
            threshold,
            annotate_only,
            reverse,
            score,
        } => run_annotate(
            input,
            out,
            ksize,
            gc_band,
            gene,
            conservation,
            threshold,
            annotate_only,
            reverse,
            score,
        ),

        Commands::Conserv {
            inputs,
            ksize,
            format,
            out,
            tempdir,
            engine,
        } => run_conserv(inputs, ksize, format, out, tempdir, engine),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Scratch directory for the engine's temporary files; removed on drop.
fn make_scratch(base: Option<PathBuf>) -> io::Result<tempfile::TempDir> {
    match base {
        Some(base) => tempfile::Builder::new().prefix("run.").tempdir_in(base),
        None => tempfile::Builder::new().prefix("run.").tempdir(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_kfilter(
    inputs: Vec<PathBuf>,
    ksize: usize,
    subksize: usize,
    format: String,
    out: PathBuf,
    filter: PathBuf,
    tempdir: Option<PathBuf>,
    engine_dir: PathBuf,
    filter_gz: bool,
    no_filter_gz: bool,
    no_index: bool,
) -> Result<(), StreamError> {
    if subksize > ksize {
        return Err(StreamError::InvalidFormat(format!(
            "sub-k-mer size ({}) must not exceed the k-mer size ({})",
            subksize, ksize
        )));
    }

    let scratch = make_scratch(tempdir)?;
    let engine = ExternalEngine::new(engine_dir)
        .with_format(format)
        .with_scratch(scratch.path());

    let cmd = KfilterCommand {
        k: ksize,
        sub_k: subksize,
        filter_gz: match (filter_gz, no_filter_gz) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        indexed: !no_index,
    };

    let mut handle = BufWriter::new(File::create(&out)?);
    let stats = cmd.run(&engine, &inputs, &filter, scratch.path(), &mut handle)?;
    log::info!("kfilter: {}", stats);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_annotate(
    input: PathBuf,
    out: PathBuf,
    ksize: usize,
    gc_band: String,
    gene: Option<PathBuf>,
    conservation: Option<PathBuf>,
    threshold: f64,
    annotate_only: bool,
    reverse: bool,
    score: bool,
) -> Result<(), StreamError> {
    let profile = match gc_band.as_str() {
        "30-52" => GcProfile::Band30To52,
        _ => GcProfile::Band40To60,
    };

    let cmd = AnnotateCommand {
        k: ksize,
        profile,
        gene_file: gene,
        conservation_file: conservation,
        threshold,
        annotate_only,
        reverse,
        unfiltered_score: score,
    };

    let input = File::open(&input)?;
    let mut handle = BufWriter::new(File::create(&out)?);
    cmd.run(input, &mut handle)?;
    Ok(())
}

fn run_conserv(
    inputs: Vec<PathBuf>,
    ksize: usize,
    format: String,
    out: PathBuf,
    tempdir: Option<PathBuf>,
    engine_dir: PathBuf,
) -> Result<(), StreamError> {
    let scratch = make_scratch(tempdir)?;
    let engine = ExternalEngine::new(engine_dir)
        .with_format(format)
        .with_scratch(scratch.path());

    let cmd = ConservCommand { k: ksize };
    let mut handle = BufWriter::new(File::create(&out)?);
    cmd.run(&engine, &inputs, &mut handle)?;
    Ok(())
}
