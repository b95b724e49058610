//! redocx CLI - Microsoft Word (DOCX) package repair tool
//!
//! Repairs one package per invocation and prints a JSON summary of the run.
//! The process exits 0 whenever a run took place, whatever its outcome; the
//! summary's `ok` field says whether the repaired package validated.

use clap::Parser;
use colored::*;
use redocx::{Capabilities, Pandoc, RepairOptions, Repairer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Repair a corrupt DOCX by sanitizing XML and rebuilding via pandoc
#[derive(Parser)]
#[command(
    name = "redocx",
    author = "iyulab",
    version,
    about = "Repair corrupted Word documents",
    long_about = "redocx - Best-effort repair of corrupted DOCX packages.\n\n\
                  Backs up the input, fixes metadata and malformed XML parts, sets custom XML \
                  aside, rebuilds the package and validates it, falling back to a pandoc \
                  round trip when the rebuilt package still does not open."
)]
struct Cli {
    /// Path to input DOCX file (corrupted.docx)
    input: PathBuf,

    /// Optional path to save repaired DOCX (default: <stem>.repaired.docx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short, long)]
    quiet: bool,

    /// Write a minimal core.xml when the package has none
    #[arg(long)]
    synthesize_metadata: bool,

    /// Leave customXml/ in the repaired package
    #[arg(long)]
    keep_custom_xml: bool,

    /// Use this pandoc executable instead of searching PATH
    #[arg(long, value_name = "PATH")]
    pandoc: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn options_from(cli: &Cli) -> RepairOptions {
    let mut options = RepairOptions::new()
        .with_quiet(cli.quiet)
        .with_custom_xml_removal(!cli.keep_custom_xml)
        .with_synthesized_metadata(cli.synthesize_metadata);
    if let Some(output) = &cli.output {
        options = options.with_output(output);
    }
    options
}

fn capabilities_from(cli: &Cli) -> Capabilities {
    match &cli.pandoc {
        Some(program) => Capabilities::detect().with_converter(Pandoc::with_program(program)),
        None => Capabilities::detect(),
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let repairer = Repairer::new(options_from(&cli), capabilities_from(&cli));
    let report = repairer.repair(&cli.input);
    let summary = report.summary();

    let status = match summary.ok {
        Some(true) => "✓".green().bold(),
        _ => "✗".red().bold(),
    };
    println!("\n{} {}", "=== Repair Summary ===".cyan().bold(), status);
    println!("{}", summary.to_json()?);
    Ok(())
}
