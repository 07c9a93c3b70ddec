use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_shrink::{compress_with, merge, Capabilities, CompressConfig, Ghostscript};

/// Shrink the images inside a tree of PDFs and merge PDFs into one dated file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// More log output (-v debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress every PDF under INPUT into a mirrored tree under OUTPUT
    Compress(CompressArgs),
    /// Merge the PDFs directly inside INPUT into Ex_<date>_merged.pdf
    Merge {
        /// Directory holding the PDFs to merge
        input: PathBuf,
        /// Where to write the merged file (defaults to INPUT)
        output: Option<PathBuf>,
    },
    /// Compress INPUT into OUTPUT, then merge INPUT into OUTPUT
    Run(CompressArgs),
}

#[derive(clap::Args, Debug)]
struct CompressArgs {
    /// Input directory
    input: PathBuf,

    /// Output directory
    output: PathBuf,

    /// Target image resolution
    #[arg(long, default_value_t = pdf_shrink::config::DEFAULT_DPI)]
    dpi: u32,

    /// JPEG quality (0-100)
    #[arg(long, default_value_t = pdf_shrink::config::DEFAULT_QUALITY,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: u8,

    /// Do not use Ghostscript even if it is installed
    #[arg(long)]
    no_ghostscript: bool,

    /// Copy files unchanged when Ghostscript is unavailable
    #[arg(long)]
    no_recompress: bool,
}

impl CompressArgs {
    fn config(&self) -> CompressConfig {
        CompressConfig {
            dpi: self.dpi,
            quality: self.quality,
            ..CompressConfig::new(&self.input, &self.output)
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ghostscript: if self.no_ghostscript {
                None
            } else {
                Ghostscript::detect()
            },
            recompress: !self.no_recompress,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match (args.quiet, args.verbose) {
            (true, _) => log::LevelFilter::Warn,
            (false, 0) => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    match args.command {
        Command::Compress(compress) => run_compress(&compress),
        Command::Merge { input, output } => {
            let output = output.unwrap_or_else(|| input.clone());
            run_merge(&input, &output)
        }
        Command::Run(compress) => {
            run_compress(&compress)?;
            run_merge(&compress.input, &compress.output)?;
            println!("\nDone!");
            Ok(())
        }
    }
}

fn run_compress(args: &CompressArgs) -> Result<()> {
    let start = Instant::now();
    let summary = compress_with(&args.config(), &args.capabilities())
        .with_context(|| format!("Failed to compress {}", args.input.display()))?;
    println!("\n{}", summary);
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn run_merge(input: &Path, output: &Path) -> Result<()> {
    let merged = merge(input, output)
        .with_context(|| format!("Failed to merge PDFs in {}", input.display()))?;
    println!("Merged PDF written to {}", merged.display());
    Ok(())
}
