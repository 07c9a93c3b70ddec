//! Directory-level compression: one file job per discovered PDF, each ending
//! in exactly one [`Outcome`].

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{Capabilities, CompressConfig};
use crate::discovery;
use crate::error::Result;
use crate::recompress;
use crate::summary::{FileReport, ImageStats, Outcome, Strategy, Summary};

/// Compress every PDF under `input_dir` into `output_dir`, probing the host
/// for Ghostscript first.
pub fn compress(
    input_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
    dpi: u32,
    quality: u8,
) -> Result<Summary> {
    let config = CompressConfig {
        dpi,
        quality,
        ..CompressConfig::new(input_dir, output_dir)
    };
    compress_with(&config, &Capabilities::detect())
}

/// Run with explicitly resolved capabilities.
///
/// Only configuration problems, an unusable output directory or an
/// unreadable input root are errors; per-file problems end up in the
/// returned [`Summary`].
pub fn compress_with(config: &CompressConfig, caps: &Capabilities) -> Result<Summary> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    let sources = discovery::find_pdfs(&config.input_dir, Some(&config.output_dir))?;
    info!(
        "Found {} PDF file(s) in {}, using {}",
        sources.len(),
        config.input_dir.display(),
        caps.strategy()
    );

    let mut summary = Summary::new(sources.len());
    for source in sources {
        summary.record(compress_file(config, caps, source));
    }
    Ok(summary)
}

fn compress_file(config: &CompressConfig, caps: &Capabilities, source: PathBuf) -> FileReport {
    let Some(output) = discovery::mirrored_path(&config.input_dir, &config.output_dir, &source)
    else {
        warn!("{} is outside the input directory", source.display());
        return FileReport {
            outcome: Outcome::Failed {
                reason: "path is outside the input directory".into(),
                fallback_copied: false,
            },
            output: PathBuf::new(),
            original_size: 0,
            source,
        };
    };

    info!("Compressing {}", source.display());
    let (original_size, attempt) = match fs::metadata(&source) {
        Ok(meta) => (meta.len(), produce(config, caps, &source, &output)),
        Err(e) => (0, Err(e.into())),
    };

    let outcome = match attempt {
        Ok((strategy, compressed_size, images)) => Outcome::Compressed {
            strategy,
            compressed_size,
            images,
        },
        Err(e) => {
            warn!("Failed to compress {}: {}", source.display(), e);
            Outcome::Failed {
                reason: e.to_string(),
                fallback_copied: fallback_copy(&source, &output),
            }
        }
    };

    let report = FileReport {
        original_size,
        source,
        output,
        outcome,
    };
    if let Outcome::Compressed {
        compressed_size, ..
    } = report.outcome
    {
        info!(
            "  {:.2} KB -> {:.2} KB ({:.2}% smaller)",
            report.original_size as f64 / 1024.0,
            compressed_size as f64 / 1024.0,
            report.reduction_percent().unwrap_or(0.0)
        );
    }
    report
}

/// Produce `output` with the first available strategy and return its size.
fn produce(
    config: &CompressConfig,
    caps: &Capabilities,
    source: &Path,
    output: &Path,
) -> Result<(Strategy, u64, Option<ImageStats>)> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let (strategy, images) = if let Some(gs) = &caps.ghostscript {
        gs.compress(source, output, config.dpi, config.quality)?;
        (Strategy::Ghostscript, None)
    } else if caps.recompress {
        let stats = recompress::recompress_pdf(source, output, config.dpi, config.quality)?;
        (Strategy::Recompress, Some(stats))
    } else {
        fs::copy(source, output)?;
        (Strategy::Copy, None)
    };

    let size = fs::metadata(output)?.len();
    Ok((strategy, size, images))
}

/// Best-effort copy of the untouched original after a failed job.
fn fallback_copy(source: &Path, output: &Path) -> bool {
    let copied = output
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::copy(source, output));
    match copied {
        Ok(_) => {
            info!("  Copied the original instead");
            true
        }
        Err(e) => {
            warn!("  Could not copy the original either: {}", e);
            false
        }
    }
}
