//! Per-file outcomes and the aggregate run report.

use std::fmt;
use std::path::PathBuf;

/// How a file's output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Ghostscript,
    Recompress,
    Copy,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Ghostscript => write!(f, "Ghostscript"),
            Strategy::Recompress => write!(f, "image recompression"),
            Strategy::Copy => write!(f, "plain copy"),
        }
    }
}

/// Image counts for one file handled by the recompress strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub resampled: usize,
    pub kept: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Compressed {
        strategy: Strategy,
        compressed_size: u64,
        images: Option<ImageStats>,
    },
    Failed {
        reason: String,
        /// Whether the original could be copied to the output path instead.
        fallback_copied: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Zero when the source size could not be read.
    pub original_size: u64,
    pub outcome: Outcome,
}

impl FileReport {
    pub fn is_compressed(&self) -> bool {
        matches!(self.outcome, Outcome::Compressed { .. })
    }

    /// Size change in percent; negative when the output grew.
    pub fn reduction_percent(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Compressed {
                compressed_size, ..
            } if self.original_size > 0 => Some(
                (self.original_size as f64 - compressed_size as f64) / self.original_size as f64
                    * 100.0,
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub total_files: usize,
    pub compressed_files: usize,
    pub failed_files: usize,
    pub original_size: u64,
    pub compressed_size: u64,
    pub files: Vec<FileReport>,
}

impl Summary {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            files: Vec::with_capacity(total_files),
            ..Self::default()
        }
    }

    pub fn record(&mut self, report: FileReport) {
        self.original_size += report.original_size;
        match &report.outcome {
            Outcome::Compressed {
                compressed_size, ..
            } => {
                self.compressed_size += compressed_size;
                self.compressed_files += 1;
            }
            Outcome::Failed { .. } => self.failed_files += 1,
        }
        self.files.push(report);
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|report| !report.is_compressed())
    }

    /// Original bytes of the files that were compressed successfully.
    pub fn compressed_original_size(&self) -> u64 {
        self.files
            .iter()
            .filter(|report| report.is_compressed())
            .map(|report| report.original_size)
            .sum()
    }

    /// Overall reduction in percent, clamped to `0..=100`.
    ///
    /// Failed files are left out of both sides of the ratio. `None` when no
    /// files were found or nothing was compressed.
    pub fn reduction_percent(&self) -> Option<f64> {
        if self.total_files == 0 {
            return None;
        }
        let original = self.compressed_original_size();
        if original == 0 {
            return None;
        }
        let ratio = self.compressed_size as f64 / original as f64;
        Some(((1.0 - ratio) * 100.0).clamp(0.0, 100.0))
    }
}

const MB: f64 = 1024.0 * 1024.0;

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_files == 0 {
            return writeln!(f, "No PDF files found.");
        }
        writeln!(f, "Compression summary:")?;
        writeln!(f, "  Total files:      {}", self.total_files)?;
        writeln!(f, "  Compressed:       {}", self.compressed_files)?;
        writeln!(f, "  Failed:           {}", self.failed_files)?;
        writeln!(
            f,
            "  Original size:    {:.2} MB",
            self.original_size as f64 / MB
        )?;
        writeln!(
            f,
            "  Compressed size:  {:.2} MB",
            self.compressed_size as f64 / MB
        )?;
        if let Some(pct) = self.reduction_percent() {
            writeln!(f, "  Average saving:   {:.2}%", pct)?;
        }
        for report in self.failures() {
            if let Outcome::Failed { reason, .. } = &report.outcome {
                writeln!(f, "  ! {}: {}", report.source.display(), reason)?;
            }
        }
        Ok(())
    }
}
