//! Run configuration for the compressor.

use std::path::PathBuf;

use crate::discovery;
use crate::error::{Error, Result};
use crate::ghostscript::Ghostscript;
use crate::summary::Strategy;

pub const DEFAULT_DPI: u32 = 150;
pub const DEFAULT_QUALITY: u8 = 85;

/// Inputs of one compression run. Not modified once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Target image resolution in dots per inch.
    pub dpi: u32,
    /// JPEG quality, 0-100.
    pub quality: u8,
}

impl CompressConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            dpi: DEFAULT_DPI,
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            return Err(Error::InvalidConfig("dpi must be positive".into()));
        }
        if self.quality > 100 {
            return Err(Error::InvalidConfig(format!(
                "quality must be between 0 and 100, got {}",
                self.quality
            )));
        }
        if !self.input_dir.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }
        // Compared by location: `scans`, `./scans` and `/abs/scans` are one
        // directory, and copying a file onto itself empties it.
        let input = self.input_dir.canonicalize()?;
        let output = discovery::resolve_dir(&self.output_dir)?;
        if input == output {
            return Err(Error::InvalidConfig(
                "output directory must differ from the input directory".into(),
            ));
        }
        Ok(())
    }
}

/// What the host can do, resolved once before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub ghostscript: Option<Ghostscript>,
    /// In-process image recompression with lopdf + image.
    pub recompress: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            ghostscript: Ghostscript::detect(),
            recompress: true,
        }
    }

    /// Neither Ghostscript nor recompression: every file is copied as-is.
    pub fn copy_only() -> Self {
        Self {
            ghostscript: None,
            recompress: false,
        }
    }

    /// First available strategy wins.
    pub fn strategy(&self) -> Strategy {
        if self.ghostscript.is_some() {
            Strategy::Ghostscript
        } else if self.recompress {
            Strategy::Recompress
        } else {
            Strategy::Copy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CompressConfig::new("in", "out");
        assert_eq!(config.dpi, 150);
        assert_eq!(config.quality, 85);
    }

    #[test]
    fn rejects_zero_dpi_and_high_quality() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let mut config = CompressConfig::new(dir.path(), &out);
        config.dpi = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = CompressConfig::new(dir.path(), &out);
        config.quality = 101;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = CompressConfig::new(dir.path(), &out);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_missing_input_and_same_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompressConfig::new(dir.path().join("missing"), dir.path());
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = CompressConfig::new(dir.path(), dir.path());
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_same_directory_spelled_differently() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        for output in [dir.path().join("sub/.."), dir.path().join("missing/..")] {
            let config = CompressConfig::new(dir.path(), &output);
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{} accepted",
                output.display()
            );
        }

        let config = CompressConfig::new(dir.path(), dir.path().join("sub/../out"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn strategy_ranking() {
        let gs = Ghostscript::new("gs", None);
        let caps = Capabilities {
            ghostscript: Some(gs),
            recompress: true,
        };
        assert_eq!(caps.strategy(), Strategy::Ghostscript);

        let caps = Capabilities {
            ghostscript: None,
            recompress: true,
        };
        assert_eq!(caps.strategy(), Strategy::Recompress);

        assert_eq!(Capabilities::copy_only().strategy(), Strategy::Copy);
    }
}
