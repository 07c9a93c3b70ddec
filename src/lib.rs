//! Shrink folders of scanned PDFs.
//!
//! - [`compress`] walks an input tree and writes a downsampled copy of every
//!   PDF to the same relative path under an output directory. Ghostscript is
//!   used when installed; otherwise images are recompressed in-process with
//!   `lopdf` and `image`, and as a last resort files are copied unchanged.
//! - [`merge`] concatenates the PDFs at the top of one directory, in file
//!   name order, into `Ex_<YYYY-MM-DD>_merged.pdf`.
//!
//! ```no_run
//! let summary = pdf_shrink::compress("scans", "scans-small", 150, 85)?;
//! println!("{summary}");
//! let merged = pdf_shrink::merge("scans-small", "scans-small")?;
//! println!("{}", merged.display());
//! # Ok::<(), pdf_shrink::Error>(())
//! ```

pub mod compress;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ghostscript;
pub mod merge;
pub mod pdf;
pub mod placement;
pub mod recompress;
pub mod summary;

pub use compress::{compress, compress_with};
pub use config::{Capabilities, CompressConfig};
pub use error::{Error, Result};
pub use ghostscript::Ghostscript;
pub use merge::{merge, merge_on};
pub use summary::{FileReport, ImageStats, Outcome, Strategy, Summary};
