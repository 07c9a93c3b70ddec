use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus};

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

use crate::error::{Error, Result};

#[cfg(windows)]
pub const CANDIDATES: &[&str] = &["gswin64c", "gswin32c", "gs"];
#[cfg(not(windows))]
pub const CANDIDATES: &[&str] = &["gs"];

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"\d+\.\d+(?:\.\d+)?").unwrap();
}

/// A Ghostscript executable that answered `--version` successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ghostscript {
    command: OsString,
    version: Option<String>,
}

impl Ghostscript {
    pub fn new(command: impl Into<OsString>, version: Option<String>) -> Self {
        Self {
            command: command.into(),
            version,
        }
    }

    /// Probe the platform's candidate command names.
    pub fn detect() -> Option<Self> {
        let found = Self::probe(CANDIDATES);
        match &found {
            Some(gs) => info!(
                "Found Ghostscript ({}) version {}",
                gs.command.to_string_lossy(),
                gs.version.as_deref().unwrap_or("unknown")
            ),
            None => info!("Ghostscript not found"),
        }
        found
    }

    /// Returns the first candidate whose `--version` exits with status 0.
    /// A candidate that cannot be spawned counts as unavailable.
    pub fn probe<S: AsRef<OsStr>>(candidates: &[S]) -> Option<Self> {
        candidates.iter().find_map(|candidate| {
            let output = Command::new(candidate).arg("--version").output().ok()?;
            if !output.status.success() {
                debug!(
                    "{} --version exited with {}",
                    candidate.as_ref().to_string_lossy(),
                    output.status
                );
                return None;
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = VERSION_RE.find(&stdout).map(|m| m.as_str().to_string());
            Some(Self::new(candidate.as_ref(), version))
        })
    }

    pub fn command(&self) -> &OsStr {
        &self.command
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Full argument list for downsampling `input` into `output`.
    pub fn args(&self, input: &Path, output: &Path, dpi: u32, quality: u8) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-sDEVICE=pdfwrite".to_string(),
            "-dCompatibilityLevel=1.4".to_string(),
            "-dPDFSETTINGS=/default".to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        for channel in ["Color", "Gray", "Mono"] {
            args.push(format!("-dDownsample{channel}Images=true").into());
            args.push(format!("-d{channel}ImageResolution={dpi}").into());
            args.push(format!("-d{channel}ImageDownsampleThreshold=1.0").into());
        }

        args.push(format!("-dJPEGQ={quality}").into());
        args.extend(["-dNOPAUSE", "-dQUIET", "-dBATCH"].map(OsString::from));

        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output);
        args.push(output_arg);
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Run Ghostscript once. Blocks until the process exits.
    pub fn compress(&self, input: &Path, output: &Path, dpi: u32, quality: u8) -> Result<()> {
        let args = self.args(input, output, dpi, quality);
        debug!("Running {} {:?}", self.command.to_string_lossy(), args);

        let result = Command::new(&self.command).args(&args).output()?;
        if !result.status.success() {
            return Err(Error::ToolFailed {
                command: self.command.to_string_lossy().into_owned(),
                status: describe_status(result.status),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
