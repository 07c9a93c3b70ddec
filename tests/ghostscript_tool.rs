//! Drives the Ghostscript strategy with stand-in shell scripts.
//!
//! Kept to a single test so no other test in this binary forks while a
//! script is still open for writing.
#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pdf_shrink::{compress_with, Capabilities, CompressConfig, Ghostscript, Outcome, Strategy};
use tempfile::TempDir;

use common::write_pages_pdf;

/// Answers `--version`, otherwise copies the input to `-sOutputFile` and
/// records its arguments next to the output.
const COPYING_TOOL: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "10.02.1"
  exit 0
fi
out=""
for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) out="${arg#-sOutputFile=}" ;;
  esac
  last="$arg"
done
printf '%s\n' "$@" > "$out.args"
cp "$last" "$out"
"#;

const FAILING_TOOL: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "9.56.1"
  exit 0
fi
echo "Unrecoverable error" >&2
exit 3
"#;

const BROKEN_PROBE: &str = "#!/bin/sh\nexit 1\n";

fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn ghostscript_strategy_end_to_end() {
    let bin = TempDir::new().unwrap();
    let copying = install(bin.path(), "gs-copy", COPYING_TOOL);
    let failing = install(bin.path(), "gs-fail", FAILING_TOOL);
    let broken = install(bin.path(), "gs-broken", BROKEN_PROBE);
    let missing = bin.path().join("gs-missing");

    // Probe: unavailable and non-zero candidates are skipped in order.
    let gs = Ghostscript::probe(&[missing.clone(), broken.clone(), copying.clone()]).unwrap();
    assert_eq!(gs.command(), copying.as_os_str());
    assert_eq!(gs.version(), Some("10.02.1"));
    assert!(Ghostscript::probe(&[missing, broken]).is_none());

    let input = TempDir::new().unwrap();
    write_pages_pdf(&input.path().join("a.pdf"), &[612]);
    write_pages_pdf(&input.path().join("sub/b.pdf"), &[612, 612]);

    // Success: the tool's output lands at the mirrored path.
    let output = TempDir::new().unwrap();
    let config = CompressConfig {
        dpi: 110,
        quality: 60,
        ..CompressConfig::new(input.path(), output.path())
    };
    let caps = Capabilities {
        ghostscript: Some(gs),
        recompress: true,
    };
    let summary = compress_with(&config, &caps).unwrap();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.compressed_files, 2);
    for relative in ["a.pdf", "sub/b.pdf"] {
        assert_eq!(
            fs::read(input.path().join(relative)).unwrap(),
            fs::read(output.path().join(relative)).unwrap()
        );
    }
    assert!(summary.files.iter().all(|f| matches!(
        f.outcome,
        Outcome::Compressed {
            strategy: Strategy::Ghostscript,
            ..
        }
    )));
    let args = fs::read_to_string(output.path().join("a.pdf.args")).unwrap();
    assert!(args.contains("-dColorImageResolution=110"));
    assert!(args.contains("-dJPEGQ=60"));
    assert!(args.trim_end().ends_with("a.pdf"));

    // Failure: every file fails, the original is copied instead.
    let output = TempDir::new().unwrap();
    let caps = Capabilities {
        ghostscript: Ghostscript::probe(&[failing]),
        recompress: true,
    };
    assert_eq!(caps.strategy(), Strategy::Ghostscript);
    let config = CompressConfig::new(input.path(), output.path());
    let summary = compress_with(&config, &caps).unwrap();
    assert_eq!(summary.compressed_files, 0);
    assert_eq!(summary.failed_files, 2);
    assert_eq!(summary.compressed_size, 0);
    assert_eq!(summary.reduction_percent(), None);
    for report in &summary.files {
        match &report.outcome {
            Outcome::Failed {
                reason,
                fallback_copied,
            } => {
                assert!(reason.contains("exit code 3"), "reason: {reason}");
                assert!(reason.contains("Unrecoverable error"));
                assert!(*fallback_copied);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            fs::read(&report.source).unwrap(),
            fs::read(&report.output).unwrap()
        );
    }
}
