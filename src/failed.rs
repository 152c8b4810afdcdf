use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::convert::ConversionResult;
use crate::filename::find_available_report_name;

/// Write a debug report for a failed conversion into `reports_dir`
pub fn record_failed_conversion(reports_dir: &Path, result: &ConversionResult) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("Failed to create reports directory: {}", reports_dir.display()))?;

    let original_name = result
        .source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    // Find an available name for the report
    let report_path = find_available_report_name(reports_dir, original_name)?;
    let report = generate_report(result);

    fs::write(&report_path, report)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;

    Ok(report_path)
}

fn generate_report(result: &ConversionResult) -> String {
    let mut info = String::new();

    // File information
    let _ = writeln!(info, "=== FILE INFORMATION ===");
    let _ = writeln!(info, "File: {}", result.source.display());
    if let Some(ext) = result.source.extension() {
        let _ = writeln!(info, "Extension: {}", ext.to_string_lossy());
    }
    if let Ok(metadata) = fs::metadata(&result.source) {
        let _ = writeln!(info, "Size: {} bytes", metadata.len());
        if let Ok(modified) = metadata.modified() {
            let modified: chrono::DateTime<Utc> = modified.into();
            let _ = writeln!(info, "Modified: {}", modified.to_rfc3339());
        }
    }
    info.push('\n');

    let _ = writeln!(info, "=== CONVERSION ===");
    let _ = writeln!(info, "Job: {:?}", result.kind);
    let _ = writeln!(info, "Target: {}", result.output_path.display());
    let _ = writeln!(info, "Reported at: {}", Utc::now().to_rfc3339());
    info.push('\n');

    // Error details
    let _ = writeln!(info, "=== ERROR ===");
    let _ = writeln!(info, "{}", result.error.as_deref().unwrap_or("unknown error"));
    info.push('\n');

    let _ = writeln!(info, "=== ENCODER STDERR ===");
    info.push_str(&result.stderr);
    if !result.stderr.ends_with('\n') {
        info.push('\n');
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::JobKind;
    use tempfile::TempDir;

    fn failed_result(source: &Path) -> ConversionResult {
        ConversionResult {
            source: source.to_path_buf(),
            kind: JobKind::ImageToWebp,
            success: false,
            output_path: source.with_extension("webp"),
            stderr: "Could not process file".to_string(),
            error: Some("encoder exited with exit status: 1".to_string()),
        }
    }

    #[test]
    fn test_report_contains_error_and_stderr() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("x.png");
        fs::write(&source, "png").unwrap();

        let reports = temp.path().join("failed");
        let path = record_failed_conversion(&reports, &failed_result(&source)).unwrap();
        assert_eq!(path, reports.join("x.png.txt"));

        let report = fs::read_to_string(&path).unwrap();
        assert!(report.contains("ImageToWebp"));
        assert!(report.contains("encoder exited with exit status: 1"));
        assert!(report.contains("Could not process file"));
        assert!(report.contains("Size: 3 bytes"));
    }

    #[test]
    fn test_reports_never_overwrite() {
        let temp = TempDir::new().unwrap();
        let reports = temp.path().join("failed");
        let result = failed_result(&temp.path().join("x.png"));

        let first = record_failed_conversion(&reports, &result).unwrap();
        let second = record_failed_conversion(&reports, &result).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }
}
