use serde::Serialize;
use std::fs;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::classify::{classify, Classified};
use crate::config::RunConfig;
use crate::convert::{check_dependencies, execute, plan, ConversionJob, ConversionResult, Encoder};
use crate::error::{Error, Result};
use crate::failed::record_failed_conversion;
use crate::probe::ProbeClient;
use crate::record::FileRecord;
use crate::traverse::list_files_excluding;

/// Drives one run: dependency check, listing, classification, conversion, catalog.
pub struct Pipeline<'a> {
    config: &'a RunConfig,
    probe: &'a dyn ProbeClient,
    encoder: &'a dyn Encoder,
    stats: RunStats,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_files: usize,
    pub images: usize,
    pub videos: usize,
    pub others: usize,
    pub already_converted: usize,
    pub probe_failures: usize,
    pub planned: usize,
    pub converted: usize,
    pub failed: usize,
}

/// Everything a run produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub records: Vec<FileRecord>,
    pub jobs: Vec<ConversionJob>,
    pub results: Vec<ConversionResult>,
    pub stats: RunStats,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a RunConfig, probe: &'a dyn ProbeClient, encoder: &'a dyn Encoder) -> Self {
        Pipeline {
            config,
            probe,
            encoder,
            stats: RunStats::default(),
        }
    }

    pub fn run(mut self) -> Result<RunReport> {
        // Nothing is listed or probed when encoders are missing
        if !self.config.dry_run {
            check_dependencies(self.encoder)?;
        }

        // List the source tree, leaving out our own output
        println!("Source directory: {}", self.config.source_dir.display());
        let catalog_path = self.config.catalog_path();
        let files = list_files_excluding(
            &self.config.source_dir,
            &[self.config.output_dir.as_path(), catalog_path.as_path()],
        )?;
        self.stats.total_files = files.len();
        println!("Found {} files", files.len());

        self.ensure_output_dir()?;

        // Split by extension and probe media
        let classified = classify(
            files,
            &self.config.extensions,
            self.probe,
            self.config.probe_workers,
        );
        self.count_classified(&classified);
        print_listing("Here are the images:", &classified.images);
        print_listing("Here are the videos:", &classified.videos);

        // Plan and run conversions
        let jobs = plan(&classified, self.config);
        self.stats.planned = jobs.len();

        let results = if self.config.dry_run {
            print_plan(&jobs);
            Vec::new()
        } else {
            self.convert_all(&jobs)
        };

        // Catalog every file, converted or not
        let records = classified.into_records();
        let mut catalog = Catalog::open(&catalog_path)?;
        catalog.write(&records)?;
        info!(path = %catalog.path().display(), rows = records.len(), "catalog written");

        self.print_summary();

        Ok(RunReport {
            records,
            jobs,
            results,
            stats: self.stats,
        })
    }

    fn ensure_output_dir(&self) -> Result<()> {
        let output_dir = &self.config.output_dir;
        if output_dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(output_dir).map_err(|source| Error::OutputDir {
            path: output_dir.clone(),
            source,
        })?;
        println!("Output directory created at {}", output_dir.display());
        Ok(())
    }

    fn count_classified(&mut self, classified: &Classified) {
        self.stats.images = classified.images.len();
        self.stats.videos = classified.videos.len();
        self.stats.others = classified.others.len();

        let media = classified.images.iter().chain(&classified.videos);
        for record in media {
            if record.converted {
                self.stats.already_converted += 1;
            } else if record.codec_or_mime().is_none() {
                self.stats.probe_failures += 1;
            }
        }
    }

    fn convert_all(&mut self, jobs: &[ConversionJob]) -> Vec<ConversionResult> {
        let total = jobs.len();
        let mut results = Vec::with_capacity(total);

        for (index, job) in jobs.iter().enumerate() {
            let result = execute(self.encoder, job);

            // Update statistics and report progress

            if result.success {
                self.stats.converted += 1;
                println!(
                    "✓ [{}/{}] Converted: {} → {}",
                    index + 1,
                    total,
                    job.source.display(),
                    result.output_path.display()
                );
            } else {
                self.stats.failed += 1;
                eprintln!(
                    "✗ [{}/{}] Failed: {}: {}",
                    index + 1,
                    total,
                    job.source.display(),
                    result.error.as_deref().unwrap_or("unknown error")
                );
                // Write failure details next to the catalog
                match record_failed_conversion(&self.config.failed_reports_dir(), &result) {
                    Ok(report) => eprintln!("   see {}", report.display()),
                    Err(e) => warn!("Error writing failure report: {:#}", e),
                }
            }

            results.push(result);
        }

        results
    }

    fn print_summary(&self) {
        let stats = &self.stats;

        println!();
        println!("=== PROCESSING COMPLETE ===");
        println!("Total files scanned: {}", stats.total_files);
        println!("  - Images: {}", stats.images);
        println!("  - Videos: {}", stats.videos);
        println!("  - Other: {}", stats.others);
        println!("Already converted: {}", stats.already_converted);
        if stats.probe_failures > 0 {
            println!("Probe failures (queued for conversion): {}", stats.probe_failures);
        }

        if self.config.dry_run {
            println!("Planned conversions (dry run): {}", stats.planned);
        } else {
            println!("Converted: {}", stats.converted);
            println!("Failed: {}", stats.failed);
            if stats.failed > 0 {
                println!();
                println!(
                    "Failed conversions have been logged in: {}",
                    self.config.failed_reports_dir().display()
                );
            }
        }
        println!("Catalog: {}", self.config.catalog_path().display());
    }
}

fn print_listing(title: &str, records: &[FileRecord]) {
    if records.is_empty() {
        return;
    }
    println!("{}", title);
    for record in records {
        let status = if record.converted { " (converted)" } else { "" };
        println!("- {}{}", record.path.display(), status);
    }
}

fn print_plan(jobs: &[ConversionJob]) {
    if jobs.is_empty() {
        return;
    }
    println!("Planned conversions:");
    for job in jobs {
        println!("- {} → {}", job.source.display(), job.output.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputPlacement;
    use crate::convert::{JobKind, ScriptedEncoder};
    use crate::probe::ScriptedProbe;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let base = fs::canonicalize(temp.path()).unwrap();
        let source = base.join("a");
        fs::create_dir_all(source.join("b")).unwrap();
        fs::write(source.join("x.png"), "png").unwrap();
        fs::write(source.join("y.mp4"), "mp4").unwrap();
        fs::write(source.join("z.txt"), "txt").unwrap();
        fs::write(source.join("b/w.jpg"), "jpg").unwrap();
        Fixture {
            output: base.join("converted"),
            source,
            _temp: temp,
        }
    }

    fn probe_for(source: &Path) -> ScriptedProbe {
        ScriptedProbe::new()
            .with_mime(source.join("x.png"), "image/png")
            .with_mime(source.join("b/w.jpg"), "image/webp")
            .with_codec(source.join("y.mp4"), "h264")
    }

    fn config_for(fixture: &Fixture) -> RunConfig {
        RunConfig::new(&fixture.source, "converted", false).with_probe_workers(1)
    }

    #[test]
    fn test_full_run_converts_and_catalogs() {
        let fixture = fixture();
        let config = config_for(&fixture);
        assert_eq!(config.output_dir, fixture.output);

        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new();
        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();

        assert_eq!(report.stats.total_files, 4);
        assert_eq!(report.stats.images, 2);
        assert_eq!(report.stats.videos, 1);
        assert_eq!(report.stats.others, 1);
        assert_eq!(report.stats.already_converted, 1);

        let kinds: Vec<(PathBuf, JobKind)> = report
            .jobs
            .iter()
            .map(|j| (j.source.clone(), j.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (fixture.source.join("x.png"), JobKind::ImageToWebp),
                (fixture.source.join("y.mp4"), JobKind::VideoToHevc),
            ]
        );
        assert_eq!(report.stats.converted, 2);
        assert!(fixture.output.join("x.png.webp").exists());
        assert!(fixture.output.join("y.mp4.hevc.mp4").exists());

        let entries = Catalog::open(&config.catalog_path()).unwrap().entries().unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_missing_tools_stop_before_listing() {
        let fixture = fixture();
        let config = config_for(&fixture);
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new().with_missing_tools(&["ffmpeg", "cwebp"]);

        let err = Pipeline::new(&config, &probe, &encoder).run().unwrap_err();
        match err {
            Error::MissingDependency { tools } => assert_eq!(tools, vec!["ffmpeg", "cwebp"]),
            other => panic!("expected MissingDependency, got {:?}", other),
        }
        assert!(probe.calls().is_empty());
        assert!(encoder.calls().is_empty());
        assert!(!fixture.output.exists());
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let fixture = fixture();
        let config = RunConfig::new(fixture.source.join("nope"), "converted", false);
        let probe = ScriptedProbe::new();
        let encoder = ScriptedEncoder::new();

        let err = Pipeline::new(&config, &probe, &encoder).run().unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_probe_failure_is_still_converted() {
        let fixture = fixture();
        let config = config_for(&fixture);
        let probe = probe_for(&fixture.source).failing(fixture.source.join("x.png"), "corrupt");
        let encoder = ScriptedEncoder::new();

        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        assert_eq!(report.stats.probe_failures, 1);
        assert!(report.jobs.iter().any(|j| j.source == fixture.source.join("x.png")));
    }

    #[test]
    fn test_failed_conversion_continues_and_reports() {
        let fixture = fixture();
        let config = config_for(&fixture);
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new().failing(fixture.source.join("x.png"), "bad input");

        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.converted, 1);
        assert!(config.failed_reports_dir().join("x.png.txt").exists());
    }

    #[test]
    fn test_rerun_produces_same_catalog() {
        let fixture = fixture();
        let config = config_for(&fixture).with_placement(OutputPlacement::MirroredToOutputDir);
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new();

        Pipeline::new(&config, &probe, &encoder).run().unwrap();
        let first = Catalog::open(&config.catalog_path()).unwrap().entries().unwrap();

        Pipeline::new(&config, &probe, &encoder).run().unwrap();
        let second = Catalog::open(&config.catalog_path()).unwrap().entries().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_dry_run_skips_dependencies_and_encoding() {
        let fixture = fixture();
        let mut config = config_for(&fixture);
        config.dry_run = true;
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new().with_missing_tools(&["ffmpeg"]);

        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        assert_eq!(report.stats.planned, 2);
        assert!(report.results.is_empty());
        assert!(encoder.calls().is_empty());
        assert!(config.catalog_path().exists());
    }

    #[test]
    fn test_output_inside_source_is_not_catalogued() {
        let fixture = fixture();
        let output = fixture.source.join("converted");
        let config = RunConfig::new(&fixture.source, &output, false).with_probe_workers(1);
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new();

        let first_report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        let first = Catalog::open(&config.catalog_path()).unwrap().entries().unwrap();
        assert!(output.join("x.png.webp").exists());

        let second_report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        let second = Catalog::open(&config.catalog_path()).unwrap().entries().unwrap();

        assert_eq!(first_report.stats.total_files, 4);
        assert_eq!(second_report.stats.total_files, 4);
        assert_eq!(first, second);
        assert!(second_report.records.iter().all(|r| !r.path.starts_with(&output)));
    }

    #[test]
    fn test_catalog_follows_traversal_order() {
        let fixture = fixture();
        let config = config_for(&fixture);
        let probe = probe_for(&fixture.source);
        let encoder = ScriptedEncoder::new();

        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        let listed: Vec<PathBuf> = crate::traverse::list_files(&fixture.source)
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        let recorded: Vec<PathBuf> = report.records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(recorded, listed);
    }

    #[test]
    fn test_replace_never_overwrites_or_loses_originals() {
        let fixture = fixture();
        let source = &fixture.source;
        fs::write(source.join("x.jpg"), "JPG-ORIGINAL").unwrap();
        fs::write(source.join("x.webp"), "PRE-EXISTING-WEBP").unwrap();

        let config = RunConfig::new(source, "converted", true).with_probe_workers(1);
        let probe = probe_for(source)
            .with_mime(source.join("x.jpg"), "image/jpeg")
            .with_mime(source.join("x.webp"), "image/webp");
        let encoder = ScriptedEncoder::new();

        let report = Pipeline::new(&config, &probe, &encoder).run().unwrap();
        assert_eq!(report.stats.failed, 0);

        assert_eq!(fs::read_to_string(source.join("x.webp")).unwrap(), "PRE-EXISTING-WEBP");
        assert_eq!(fs::read_to_string(source.join("x-1.webp")).unwrap(), "webp");
        assert_eq!(fs::read_to_string(source.join("x-2.webp")).unwrap(), "webp");
        assert!(!source.join("x.png").exists());
        assert!(!source.join("x.jpg").exists());

        // The video keeps its name and is replaced through staging
        assert_eq!(fs::read_to_string(source.join("y.mp4")).unwrap(), "hevc");
    }
}
