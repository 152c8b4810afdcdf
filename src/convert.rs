//! Conversion planning and sequential execution.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classify::Classified;
use crate::config::{OutputPlacement, RunConfig};
use crate::error::{ConversionError, Error, Result};
use crate::filename::{
    case_folded, find_available_target, same_name_ignoring_case, staging_path, target_path,
};
use crate::record::FileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ImageToWebp,
    VideoToHevc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub kind: JobKind,
    /// Delete `source` once `output` is written.
    pub remove_source: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub source: PathBuf,
    pub kind: JobKind,
    pub success: bool,
    pub output_path: PathBuf,
    pub stderr: String,
    pub error: Option<String>,
}

/// Something that can run conversion jobs.
pub trait Encoder {
    /// Tools from [`Encoder::required_tools`] that are not installed.
    fn missing_tools(&self) -> Vec<String>;

    fn required_tools(&self) -> Vec<String>;

    /// Write `output` from `source`. Returns the encoder's stderr on success.
    fn encode(&self, kind: JobKind, source: &Path, output: &Path) -> Result<String, ConversionError>;
}

/// One job per file that is not already converted, images first.
///
/// In-place outputs never land on an existing file or on another job's
/// output; such targets get a `-N` counter instead.
pub fn plan(classified: &Classified, config: &RunConfig) -> Vec<ConversionJob> {
    let images = classified
        .images
        .iter()
        .map(|record| (record, JobKind::ImageToWebp));
    let videos = classified
        .videos
        .iter()
        .map(|record| (record, JobKind::VideoToHevc));

    let mut claimed = HashSet::new();
    images
        .chain(videos)
        .filter(|(record, _)| !record.converted)
        .filter_map(|(record, kind)| plan_job(record, kind, config, &mut claimed))
        .collect()
}

fn plan_job(
    record: &FileRecord,
    kind: JobKind,
    config: &RunConfig,
    claimed: &mut HashSet<String>,
) -> Option<ConversionJob> {
    let mut output = target_path(
        &record.path,
        &config.source_dir,
        &config.output_dir,
        config.placement,
        kind,
    );
    if config.placement == OutputPlacement::InPlace {
        output = in_place_output(&record.path, output, claimed)?;
    }

    Some(ConversionJob {
        source: record.path.clone(),
        output,
        kind,
        remove_source: config.placement == OutputPlacement::InPlace,
    })
}

/// Pick an in-place output that overwrites nothing but the source itself.
fn in_place_output(source: &Path, target: PathBuf, claimed: &mut HashSet<String>) -> Option<PathBuf> {
    // `clip.MP4` -> `clip.mp4` is the source on case-insensitive filesystems
    if same_name_ignoring_case(source, &target) {
        claimed.insert(case_folded(source));
        return Some(source.to_path_buf());
    }

    let taken = |path: &Path| path.exists() || claimed.contains(&case_folded(path));
    match find_available_target(&target, taken) {
        Ok(output) => {
            if output != target {
                info!(source = %source.display(), output = %output.display(), "target taken, renaming");
            }
            claimed.insert(case_folded(&output));
            Some(output)
        }
        Err(e) => {
            warn!("{:#}; skipping {}", e, source.display());
            None
        }
    }
}

/// Fail with every missing tool at once, before any job runs.
pub fn check_dependencies(encoder: &dyn Encoder) -> Result<()> {
    let missing = encoder.missing_tools();
    if missing.is_empty() {
        debug!(tools = ?encoder.required_tools(), "all encoders available");
        return Ok(());
    }
    Err(Error::MissingDependency { tools: missing })
}

/// Run one job. Never panics or aborts; failures come back in the result.
pub fn execute(encoder: &dyn Encoder, job: &ConversionJob) -> ConversionResult {
    match run_job(encoder, job) {
        Ok(stderr) => {
            info!(source = %job.source.display(), output = %job.output.display(), "converted");
            ConversionResult {
                source: job.source.clone(),
                kind: job.kind,
                success: true,
                output_path: job.output.clone(),
                stderr,
                error: None,
            }
        }
        Err(err) => {
            warn!("{}", err);
            ConversionResult {
                source: job.source.clone(),
                kind: job.kind,
                success: false,
                output_path: job.output.clone(),
                stderr: err.stderr.clone().unwrap_or_default(),
                error: Some(err.reason),
            }
        }
    }
}

/// Run jobs one after another, continuing past failures.
pub fn execute_all(encoder: &dyn Encoder, jobs: &[ConversionJob]) -> Vec<ConversionResult> {
    jobs.iter().map(|job| execute(encoder, job)).collect()
}

fn run_job(encoder: &dyn Encoder, job: &ConversionJob) -> Result<String, ConversionError> {
    let io_error = |what: &str, path: &Path, e: io::Error| {
        ConversionError::new(&job.source, format!("{} {}: {}", what, path.display(), e), None)
    };

    // Make sure the destination directory exists
    if let Some(parent) = job.output.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("failed to create", parent, e))?;
    }

    // Encoders cannot read and write the same file
    let overwrites_source = job.output == job.source;
    let written = if overwrites_source {
        staging_path(&job.output)
    } else {
        job.output.clone()
    };

    let finished = encoder.encode(job.kind, &job.source, &written).and_then(|stderr| {
        if overwrites_source {
            fs::rename(&written, &job.output).map_err(|e| io_error("failed to replace", &job.output, e))?;
        }
        Ok(stderr)
    });

    let stderr = match finished {
        Ok(stderr) => stderr,
        Err(err) => {
            discard_partial_output(&job.source, &written);
            return Err(err);
        }
    };

    if job.remove_source && !overwrites_source {
        // The output may still be the source under another name (hard link, case folding)
        if is_same_file(&job.source, &job.output) {
            warn!(source = %job.source.display(), "output is the source file, keeping it");
        } else {
            fs::remove_file(&job.source).map_err(|e| io_error("failed to remove", &job.source, e))?;
        }
    }

    Ok(stderr)
}

/// Remove whatever a failed encode left at `written`, unless it is the source.
fn discard_partial_output(source: &Path, written: &Path) {
    if !written.exists() || is_same_file(source, written) {
        return;
    }
    match fs::remove_file(written) {
        Ok(()) => debug!(path = %written.display(), "removed partial output"),
        Err(e) => warn!("Failed to remove partial output {}: {}", written.display(), e),
    }
}

/// Same device and inode.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(first), Ok(second)) => first.dev() == second.dev() && first.ino() == second.ino(),
        _ => false,
    }
}

/// Runs `cwebp` and `ffmpeg`.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    cwebp: String,
    ffmpeg: String,
    webp_quality: u8,
}

impl CommandEncoder {
    pub fn new(webp_quality: u8) -> Self {
        Self {
            cwebp: "cwebp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            webp_quality: webp_quality.min(100),
        }
    }

    pub fn with_programs(mut self, cwebp: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        self.cwebp = cwebp.into();
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn command_for(&self, kind: JobKind, source: &Path, output: &Path) -> Command {
        match kind {
            JobKind::ImageToWebp => {
                let mut cmd = Command::new(&self.cwebp);
                cmd.arg("-q")
                    .arg(self.webp_quality.to_string())
                    .arg(source)
                    .arg("-o")
                    .arg(output);
                cmd
            }
            JobKind::VideoToHevc => {
                let mut cmd = Command::new(&self.ffmpeg);
                cmd.args(["-y", "-v", "error", "-i"])
                    .arg(source)
                    .args(["-c:v", "libx265", "-tag:v", "hvc1", "-c:a", "copy"])
                    .arg(output);
                cmd
            }
        }
    }
}

impl Encoder for CommandEncoder {
    fn required_tools(&self) -> Vec<String> {
        vec![self.ffmpeg.clone(), self.cwebp.clone()]
    }

    fn missing_tools(&self) -> Vec<String> {
        self.required_tools()
            .into_iter()
            .filter(|tool| !tool_available(tool))
            .collect()
    }

    fn encode(&self, kind: JobKind, source: &Path, output: &Path) -> Result<String, ConversionError> {
        let mut cmd = self.command_for(kind, source, output);
        debug!(command = ?cmd, "encoding");

        let result = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ConversionError::new(source, format!("failed to start encoder: {}", e), None))?;

        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        if !result.status.success() {
            return Err(ConversionError::new(
                source,
                format!("encoder exited with {}", result.status),
                Some(stderr),
            ));
        }
        Ok(stderr)
    }
}

/// A tool counts as available if it can be spawned at all.
fn tool_available(tool: &str) -> bool {
    let status = Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Dependency '{}' not found", tool);
            false
        }
        Err(e) => {
            warn!("Failed to start dependency check for '{}': {}", tool, e);
            false
        }
    }
}

/// An encoder that writes placeholder output, for exercising the pipeline
/// without external binaries.
#[derive(Debug, Default)]
pub struct ScriptedEncoder {
    missing: Vec<String>,
    failures: HashMap<PathBuf, String>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_tools(mut self, tools: &[&str]) -> Self {
        self.missing = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn failing(mut self, source: impl Into<PathBuf>, stderr: &str) -> Self {
        self.failures.insert(source.into(), stderr.to_string());
        self
    }

    /// Sources encoded so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Encoder for ScriptedEncoder {
    fn required_tools(&self) -> Vec<String> {
        vec!["ffmpeg".to_string(), "cwebp".to_string()]
    }

    fn missing_tools(&self) -> Vec<String> {
        self.missing.clone()
    }

    fn encode(&self, kind: JobKind, source: &Path, output: &Path) -> Result<String, ConversionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(source.to_path_buf());
        }
        if let Some(stderr) = self.failures.get(source) {
            // Real encoders often leave a truncated file behind
            let _ = fs::write(output, "partial");
            return Err(ConversionError::new(
                source,
                "encoder exited with exit status: 1",
                Some(stderr.clone()),
            ));
        }
        let content = match kind {
            JobKind::ImageToWebp => "webp",
            JobKind::VideoToHevc => "hevc",
        };
        fs::write(output, content)
            .map_err(|e| ConversionError::new(source, format!("failed to write output: {}", e), None))?;
        Ok(String::new())
    }
}
