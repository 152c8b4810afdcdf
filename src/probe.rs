//! Probing what a file really is, regardless of its extension.

use exiftool::ExifTool;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

use crate::error::ProbeError;

pub const WEBP_MIME: &str = "image/webp";
pub const HEVC_CODEC: &str = "hevc";

/// Read-only inspection of a single file.
///
/// One attempt per call, no retries. Implementations must be shareable
/// across probe workers.
pub trait ProbeClient: Send + Sync {
    fn probe_mime(&self, path: &Path) -> Result<String, ProbeError>;

    fn probe_video_codec(&self, path: &Path) -> Result<String, ProbeError>;
}

/// Probes by running `file` and `ffprobe`.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    file_program: PathBuf,
    ffprobe_program: PathBuf,
}

impl CommandProbe {
    pub fn new(file_program: impl Into<PathBuf>, ffprobe_program: impl Into<PathBuf>) -> Self {
        Self {
            file_program: file_program.into(),
            ffprobe_program: ffprobe_program.into(),
        }
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new("file", "ffprobe")
    }
}

impl ProbeClient for CommandProbe {
    fn probe_mime(&self, path: &Path) -> Result<String, ProbeError> {
        let stdout = run_probe(&self.file_program, &["--mime-type", "-b"], path)?;
        parse_mime(&stdout)
            .ok_or_else(|| ProbeError::new(path, format!("unparseable MIME type: {:?}", stdout.trim())))
    }

    fn probe_video_codec(&self, path: &Path) -> Result<String, ProbeError> {
        let stdout = run_probe(
            &self.ffprobe_program,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
            path,
        )?;
        parse_codec(&stdout)
            .ok_or_else(|| ProbeError::new(path, format!("unparseable codec name: {:?}", stdout.trim())))
    }
}

fn run_probe(program: &Path, args: &[&str], path: &Path) -> Result<String, ProbeError> {
    debug!(program = %program.display(), path = %path.display(), "probing");

    let output = Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ProbeError::new(path, format!("failed to run {}: {}", program.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::new(
            path,
            format!("{} exited with {}: {}", program.display(), output.status, stderr.trim()),
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| ProbeError::new(path, format!("{} produced non-UTF-8 output", program.display())))
}

fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|l| !l.is_empty())
}

/// First non-empty line, if it looks like `type/subtype`.
pub fn parse_mime(output: &str) -> Option<String> {
    let line = first_line(output)?;
    let (kind, subtype) = line.split_once('/')?;
    let valid = |s: &str| !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == '/');
    if valid(kind) && valid(subtype) {
        Some(line.to_string())
    } else {
        None
    }
}

/// First non-empty line, if it is a single token.
pub fn parse_codec(output: &str) -> Option<String> {
    let line = first_line(output)?;
    if line.chars().any(char::is_whitespace) {
        return None;
    }
    Some(line.to_string())
}

/// Probes through one long-lived exiftool process, started on first use.
#[derive(Default)]
pub struct ExifToolProbe {
    exiftool: Mutex<Option<ExifTool>>,
}

impl ExifToolProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn metadata(&self, path: &Path) -> Result<HashMap<String, Value>, ProbeError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ProbeError::new(path, "file path contains invalid UTF-8"))?;

        let mut guard = self
            .exiftool
            .lock()
            .map_err(|_| ProbeError::new(path, "exiftool lock poisoned"))?;
        // Start exiftool on first use
        if guard.is_none() {
            let tool = ExifTool::new()
                .map_err(|e| ProbeError::new(path, format!("failed to start exiftool: {}", e)))?;
            *guard = Some(tool);
        }
        let Some(exiftool) = guard.as_mut() else {
            return Err(ProbeError::new(path, "exiftool unavailable"));
        };

        let args = vec!["-G", path_str];
        let output = exiftool
            .json_execute(&args)
            .map_err(|e| ProbeError::new(path, format!("exiftool failed: {}", e)))?;

        // Parse the JSON response
        let data: Vec<HashMap<String, Value>> = serde_json::from_value(output)
            .map_err(|e| ProbeError::new(path, format!("failed to parse exiftool output: {}", e)))?;

        data.into_iter()
            .next()
            .ok_or_else(|| ProbeError::new(path, "no metadata returned from exiftool"))
    }
}

impl ProbeClient for ExifToolProbe {
    fn probe_mime(&self, path: &Path) -> Result<String, ProbeError> {
        let metadata = self.metadata(path)?;
        find_tag(&metadata, &["File:MIMEType", "MIMEType"])
            .and_then(|mime| parse_mime(&mime))
            .ok_or_else(|| ProbeError::new(path, "no MIME type in exiftool output"))
    }

    fn probe_video_codec(&self, path: &Path) -> Result<String, ProbeError> {
        let metadata = self.metadata(path)?;
        find_tag(
            &metadata,
            &[
                "QuickTime:CompressorID",
                "Matroska:VideoCodecID",
                "RIFF:VideoCodec",
                "CompressorID",
                "VideoCodecID",
            ],
        )
        .map(|raw| codec_from_exiftool(&raw))
        .ok_or_else(|| ProbeError::new(path, "no video codec in exiftool output"))
    }
}

fn find_tag(metadata: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| metadata.get(*key))
        .find_map(|value| value.as_str().map(str::to_string))
}

/// Map container codec identifiers onto ffprobe's codec names.
pub fn codec_from_exiftool(raw: &str) -> String {
    let id = raw.trim();
    let lower = id.to_lowercase();
    match lower.as_str() {
        "hvc1" | "hev1" | "v_mpegh/iso/hevc" => "hevc".to_string(),
        "avc1" | "avc3" | "v_mpeg4/iso/avc" => "h264".to_string(),
        "vp09" | "v_vp9" => "vp9".to_string(),
        "vp08" | "v_vp8" => "vp8".to_string(),
        "av01" | "v_av1" => "av1".to_string(),
        _ => lower.split_whitespace().next().unwrap_or_default().to_string(),
    }
}

/// A probe that answers from a script, for exercising the pipeline without
/// any external binary.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    mimes: HashMap<PathBuf, Result<String, String>>,
    codecs: HashMap<PathBuf, Result<String, String>>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime(mut self, path: impl Into<PathBuf>, mime: &str) -> Self {
        self.mimes.insert(path.into(), Ok(mime.to_string()));
        self
    }

    pub fn with_codec(mut self, path: impl Into<PathBuf>, codec: &str) -> Self {
        self.codecs.insert(path.into(), Ok(codec.to_string()));
        self
    }

    /// Make every probe of `path` fail.
    pub fn failing(mut self, path: impl Into<PathBuf>, cause: &str) -> Self {
        let path = path.into();
        self.mimes.insert(path.clone(), Err(cause.to_string()));
        self.codecs.insert(path, Err(cause.to_string()));
        self
    }

    /// Every path probed so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn answer(
        &self,
        script: &HashMap<PathBuf, Result<String, String>>,
        path: &Path,
    ) -> Result<String, ProbeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(path.to_path_buf());
        }
        match script.get(path) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(cause)) => Err(ProbeError::new(path, cause.clone())),
            None => Err(ProbeError::new(path, "no scripted result")),
        }
    }
}

impl ProbeClient for ScriptedProbe {
    fn probe_mime(&self, path: &Path) -> Result<String, ProbeError> {
        self.answer(&self.mimes, path)
    }

    fn probe_video_codec(&self, path: &Path) -> Result<String, ProbeError> {
        self.answer(&self.codecs, path)
    }
}
