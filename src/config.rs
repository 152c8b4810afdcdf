use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::filename::get_extension;
use crate::record::Category;

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg"];
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];
pub const DEFAULT_OUTPUT_DIR: &str = "converted";
pub const DEFAULT_WEBP_QUALITY: u8 = 80;
pub const CATALOG_FILE_NAME: &str = "files.db";
pub const FAILED_REPORTS_DIR: &str = "failed";

/// Where converted files are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPlacement {
    /// Write next to the source under the source's stem and remove the source
    InPlace,
    /// Write `<file>.<ext>` next to the source and keep the source
    Sibling,
    /// Mirror the source tree under the output directory
    #[default]
    #[value(name = "mirrored")]
    MirroredToOutputDir,
}

/// Which external inspection utility answers probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProbeBackend {
    /// `file --mime-type` and `ffprobe`
    #[default]
    Command,
    /// A single exiftool process
    Exiftool,
}

/// Extension sets that decide a file's category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSets {
    images: Vec<String>,
    videos: Vec<String>,
}

impl ExtensionSets {
    pub fn new<I, V>(images: I, videos: V) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        Self {
            images: normalize_all(images),
            videos: normalize_all(videos),
        }
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    /// Case-insensitive extension lookup. Unknown or missing extensions are `Other`.
    pub fn category_of(&self, path: &Path) -> Category {
        let Some(ext) = get_extension(path) else {
            return Category::Other;
        };
        let ext = ext.to_lowercase();

        if self.images.contains(&ext) {
            Category::Image
        } else if self.videos.contains(&ext) {
            Category::Video
        } else {
            Category::Other
        }
    }
}

impl Default for ExtensionSets {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS)
    }
}

fn normalize_all<I>(extensions: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Settings for a single run. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub placement: OutputPlacement,
    pub extensions: ExtensionSets,
    pub probe_backend: ProbeBackend,
    pub probe_workers: usize,
    pub webp_quality: u8,
    pub dry_run: bool,
}

impl RunConfig {
    /// `output` is resolved with [`resolve_output_dir`]; `replace_in_place`
    /// selects [`OutputPlacement::InPlace`], otherwise the default placement.
    pub fn new(source_dir: impl Into<PathBuf>, output: impl AsRef<Path>, replace_in_place: bool) -> Self {
        let source_dir = absolutize(source_dir.into());
        let output_dir = resolve_output_dir(&source_dir, output.as_ref());
        let placement = if replace_in_place {
            OutputPlacement::InPlace
        } else {
            OutputPlacement::default()
        };

        Self {
            source_dir,
            output_dir,
            placement,
            extensions: ExtensionSets::default(),
            probe_backend: ProbeBackend::default(),
            probe_workers: default_probe_workers(),
            webp_quality: DEFAULT_WEBP_QUALITY,
            dry_run: false,
        }
    }

    pub fn with_placement(mut self, placement: OutputPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionSets) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_probe_workers(mut self, workers: usize) -> Self {
        self.probe_workers = workers.max(1);
        self
    }

    pub fn replace_in_place(&self) -> bool {
        self.placement == OutputPlacement::InPlace
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.output_dir.join(CATALOG_FILE_NAME)
    }

    pub fn failed_reports_dir(&self) -> PathBuf {
        self.output_dir.join(FAILED_REPORTS_DIR)
    }
}

/// Half the cores, at least one.
pub fn default_probe_workers() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Absolute outputs are kept; relative ones live next to the source directory.
pub fn resolve_output_dir(source_dir: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        return output.to_path_buf();
    }
    match source_dir.parent() {
        Some(parent) => parent.join(output),
        None => source_dir.join(output),
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_case_insensitive() {
        let sets = ExtensionSets::default();
        assert_eq!(sets.category_of(Path::new("/a/x.PNG")), Category::Image);
        assert_eq!(sets.category_of(Path::new("/a/x.Jpeg")), Category::Image);
        assert_eq!(sets.category_of(Path::new("/a/y.MKV")), Category::Video);
        assert_eq!(sets.category_of(Path::new("/a/z.txt")), Category::Other);
    }

    #[test]
    fn test_no_extension_is_other() {
        let sets = ExtensionSets::default();
        assert_eq!(sets.category_of(Path::new("/a/Makefile")), Category::Other);
        assert_eq!(sets.category_of(Path::new("/a/.png")), Category::Other);
    }

    #[test]
    fn test_custom_extension_sets() {
        let sets = ExtensionSets::new([".HEIC", " tiff "], ["mov"]);
        assert_eq!(sets.images(), &["heic".to_string(), "tiff".to_string()]);
        assert_eq!(sets.category_of(Path::new("/a/x.heic")), Category::Image);
        assert_eq!(sets.category_of(Path::new("/a/x.png")), Category::Other);
        assert_eq!(sets.category_of(Path::new("/a/x.MOV")), Category::Video);
    }

    #[test]
    fn test_relative_output_sits_next_to_source() {
        let resolved = resolve_output_dir(Path::new("/media/photos"), Path::new("converted"));
        assert_eq!(resolved, PathBuf::from("/media/converted"));

        let resolved = resolve_output_dir(Path::new("/media/photos"), Path::new("/tmp/out"));
        assert_eq!(resolved, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_replace_selects_in_place() {
        let config = RunConfig::new("/media/photos", DEFAULT_OUTPUT_DIR, true);
        assert_eq!(config.placement, OutputPlacement::InPlace);
        assert!(config.replace_in_place());

        let config = RunConfig::new("/media/photos", DEFAULT_OUTPUT_DIR, false);
        assert_eq!(config.placement, OutputPlacement::MirroredToOutputDir);
        assert_eq!(config.catalog_path(), PathBuf::from("/media/converted/files.db"));
    }
}
