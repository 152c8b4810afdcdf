use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::OutputPlacement;
use crate::convert::JobKind;

/// Suffix appended to the full source file name for sibling and mirrored outputs.
pub fn target_suffix(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ImageToWebp => ".webp",
        JobKind::VideoToHevc => ".hevc.mp4",
    }
}

/// Extension that replaces the source's own when converting in place.
pub fn target_extension(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ImageToWebp => "webp",
        JobKind::VideoToHevc => "mp4",
    }
}

/// Compute where a converted file goes.
///
/// - `InPlace`: `<dir>/<stem>.<ext>`, may equal `source`
/// - `Sibling`: `<dir>/<file name><suffix>`
/// - `MirroredToOutputDir`: `<output_dir>/<path relative to source_root><suffix>`
pub fn target_path(
    source: &Path,
    source_root: &Path,
    output_dir: &Path,
    placement: OutputPlacement,
    kind: JobKind,
) -> PathBuf {
    match placement {
        OutputPlacement::InPlace => source.with_extension(target_extension(kind)),
        OutputPlacement::Sibling => append_suffix(source, target_suffix(kind)),
        OutputPlacement::MirroredToOutputDir => {
            // Paths outside the root keep only their file name
            let relative = source
                .strip_prefix(source_root)
                .ok()
                .map(Path::to_path_buf)
                .or_else(|| source.file_name().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("unnamed"));
            append_suffix(&output_dir.join(relative), target_suffix(kind))
        }
    }
}

/// Temporary file used when an in-place target would overwrite its own input.
pub fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = target
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = if ext.is_empty() {
        format!(".{}.converting", stem)
    } else {
        format!(".{}.converting.{}", stem, ext)
    };
    target.with_file_name(name)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Get the file extension from a path
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Path compared without regard to case, for filesystems that ignore it.
pub fn case_folded(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Whether `a` and `b` differ by case at most.
pub fn same_name_ignoring_case(a: &Path, b: &Path) -> bool {
    case_folded(a) == case_folded(b)
}

/// Find the first of `<stem>.<ext>`, `<stem>-1.<ext>`, ... next to `target`
/// that `is_taken` rejects.
pub fn find_available_target(target: &Path, is_taken: impl Fn(&Path) -> bool) -> anyhow::Result<PathBuf> {
    if !is_taken(target) {
        return Ok(target.to_path_buf());
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = get_extension(target);

    for counter in 1..10000 {
        let name = match &extension {
            Some(ext) => format!("{}-{}.{}", stem, counter, ext),
            None => format!("{}-{}", stem, counter),
        };
        let path = target.with_file_name(name);
        if !is_taken(&path) {
            return Ok(path);
        }
    }

    anyhow::bail!("Could not find available name for {}", target.display());
}

/// Find the next free `<name>.txt` (or `<name>-N.txt`) inside `dir`
pub fn find_available_report_name(dir: &Path, original_name: &str) -> anyhow::Result<PathBuf> {
    let base_path = dir.join(format!("{}.txt", original_name));
    if !base_path.exists() {
        return Ok(base_path);
    }

    for counter in 1..10000 {
        let path = dir.join(format!("{}-{}.txt", original_name, counter));
        if !path.exists() {
            return Ok(path);
        }
    }

    anyhow::bail!("Could not find available report name for {}", original_name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_keeps_full_name() {
        let target = target_path(
            Path::new("/a/x.png"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::Sibling,
            JobKind::ImageToWebp,
        );
        assert_eq!(target, PathBuf::from("/a/x.png.webp"));

        let target = target_path(
            Path::new("/a/y.mkv"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::Sibling,
            JobKind::VideoToHevc,
        );
        assert_eq!(target, PathBuf::from("/a/y.mkv.hevc.mp4"));
    }

    #[test]
    fn test_mirrored_preserves_subdirectories() {
        let target = target_path(
            Path::new("/a/b/w.jpg"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::MirroredToOutputDir,
            JobKind::ImageToWebp,
        );
        assert_eq!(target, PathBuf::from("/converted/b/w.jpg.webp"));
    }

    #[test]
    fn test_mirrored_outside_root_uses_file_name() {
        let target = target_path(
            Path::new("/elsewhere/w.jpg"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::MirroredToOutputDir,
            JobKind::ImageToWebp,
        );
        assert_eq!(target, PathBuf::from("/converted/w.jpg.webp"));
    }

    #[test]
    fn test_in_place_swaps_extension() {
        let target = target_path(
            Path::new("/a/x.png"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::InPlace,
            JobKind::ImageToWebp,
        );
        assert_eq!(target, PathBuf::from("/a/x.webp"));

        let target = target_path(
            Path::new("/a/y.mp4"),
            Path::new("/a"),
            Path::new("/converted"),
            OutputPlacement::InPlace,
            JobKind::VideoToHevc,
        );
        assert_eq!(target, PathBuf::from("/a/y.mp4"));
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/a/y.mp4")),
            PathBuf::from("/a/.y.converting.mp4")
        );
    }

    #[test]
    fn test_find_available_report_name() {
        let temp = tempfile::TempDir::new().unwrap();
        let first = find_available_report_name(temp.path(), "x.png").unwrap();
        assert_eq!(first, temp.path().join("x.png.txt"));

        std::fs::write(&first, "taken").unwrap();
        let second = find_available_report_name(temp.path(), "x.png").unwrap();
        assert_eq!(second, temp.path().join("x.png-1.txt"));
    }

    #[test]
    fn test_find_available_target_counts_past_taken_names() {
        let taken = ["/a/x.webp", "/a/x-1.webp"];
        let target = find_available_target(Path::new("/a/x.webp"), |p| {
            taken.iter().any(|t| Path::new(t) == p)
        })
        .unwrap();
        assert_eq!(target, PathBuf::from("/a/x-2.webp"));

        let free = find_available_target(Path::new("/a/y.webp"), |_| false).unwrap();
        assert_eq!(free, PathBuf::from("/a/y.webp"));
    }

    #[test]
    fn test_same_name_ignoring_case() {
        assert!(same_name_ignoring_case(Path::new("/a/clip.MP4"), Path::new("/a/clip.mp4")));
        assert!(!same_name_ignoring_case(Path::new("/a/x.png"), Path::new("/a/x.webp")));
    }
}
