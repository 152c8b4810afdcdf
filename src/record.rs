use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Media category, decided by file extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Video,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Video => "video",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file seen during a run.
///
/// Created by the traverser with only `path` set, then filled in by the
/// classifier. Not touched again once the catalog has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub mime_type: Option<String>,
    pub codec: Option<String>,
    pub converted: bool,
    pub category: Category,
    /// Index in traversal order.
    #[serde(skip)]
    pub position: usize,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
            codec: None,
            converted: false,
            category: Category::Other,
            position: 0,
        }
    }

    /// A record for the `position`-th file found by the traverser.
    pub fn at(position: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            position,
            ..Self::new(path)
        }
    }

    /// Codec when one was probed, otherwise the MIME type.
    pub fn codec_or_mime(&self) -> Option<&str> {
        self.codec.as_deref().or(self.mime_type.as_deref())
    }
}
