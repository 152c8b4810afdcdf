//! Walk a directory tree, work out which images and videos still need
//! converting (images to WebP, videos to HEVC), convert them and keep a
//! SQLite catalog of everything seen.

pub mod args;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod failed;
pub mod filename;
pub mod pipeline;
pub mod probe;
pub mod record;
pub mod traverse;

pub use config::{OutputPlacement, RunConfig};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunReport};
pub use record::{Category, FileRecord};
