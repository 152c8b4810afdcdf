use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    default_probe_workers, ExtensionSets, OutputPlacement, ProbeBackend, RunConfig,
    DEFAULT_IMAGE_EXTENSIONS, DEFAULT_OUTPUT_DIR, DEFAULT_VIDEO_EXTENSIONS, DEFAULT_WEBP_QUALITY,
};

#[derive(Debug, Parser)]
#[command(
    name = "assets-optimizer",
    version,
    about = "Optimize assets with various formats"
)]
pub struct Args {
    /// Source directory
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Output directory, relative paths sit next to the source directory
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Replace files in source directory
    #[arg(short, long, conflicts_with = "placement")]
    pub replace: bool,

    /// Where converted files are written
    #[arg(long, value_enum)]
    pub placement: Option<OutputPlacement>,

    /// Which utility probes file formats
    #[arg(long, value_enum, default_value_t = ProbeBackend::Command)]
    pub probe: ProbeBackend,

    /// Image extensions, comma separated
    #[arg(long = "image-ext", value_delimiter = ',', value_name = "EXT")]
    pub image_extensions: Option<Vec<String>>,

    /// Video extensions, comma separated
    #[arg(long = "video-ext", value_delimiter = ',', value_name = "EXT")]
    pub video_extensions: Option<Vec<String>>,

    /// Number of probe workers (default: half the CPU cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// WebP quality
    #[arg(short, long, default_value_t = DEFAULT_WEBP_QUALITY,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: u8,

    /// Plan conversions without running any encoder
    #[arg(long)]
    pub dry_run: bool,

    /// Write the run report as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the run configuration. The only place options are read.
    pub fn into_config(self) -> RunConfig {
        let extensions = match (self.image_extensions, self.video_extensions) {
            (None, None) => ExtensionSets::default(),
            (images, videos) => ExtensionSets::new(
                images.unwrap_or_else(|| to_owned(DEFAULT_IMAGE_EXTENSIONS)),
                videos.unwrap_or_else(|| to_owned(DEFAULT_VIDEO_EXTENSIONS)),
            ),
        };

        let mut config = RunConfig::new(self.dir, &self.output, self.replace)
            .with_extensions(extensions)
            .with_probe_workers(self.jobs.unwrap_or_else(default_probe_workers));
        if let Some(placement) = self.placement {
            config = config.with_placement(placement);
        }
        config.probe_backend = self.probe;
        config.webp_quality = self.quality;
        config.dry_run = self.dry_run;
        config
    }
}

fn to_owned(extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|e| e.to_string()).collect()
}
