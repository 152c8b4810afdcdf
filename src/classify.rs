use crossbeam_channel::bounded;
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, warn};

use crate::config::ExtensionSets;
use crate::error::ProbeError;
use crate::probe::{ProbeClient, HEVC_CODEC, WEBP_MIME};
use crate::record::{Category, FileRecord};

/// Files split by category, each list in traversal order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Classified {
    pub images: Vec<FileRecord>,
    pub videos: Vec<FileRecord>,
    pub others: Vec<FileRecord>,
}

impl Classified {
    pub fn len(&self) -> usize {
        self.images.len() + self.videos.len() + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records back in traversal order.
    pub fn into_records(self) -> Vec<FileRecord> {
        let mut records = self.images;
        records.extend(self.videos);
        records.extend(self.others);
        // Stable, so equal positions keep category order
        records.sort_by_key(|r| r.position);
        records
    }
}

/// Split by extension only. No probing.
pub fn categorize(files: Vec<FileRecord>, extensions: &ExtensionSets) -> Classified {
    let mut classified = Classified::default();

    for mut file in files {
        file.category = extensions.category_of(&file.path);
        match file.category {
            Category::Image => classified.images.push(file),
            Category::Video => classified.videos.push(file),
            Category::Other => classified.others.push(file),
        }
    }

    classified
}

/// Split by extension, then probe every image and video.
///
/// A failed probe leaves the file in its category with `converted == false`.
/// `workers > 1` probes on a thread pool; results are applied in traversal
/// order either way.
pub fn classify(
    files: Vec<FileRecord>,
    extensions: &ExtensionSets,
    probe: &dyn ProbeClient,
    workers: usize,
) -> Classified {
    let mut classified = categorize(files, extensions);
    probe_records(&mut classified.images, probe, workers);
    probe_records(&mut classified.videos, probe, workers);
    classified
}

type ProbeOutcome = Result<String, ProbeError>;

fn probe_records(records: &mut [FileRecord], probe: &dyn ProbeClient, workers: usize) {
    let outcomes: Vec<ProbeOutcome> = if workers <= 1 || records.len() <= 1 {
        records
            .iter()
            .map(|r| run_probe(probe, &r.path, r.category))
            .collect()
    } else {
        probe_parallel(records, probe, workers)
    };

    for (record, outcome) in records.iter_mut().zip(outcomes) {
        apply_outcome(record, outcome);
    }
}

fn run_probe(probe: &dyn ProbeClient, path: &std::path::Path, category: Category) -> ProbeOutcome {
    match category {
        Category::Image => probe.probe_mime(path),
        Category::Video => probe.probe_video_codec(path),
        Category::Other => Err(ProbeError::new(path, "not a media file")),
    }
}

fn probe_parallel(records: &[FileRecord], probe: &dyn ProbeClient, workers: usize) -> Vec<ProbeOutcome> {
    let items: Vec<(usize, PathBuf, Category)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, r.path.clone(), r.category))
        .collect();
    let total = items.len();
    let workers = workers.min(total);

    let mut outcomes: Vec<Option<ProbeOutcome>> = (0..total).map(|_| None).collect();

    thread::scope(|scope| {
        let (work_sender, work_receiver) = bounded::<(usize, PathBuf, Category)>(workers * 2);
        let (result_sender, result_receiver) = bounded::<(usize, ProbeOutcome)>(workers * 2);

        for _ in 0..workers {
            let work_rx = work_receiver.clone();
            let result_tx = result_sender.clone();
            scope.spawn(move || {
                for (index, path, category) in work_rx {
                    let outcome = run_probe(probe, &path, category);
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }

        drop(work_receiver);
        drop(result_sender);

        scope.spawn(move || {
            for item in items {
                if work_sender.send(item).is_err() {
                    break;
                }
            }
        });

        for (index, outcome) in result_receiver {
            outcomes[index] = Some(outcome);
        }
    });

    outcomes
        .into_iter()
        .zip(records)
        .map(|(outcome, record)| {
            outcome.unwrap_or_else(|| Err(ProbeError::new(&record.path, "probe worker exited early")))
        })
        .collect()
}

fn apply_outcome(record: &mut FileRecord, outcome: ProbeOutcome) {
    match (record.category, outcome) {
        (Category::Image, Ok(mime)) => {
            record.converted = mime == WEBP_MIME;
            record.mime_type = Some(mime);
        }
        (Category::Video, Ok(codec)) => {
            record.converted = codec == HEVC_CODEC;
            record.codec = Some(codec);
        }
        (_, Ok(_)) => {}
        (_, Err(err)) => {
            warn!("{}; treating as not converted", err);
            record.converted = false;
        }
    }

    debug!(
        path = %record.path.display(),
        category = %record.category,
        detected = record.codec_or_mime().unwrap_or("-"),
        converted = record.converted,
        "classified"
    );
}
