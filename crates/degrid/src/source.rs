use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use degrid_types::{CaptureTime, FrameMeta};
use tracing::{debug, warn};

use crate::settings::InputSettings;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

/// A scanned frame found on disk, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSource {
    pub meta: FrameMeta,
    pub image_path: PathBuf,
    /// First existing sidecar candidate, if any.
    pub sidecar_path: Option<PathBuf>,
}

/// Parse `SAT.YEAR.DOY.HHMMSS.BAND[.suffix].EXT`.
pub fn parse_frame_name(file_name: &str) -> Option<FrameMeta> {
    let parts: Vec<&str> = file_name.split('.').collect();
    if parts.len() < 6 {
        return None;
    }
    let ext = parts[parts.len() - 1];
    if !IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    {
        return None;
    }
    let satellite = parts[0];
    let band = parts[4];
    if satellite.is_empty() || band.is_empty() {
        return None;
    }
    let year = fixed_digits(parts[1], 4)?;
    let day_of_year = fixed_digits(parts[2], 3)?;
    let hhmmss = fixed_digits(parts[3], 6)?;
    let (hours, minutes, seconds) = (hhmmss / 10_000, (hhmmss / 100) % 100, hhmmss % 100);
    if !(1..=366).contains(&day_of_year) || hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    Some(FrameMeta {
        satellite: satellite.to_string(),
        capture: CaptureTime {
            year: year as u16,
            day_of_year: day_of_year as u16,
            seconds_of_day: hours * 3600 + minutes * 60 + seconds,
        },
        band: band.to_string(),
    })
}

fn fixed_digits(value: &str, len: usize) -> Option<u32> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Sidecar names tried for a frame, in order.
pub fn sidecar_candidates(image_path: &Path, meta: &FrameMeta) -> Vec<PathBuf> {
    let dir = image_path.parent().unwrap_or_else(|| Path::new(""));
    let mut candidates = vec![dir.join(format!("{}.json", meta.frame_id()))];
    if let Some(stem) = image_path.file_stem() {
        let mut by_stem = stem.to_os_string();
        by_stem.push(".json");
        let by_stem = dir.join(by_stem);
        if !candidates.contains(&by_stem) {
            candidates.push(by_stem);
        }
    }
    candidates
}

/// Recursively collect frames under `dir` that match the input filters, in capture order.
///
/// Bands are independent frames. With a preferred satellite configured, only it and the
/// alternate are kept, and the preferred one wins when both captured the same instant in the
/// same band.
pub fn discover_frames(dir: &Path, input: &InputSettings) -> io::Result<Vec<FrameSource>> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;

    let mut by_capture: BTreeMap<CaptureKey, FrameSource> = BTreeMap::new();
    for path in files {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !has_image_extension(&path) {
            continue;
        }
        let Some(meta) = parse_frame_name(file_name) else {
            warn!(path = %path.display(), "skipping file with unrecognized frame name");
            continue;
        };
        if !accepts(input, &meta) {
            continue;
        }
        let Some(rank) = satellite_rank(input, &meta.satellite) else {
            continue;
        };
        let sidecar_path = sidecar_candidates(&path, &meta)
            .into_iter()
            .find(|candidate| candidate.is_file());
        let key = (
            meta.capture,
            meta.band.to_ascii_lowercase(),
            rank,
            meta.satellite.clone(),
        );
        let source = FrameSource {
            meta,
            image_path: path,
            sidecar_path,
        };
        if let Some(previous) = by_capture.insert(key, source) {
            warn!(
                skipped = %previous.image_path.display(),
                "another file holds the same satellite, capture and band; keeping the later path"
            );
        }
    }

    let preferring = input.satellite.is_some();
    let mut frames: Vec<FrameSource> = Vec::with_capacity(by_capture.len());
    for ((capture, band, rank, _), source) in by_capture {
        if preferring
            && rank > 0
            && frames.last().is_some_and(|kept| {
                kept.meta.capture == capture && kept.meta.band.eq_ignore_ascii_case(&band)
            })
        {
            debug!(frame = %source.meta.frame_id(), "alternate satellite frame superseded");
            continue;
        }
        frames.push(source);
    }
    Ok(frames)
}

type CaptureKey = (CaptureTime, String, u8, String);

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn accepts(input: &InputSettings, meta: &FrameMeta) -> bool {
    if let Some(band) = &input.band
        && !meta.band.eq_ignore_ascii_case(band)
    {
        return false;
    }
    let day = meta.capture.day_of_year;
    input.start_day.is_none_or(|start| day >= start) && input.end_day.is_none_or(|end| day <= end)
}

/// 0 for the preferred satellite, 1 for the alternate, `None` for anything else.
fn satellite_rank(input: &InputSettings, satellite: &str) -> Option<u8> {
    match (&input.satellite, &input.alternate_satellite) {
        (None, _) => Some(0),
        (Some(main), _) if main.eq_ignore_ascii_case(satellite) => Some(0),
        (Some(_), Some(alt)) if alt.eq_ignore_ascii_case(satellite) => Some(1),
        _ => None,
    }
}
