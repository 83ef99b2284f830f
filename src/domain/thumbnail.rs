use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Everything one pipeline run needs. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source_url: String,
    pub output_path: PathBuf,
    pub snapshot_count: usize,
    pub thumb_height: u32,
    pub gif_framerate: u32,
}

/// Identity of a video being processed. Exact, case-sensitive match on the
/// normalized source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey(String);

impl RunKey {
    pub fn new(normalized_url: impl Into<String>) -> Self {
        Self(normalized_url.into())
    }
}

impl From<&Url> for RunKey {
    fn from(url: &Url) -> Self {
        Self(url.as_str().to_owned())
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One frame of the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub index: usize,
    pub timestamp_seconds: f64,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Capture,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Probe => "probe",
            Stage::Capture => "capture",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Prefix shared by every frame file in a scratch directory.
pub const FRAME_PREFIX: &str = "thumb-";
pub const FRAME_EXTENSION: &str = "jpg";

/// Splits `duration` into `count` equal slices and samples each midpoint:
/// `duration / count * (i + 0.5)`.
pub fn snapshot_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let slice = duration / count as f64;
    (0..count).map(|i| slice * (i as f64 + 0.5)).collect()
}

/// Path of frame `index` inside `scratch_dir`.
pub fn frame_path(scratch_dir: &Path, index: usize) -> PathBuf {
    scratch_dir.join(format!("{}{}.{}", FRAME_PREFIX, index, FRAME_EXTENSION))
}

/// Numbered input pattern matching every `frame_path` in `scratch_dir`.
pub fn frame_pattern(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(format!("{}%d.{}", FRAME_PREFIX, FRAME_EXTENSION))
}

/// Builds the ordered snapshot plan for a probed duration.
pub fn plan_snapshots(scratch_dir: &Path, duration: f64, count: usize) -> Vec<Snapshot> {
    snapshot_timestamps(duration, count)
        .into_iter()
        .enumerate()
        .map(|(index, timestamp_seconds)| Snapshot {
            index,
            timestamp_seconds,
            file_path: frame_path(scratch_dir, index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_for_forty_second_video() {
        assert_eq!(snapshot_timestamps(40.0, 4), vec![5.0, 15.0, 25.0, 35.0]);
    }

    #[test]
    fn test_timestamps_single_snapshot_is_midpoint() {
        assert_eq!(snapshot_timestamps(9.0, 1), vec![4.5]);
    }

    #[test]
    fn test_timestamps_strictly_increasing_and_in_range() {
        for &(duration, count) in &[(1.0, 1), (12.345, 7), (3600.0, 10), (0.5, 25)] {
            let ts = snapshot_timestamps(duration, count);
            assert_eq!(ts.len(), count);
            assert!(ts.windows(2).all(|w| w[0] < w[1]), "{:?}", ts);
            assert!(ts.iter().all(|&t| t >= 0.0 && t < duration), "{:?}", ts);
        }
    }

    #[test]
    fn test_timestamps_zero_count_is_empty() {
        assert!(snapshot_timestamps(10.0, 0).is_empty());
    }

    #[test]
    fn test_plan_snapshots_names_frames_by_index() {
        let dir = Path::new("/tmp/run");
        let plan = plan_snapshots(dir, 40.0, 4);

        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].file_path, PathBuf::from("/tmp/run/thumb-0.jpg"));
        assert_eq!(plan[3].file_path, PathBuf::from("/tmp/run/thumb-3.jpg"));
        assert_eq!(plan[2].timestamp_seconds, 25.0);
        assert_eq!(frame_pattern(dir), PathBuf::from("/tmp/run/thumb-%d.jpg"));
    }

    #[test]
    fn test_run_key_is_case_sensitive() {
        let a = Url::parse("https://allowed.example/Video.mp4").unwrap();
        let b = Url::parse("https://allowed.example/video.mp4").unwrap();
        assert_ne!(RunKey::from(&a), RunKey::from(&b));
        assert_eq!(RunKey::from(&a), RunKey::from(&a.clone()));
    }
}
