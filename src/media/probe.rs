use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::foundation::core::{FrameRate, Sar};
use crate::foundation::error::{VeditError, VeditResult};
use crate::media::backend::MediaBackend;

/// Raw answer from the metadata boundary, before normalisation.
///
/// `width`/`height` describe the first video stream and are 0 when there is none;
/// `audio_channels` describes the first audio stream.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbeReport {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub sar_num: u32,
    pub sar_den: u32,
    pub frame_rate: Option<FrameRate>,
    pub audio_channels: Option<u16>,
}

/// An input media file and its intrinsic properties.
///
/// Created once per absolute path by [`MetadataResolver`] and shared through `Arc` afterwards.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Source {
    /// Absolute path.
    pub path: PathBuf,
    /// Width of the first video stream, 0 for audio-only files.
    pub width: u32,
    /// Height of the first video stream, 0 for audio-only files.
    pub height: u32,
    /// Container duration, seconds.
    pub duration: f64,
    /// Normalised sample aspect ratio.
    pub sar: Sar,
    /// Frame rate of the first video stream.
    pub frame_rate: Option<FrameRate>,
    /// Channel count of the first audio stream.
    pub audio_channels: Option<u16>,
}

impl Source {
    /// `true` when the file has a usable video stream.
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// `true` when the file has an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio_channels.is_some_and(|c| c > 0)
    }

    pub(crate) fn from_report(path: PathBuf, report: ProbeReport) -> VeditResult<Self> {
        let has_video = report.width > 0 && report.height > 0;
        let has_audio = report.audio_channels.is_some_and(|c| c > 0);
        if !has_video && !has_audio {
            return Err(VeditError::probe(format!(
                "'{}' has no video or audio streams",
                path.display()
            )));
        }
        if !report.duration.is_finite() || report.duration < 0.0 {
            return Err(VeditError::probe(format!(
                "'{}' reported invalid duration {}",
                path.display(),
                report.duration
            )));
        }
        let sar = if report.sar_den == 0 {
            Sar::SQUARE
        } else {
            Sar {
                num: report.sar_num,
                den: report.sar_den,
            }
            .normalized()
        };
        Ok(Self {
            path,
            width: if has_video { report.width } else { 0 },
            height: if has_video { report.height } else { 0 },
            duration: report.duration,
            sar,
            frame_rate: report.frame_rate,
            audio_channels: report.audio_channels.filter(|c| *c > 0),
        })
    }
}

/// Make `path` absolute without touching the filesystem.
pub fn absolute_path(path: &Path) -> VeditResult<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        VeditError::probe(format!("cannot make '{}' absolute: {e}", path.display()))
    })
}

/// Memoizing front of the metadata boundary.
///
/// Each absolute path is probed at most once for the lifetime of the resolver; later calls get
/// the same [`Source`] instance.
pub struct MetadataResolver {
    backend: Arc<dyn MediaBackend>,
    memo: Mutex<HashMap<PathBuf, Arc<Source>>>,
}

impl MetadataResolver {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Probe `path` (or return the memoized result).
    pub fn resolve(&self, path: &Path) -> VeditResult<Arc<Source>> {
        let abs = absolute_path(path)?;
        if let Some(hit) = self.lock().get(&abs) {
            return Ok(Arc::clone(hit));
        }

        tracing::debug!(path = %abs.display(), "probing source");
        let report = self.backend.probe(&abs)?;
        let source = Arc::new(Source::from_report(abs.clone(), report)?);

        // A racing caller may have inserted first; keep whichever landed first.
        let mut memo = self.lock();
        let entry = memo.entry(abs).or_insert(source);
        Ok(Arc::clone(entry))
    }

    /// Number of memoized sources.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every memoized source.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<Source>>> {
        self.memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/probe.rs"]
mod tests;
