use std::path::Path;

use crate::compile::plan::{ComposeJob, TranscodeJob};
use crate::foundation::error::VeditResult;
use crate::media::probe::ProbeReport;

/// The external media-processing collaborator.
///
/// The engine never touches pixels or samples itself: it probes sources, then hands atomic
/// transcode and compose jobs to an implementation of this trait. Implementations write their
/// result to the `out` path they are given; publishing that file (into the cache or to the final
/// destination) is the engine's job.
///
/// Any error returned from [`MediaBackend::transcode`] or [`MediaBackend::compose`] aborts the
/// render.
pub trait MediaBackend: Send + Sync {
    /// Report intrinsic properties of the first video and first audio stream of `path`.
    fn probe(&self, path: &Path) -> VeditResult<ProbeReport>;

    /// Cut, fit and re-encode one excerpt into `out`.
    fn transcode(&self, job: &TranscodeJob, out: &Path) -> VeditResult<()>;

    /// Layer one batch of inputs over a base and encode the result into `out`.
    fn compose(&self, job: &ComposeJob<'_>, out: &Path) -> VeditResult<()>;
}
