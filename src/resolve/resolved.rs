use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::core::{PixelFormat, PixelRect, Sar};
use crate::layout::cascade::CascadeSlot;
use crate::layout::fit::FitTransform;
use crate::media::probe::Source;
use crate::scene::model::{Background, DisplayPolicy, PanDirection, RegionId, WatermarkContent};

/// Category of a non-fatal resolution finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// Sources disagree on SAR and no output SAR was given; 1:1 was used.
    MixedSar,
    /// The explicit output SAR differs from a source SAR.
    SarOverride,
    /// Audio streams disagree on channel count; the output is mono.
    MixedChannels,
    /// An excerpt asked for audio but its source has none.
    MissingAudio,
    /// A background image is not the size of its region.
    BackgroundSize,
    /// A child region extends past its parent.
    OutsideParent,
    /// Cascade excerpts in one region disagree on concurrency or gap.
    CascadeParams,
}

/// A documented-default decision surfaced to the caller.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub region: Option<RegionId>,
    pub message: String,
}

/// How an excerpt is positioned over time.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcerptPlacement {
    /// Fitted to the whole region, playing from `timeline_start`.
    Fitted,
    /// A cascade tile.
    Cascade(CascadeSlot),
}

/// An excerpt with everything downstream needs: source, clamped range, materialized policy,
/// concrete pan direction, geometry and timing.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedExcerpt {
    pub source: Arc<Source>,
    /// Clamped source start, seconds.
    pub start: f64,
    /// Absolute source end, seconds.
    pub end: f64,
    pub policy: DisplayPolicy,
    /// Direction actually used for a PAN excerpt that overscans.
    pub pan_direction: Option<PanDirection>,
    /// `policy.include_audio` and the source has audio.
    pub include_audio: bool,
    pub transform: FitTransform,
    /// Region time this excerpt starts playing at.
    pub timeline_start: f64,
    pub placement: ExcerptPlacement,
}

impl ResolvedExcerpt {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.duration()
    }
}

/// A watermark with its pixel position and fades in absolute region time.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedWatermark {
    pub content: WatermarkContent,
    pub x: i64,
    pub y: i64,
    /// `(start, duration)`, clamped to the region.
    pub fade_in: Option<(f64, f64)>,
    pub fade_out: Option<(f64, f64)>,
}

/// An external audio track and its end-of-region ramp.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedAudioTrack {
    pub source: Arc<Source>,
    /// `(start, duration)` of the fade to silence, set when the track outlasts the region.
    pub fade_out: Option<(f64, f64)>,
}

/// Attribution text and the region time it appears at.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedCaption {
    pub text: String,
    pub start: f64,
}

/// One region after resolution.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedRegion {
    pub id: RegionId,
    pub parent: Option<RegionId>,
    /// Placement relative to the parent.
    pub rect: PixelRect,
    /// Placement in root coordinates.
    pub absolute: PixelRect,
    pub duration: f64,
    /// `(explicit z-index or creation sequence, creation sequence)`, ascending is bottom to top.
    pub z_key: (i64, u32),
    pub background: Background,
    /// Fitted excerpts in play order, then cascade tiles in schedule order.
    pub excerpts: Vec<ResolvedExcerpt>,
    /// Children bottom to top.
    pub children: Vec<RegionId>,
    pub watermarks: Vec<ResolvedWatermark>,
    pub audio_track: Option<ResolvedAudioTrack>,
    pub caption: Option<ResolvedCaption>,
}

impl ResolvedRegion {
    /// A non-root region that resolved to zero duration contributes nothing.
    pub fn is_noop(&self) -> bool {
        self.parent.is_some() && self.duration <= 0.0
    }
}

/// The output contract reconciled across all inputs.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedOutput {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub sar: Sar,
    pub pixel_format: PixelFormat,
    /// `None` when nothing contributes audio.
    pub audio_channels: Option<u16>,
    pub normalize_audio: bool,
}

/// Absolute, time-stamped, z-ordered description of a composition.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedPlan {
    /// Indexed by [`RegionId`].
    pub regions: Vec<ResolvedRegion>,
    pub root: RegionId,
    /// Post-order (children before parents, siblings bottom to top).
    pub order: Vec<RegionId>,
    pub output: ResolvedOutput,
    pub advisories: Vec<Advisory>,
}

impl ResolvedPlan {
    pub fn region(&self, id: RegionId) -> Option<&ResolvedRegion> {
        self.regions.get(id.index())
    }

    pub fn has_advisory(&self, kind: AdvisoryKind) -> bool {
        self.advisories.iter().any(|a| a.kind == kind)
    }
}
