use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::compile::fingerprint::Fingerprint;
use crate::foundation::core::{Color, PixelFormat, Sar};
use crate::layout::cascade::Sweep;
use crate::layout::fit::FitTransform;
use crate::scene::model::RegionId;

/// Default maximum number of overlay layers in one compose invocation.
pub const DEFAULT_BATCH_LIMIT: usize = 16;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Compiled, backend-agnostic description of a whole render.
///
/// A plan consists of:
/// - deduplicated transcode jobs for fingerprints that missed the cache (`transcodes`)
/// - artifacts reused from the cache (`cached`)
/// - per-region compose steps, children before parents (`regions`)
///
/// Every transcode must finish before the first compose step runs.
pub struct RenderPlan {
    /// Transcodes to run, one per distinct missing fingerprint.
    pub transcodes: Vec<TranscodeJob>,
    /// Cache hits.
    pub cached: BTreeMap<Fingerprint, PathBuf>,
    /// Compose work in dependency order; the last entry is the root.
    pub regions: Vec<RegionPlan>,
    /// Root region.
    pub root: RegionId,
    /// Final destination.
    pub output: PathBuf,
    /// Output duration, seconds.
    pub duration: f64,
}

impl RenderPlan {
    /// Total number of compose invocations.
    pub fn compose_count(&self) -> usize {
        self.regions.iter().map(|r| r.steps.len()).sum()
    }

    /// Every fingerprint referenced by any layer.
    pub fn referenced_fingerprints(&self) -> Vec<Fingerprint> {
        let mut out: Vec<Fingerprint> = self
            .regions
            .iter()
            .flat_map(|r| r.steps.iter())
            .flat_map(|s| s.layers.iter())
            .filter_map(|l| match l.input {
                LayerInput::Excerpt(fp) => Some(fp),
                _ => None,
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// One excerpt cut, fitted and re-encoded at the fixed output rate and quality.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct TranscodeJob {
    pub fingerprint: Fingerprint,
    pub source: PathBuf,
    /// Source offset, seconds.
    pub start: f64,
    /// Absolute source end, seconds.
    pub end: f64,
    pub transform: FitTransform,
    pub pixel_format: PixelFormat,
    pub include_audio: bool,
}

impl TranscodeJob {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Where a layer's frames come from.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerInput {
    /// A transcoded excerpt.
    Excerpt(Fingerprint),
    /// The composed output of a child region.
    Region(RegionId),
    /// A still image, looped.
    Image(PathBuf),
    /// A generated solid colour box.
    Solid {
        color: Color,
        width: u32,
        height: u32,
    },
}

/// Where a layer sits over time.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPosition {
    /// Fixed top-left corner.
    Fixed { x: i64, y: i64 },
    /// Scaled to a tile and swept across the region.
    Sweep {
        sweep: Sweep,
        cross_offset: i64,
        tile_width: u32,
        tile_height: u32,
    },
}

/// A linear opacity ramp.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct FadeWindow {
    pub start: f64,
    pub duration: f64,
}

/// One overlay in a compose step.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Layer {
    pub input: LayerInput,
    /// Region time the layer starts at, seconds.
    pub start: f64,
    /// How long the layer plays, seconds.
    pub duration: f64,
    pub position: LayerPosition,
    pub fade_in: Option<FadeWindow>,
    pub fade_out: Option<FadeWindow>,
    /// Mix this layer's audio stream.
    pub audio: bool,
}

impl Layer {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// What the first layer of a step is drawn over.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseInput {
    /// Generated background colour with an optional unscaled still image on top.
    Background { color: Color, image: Option<PathBuf> },
    /// Output of the previous step of the same region.
    Previous,
}

/// External audio track mixed under a region.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct TrackMix {
    pub path: PathBuf,
    pub fade_out: Option<FadeWindow>,
}

/// Bottom-left attribution text.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Caption {
    pub text: String,
    /// Region time the text appears at.
    pub start: f64,
}

/// Work that happens once per region, on its last step.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct RegionFinish {
    pub audio_track: Option<TrackMix>,
    pub caption: Option<Caption>,
    /// Dynamic loudness normalisation; only ever set on the root.
    pub normalize_audio: bool,
}

/// One compose invocation: a base plus at most `batch_limit` layers.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ComposeStep {
    pub region: RegionId,
    /// Position of this step within its region, from 0.
    pub batch: usize,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub sar: Sar,
    pub pixel_format: PixelFormat,
    /// Output channel count, `None` for a silent render.
    pub audio_channels: Option<u16>,
    pub base: BaseInput,
    /// Bottom to top.
    pub layers: Vec<Layer>,
    pub finish: Option<RegionFinish>,
}

/// All steps of one region, applied in order.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RegionPlan {
    pub region: RegionId,
    pub steps: Vec<ComposeStep>,
}

/// A [`ComposeStep`] with its inputs resolved to files, as handed to the backend.
#[derive(Clone, Debug)]
pub struct ComposeJob<'a> {
    pub step: &'a ComposeStep,
    /// File behind [`BaseInput::Previous`].
    pub previous: Option<&'a Path>,
    /// File behind each layer, parallel to `step.layers`; `None` for generated inputs.
    pub inputs: Vec<Option<PathBuf>>,
}

impl<'a> ComposeJob<'a> {
    pub fn input(&self, layer: usize) -> Option<&Path> {
        self.inputs.get(layer).and_then(|p| p.as_deref())
    }
}
