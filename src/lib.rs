//! vedit is a declarative video composition engine built around nested regions.
//!
//! A [`Composition`] is a tree of rectangular, time-bounded regions. Each region shows excerpts
//! of source media (fitted by crop, pad, pan or an overlay cascade), child regions, watermarks,
//! an optional audio track and a caption. vedit never touches pixels itself: it turns the tree
//! into a render plan of atomic jobs and hands them to a [`MediaBackend`].
//!
//! # Pipeline overview
//!
//! 1. **Resolve**: `Composition + MetadataResolver -> ResolvedPlan` (geometry, timing, fits)
//! 2. **Compile**: `ResolvedPlan -> RenderPlan` (fingerprinted transcodes, batched compose steps)
//! 3. **Execute**: transcodes run in parallel through the [`FingerprintCache`], compose steps run
//!    children-first, and the root output is published atomically
//!
//! The shipped backend, [`FfmpegBackend`], drives the system `ffprobe` and `ffmpeg` binaries.
#![forbid(unsafe_code)]

mod cache;
mod compile;
mod distribute;
mod encode;
mod foundation;
mod layout;
mod media;
mod render;
mod resolve;
mod scene;

pub use cache::store::{CacheEntry, FingerprintCache, INDEX_FILE, clear_dir};
pub use compile::compiler::{CompileOptions, compile};
pub use compile::fingerprint::{Fingerprint, FingerprintInput, fingerprint_excerpt};
pub use compile::plan::{
    BaseInput, Caption, ComposeJob, ComposeStep, DEFAULT_BATCH_LIMIT, FadeWindow, Layer,
    LayerInput, LayerPosition, RegionFinish, RegionPlan, RenderPlan, TrackMix, TranscodeJob,
};
pub use distribute::{BALANCE_FACTOR, DistributeOpts, distribute_excerpts};
pub use encode::ffmpeg::{FfmpegBackend, FfmpegOpts, is_ffmpeg_on_path};
pub use foundation::core::{Color, FrameRate, PixelFormat, PixelRect, Sar};
pub use foundation::error::{VeditError, VeditResult};
pub use foundation::random::{RandomSource, Rng64, shuffle};
pub use layout::cascade::{
    CascadeItem, CascadeParams, CascadeSlot, MAX_SIZE_FACTOR, MIN_SIZE_FACTOR, Sweep, schedule,
    schedule_times,
};
pub use layout::fit::{Axis, FitTransform, PanMotion, SNAP_PX, fit, scaled_size};
pub use media::backend::MediaBackend;
pub use media::probe::{MetadataResolver, ProbeReport, Source, absolute_path};
pub use render::pipeline::{PreparedRender, RenderOpts, RenderReport, plan, render};
pub use resolve::resolved::{
    Advisory, AdvisoryKind, ExcerptPlacement, ResolvedAudioTrack, ResolvedCaption,
    ResolvedExcerpt, ResolvedOutput, ResolvedPlan, ResolvedRegion, ResolvedWatermark,
};
pub use resolve::tree::{TAIL_SECONDS, resolve};
pub use scene::builder::{CompositionBuilder, CompositionDef, RegionBuilder, RegionDef};
pub use scene::model::{
    Anchor, Background, CascadeDirection, Composition, DisplayPolicy, DisplayStyle, Excerpt,
    Fade, OutputSpec, PanDirection, Placement, Region, RegionId, Watermark, WatermarkContent,
};
