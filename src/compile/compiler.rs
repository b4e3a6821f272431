use std::collections::{BTreeMap, BTreeSet};

use crate::cache::store::FingerprintCache;
use crate::compile::fingerprint::{Fingerprint, FingerprintInput, fingerprint_excerpt};
use crate::compile::plan::{
    BaseInput, Caption, ComposeStep, DEFAULT_BATCH_LIMIT, FadeWindow, Layer, LayerInput,
    LayerPosition, RegionFinish, RegionPlan, RenderPlan, TrackMix, TranscodeJob,
};
use crate::foundation::error::{VeditError, VeditResult};
use crate::resolve::resolved::{ExcerptPlacement, ResolvedExcerpt, ResolvedPlan, ResolvedRegion};
use crate::scene::model::WatermarkContent;

/// Knobs for [`compile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Maximum overlay layers per compose invocation.
    pub batch_limit: usize,
    /// Schedule every transcode even when the cache holds it.
    pub force: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            force: false,
        }
    }
}

/// Lower a resolved plan into transcode jobs and batched compose steps.
///
/// Excerpts that hash to the same fingerprint are transcoded once, however many regions use
/// them. With a cache, fingerprints it already holds are listed under
/// [`RenderPlan::cached`] instead of being scheduled. Zero-duration child regions are skipped.
#[tracing::instrument(skip_all, fields(regions = plan.regions.len(), batch_limit = opts.batch_limit))]
pub fn compile(
    plan: &ResolvedPlan,
    cache: Option<&FingerprintCache>,
    opts: &CompileOptions,
) -> VeditResult<RenderPlan> {
    if opts.batch_limit == 0 {
        return Err(VeditError::validation("batch limit must be >= 1"));
    }

    let mut out = RenderPlan {
        transcodes: Vec::new(),
        cached: BTreeMap::new(),
        regions: Vec::with_capacity(plan.order.len()),
        root: plan.root,
        output: plan.output.path.clone(),
        duration: plan.output.duration,
    };
    let mut seen = BTreeSet::new();

    for &id in &plan.order {
        let region = plan
            .region(id)
            .ok_or_else(|| VeditError::composition(format!("unknown region {}", id.0)))?;
        if region.is_noop() {
            tracing::debug!(region = id.0, "skipping zero-duration region");
            continue;
        }

        let mut layers = Vec::new();
        for ex in &region.excerpts {
            let fp = excerpt_fingerprint(plan, region, ex);
            if seen.insert(fp) {
                let hit = if opts.force {
                    None
                } else {
                    cache.and_then(|c| c.lookup(fp))
                };
                match hit {
                    Some(path) => {
                        out.cached.insert(fp, path);
                    }
                    None => out.transcodes.push(TranscodeJob {
                        fingerprint: fp,
                        source: ex.source.path.clone(),
                        start: ex.start,
                        end: ex.end,
                        transform: ex.transform.clone(),
                        pixel_format: plan.output.pixel_format.clone(),
                        include_audio: ex.include_audio,
                    }),
                }
            }
            layers.push(excerpt_layer(plan, ex, fp));
        }

        for &child_id in &region.children {
            let Some(child) = plan.region(child_id) else {
                continue;
            };
            if child.is_noop() {
                continue;
            }
            layers.push(Layer {
                input: LayerInput::Region(child_id),
                start: 0.0,
                duration: child.duration,
                position: LayerPosition::Fixed {
                    x: child.rect.x,
                    y: child.rect.y,
                },
                fade_in: None,
                fade_out: None,
                audio: plan.output.audio_channels.is_some(),
            });
        }

        for w in &region.watermarks {
            let input = match &w.content {
                WatermarkContent::Image { path } => LayerInput::Image(path.clone()),
                WatermarkContent::Solid {
                    color,
                    width,
                    height,
                } => LayerInput::Solid {
                    color: color.clone(),
                    width: *width,
                    height: *height,
                },
            };
            layers.push(Layer {
                input,
                start: 0.0,
                duration: region.duration,
                position: LayerPosition::Fixed { x: w.x, y: w.y },
                fade_in: w.fade_in.map(window),
                fade_out: w.fade_out.map(window),
                audio: false,
            });
        }

        let steps = batch_region(plan, region, layers, opts.batch_limit);
        out.regions.push(RegionPlan { region: id, steps });
    }

    tracing::info!(
        transcodes = out.transcodes.len(),
        cached = out.cached.len(),
        compose_steps = out.compose_count(),
        "compiled render plan"
    );
    Ok(out)
}

fn excerpt_fingerprint(plan: &ResolvedPlan, region: &ResolvedRegion, ex: &ResolvedExcerpt) -> Fingerprint {
    fingerprint_excerpt(&FingerprintInput {
        source: &ex.source.path,
        start: ex.start,
        end: ex.end,
        style: ex.policy.style,
        target_width: region.rect.width,
        target_height: region.rect.height,
        configured_pan: ex.policy.pan_direction,
        concrete_pan: ex.pan_direction,
        pixel_format: &plan.output.pixel_format,
        include_audio: ex.include_audio,
    })
}

fn excerpt_layer(plan: &ResolvedPlan, ex: &ResolvedExcerpt, fp: Fingerprint) -> Layer {
    let position = match &ex.placement {
        // Fitted transcodes already have the region's size.
        ExcerptPlacement::Fitted => LayerPosition::Fixed { x: 0, y: 0 },
        ExcerptPlacement::Cascade(slot) => LayerPosition::Sweep {
            sweep: slot.sweep,
            cross_offset: slot.cross_offset,
            tile_width: slot.tile_width,
            tile_height: slot.tile_height,
        },
    };
    Layer {
        input: LayerInput::Excerpt(fp),
        start: ex.timeline_start,
        duration: ex.duration(),
        position,
        fade_in: None,
        fade_out: None,
        audio: ex.include_audio && plan.output.audio_channels.is_some(),
    }
}

fn window((start, duration): (f64, f64)) -> FadeWindow {
    FadeWindow { start, duration }
}

/// Split `layers` into compose steps of at most `limit` overlays each. The first step draws
/// over the background, later ones over the previous step; the last one finishes the region.
fn batch_region(
    plan: &ResolvedPlan,
    region: &ResolvedRegion,
    layers: Vec<Layer>,
    limit: usize,
) -> Vec<ComposeStep> {
    let mut chunks: Vec<Vec<Layer>> = Vec::new();
    let mut iter = layers.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(limit).collect());
    }
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }

    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(batch, layers)| ComposeStep {
            region: region.id,
            batch,
            width: region.rect.width,
            height: region.rect.height,
            duration: region.duration,
            sar: plan.output.sar,
            pixel_format: plan.output.pixel_format.clone(),
            audio_channels: plan.output.audio_channels,
            base: if batch == 0 {
                BaseInput::Background {
                    color: region.background.color.clone(),
                    image: region.background.image.clone(),
                }
            } else {
                BaseInput::Previous
            },
            layers,
            finish: (batch == last).then(|| finish_region(plan, region)),
        })
        .collect()
}

fn finish_region(plan: &ResolvedPlan, region: &ResolvedRegion) -> RegionFinish {
    RegionFinish {
        audio_track: region.audio_track.as_ref().map(|t| TrackMix {
            path: t.source.path.clone(),
            fade_out: t.fade_out.map(window),
        }),
        caption: region.caption.as_ref().map(|c| Caption {
            text: c.text.clone(),
            start: c.start,
        }),
        normalize_audio: region.id == plan.root
            && plan.output.normalize_audio
            && plan.output.audio_channels.is_some(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/compiler.rs"]
mod tests;
