use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::foundation::core::{PixelRect, Rect, Sar};
use crate::foundation::error::{VeditError, VeditResult};
use crate::foundation::random::RandomSource;
use crate::layout::cascade::{self, CascadeItem, CascadeParams};
use crate::layout::fit::{Axis, fit};
use crate::media::probe::{MetadataResolver, Source};
use crate::resolve::resolved::{
    Advisory, AdvisoryKind, ExcerptPlacement, ResolvedAudioTrack, ResolvedCaption,
    ResolvedExcerpt, ResolvedOutput, ResolvedPlan, ResolvedRegion, ResolvedWatermark,
};
use crate::scene::model::{
    Anchor, Composition, DisplayPolicy, DisplayStyle, Excerpt, Fade, PanDirection, Placement,
    Region, RegionId, Watermark, WatermarkContent,
};

/// Length of the closing audio fade and of the caption's on-screen time, seconds.
pub const TAIL_SECONDS: f64 = 5.0;

/// Whose policy an excerpt ended up with; PAN alternation is tracked per owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PolicyOwner {
    Excerpt(RegionId, usize),
    Region(RegionId),
}

/// Per-region state gathered top-down before durations are known.
struct Partial {
    excerpts: Vec<ResolvedExcerpt>,
    own_duration: f64,
    track: Option<Arc<Source>>,
}

struct Resolver<'a> {
    comp: &'a Composition,
    media: &'a MetadataResolver,
    rng: &'a mut dyn RandomSource,
    children: Vec<Vec<RegionId>>,
    pan_reverse_next: HashMap<PolicyOwner, bool>,
    advisories: Vec<Advisory>,
    /// Video source SARs in depth-first encounter order.
    sars: Vec<(RegionId, Sar)>,
}

/// Resolve a region tree into absolute, time-stamped, z-ordered regions.
///
/// Fails with [`VeditError::Composition`] on structural problems and [`VeditError::Probe`] on
/// unreadable sources, before any backend work is dispatched. Ambiguous inputs are resolved by
/// default policy and reported as [`Advisory`] values.
#[tracing::instrument(skip_all, fields(regions = comp.regions.len()))]
pub fn resolve(
    comp: &Composition,
    media: &MetadataResolver,
    rng: &mut dyn RandomSource,
) -> VeditResult<ResolvedPlan> {
    comp.validate()?;

    let mut children = vec![Vec::new(); comp.regions.len()];
    for (idx, region) in comp.regions.iter().enumerate() {
        if let Some(p) = region.parent {
            children[p.index()].push(RegionId(idx as u32));
        }
    }

    let mut r = Resolver {
        comp,
        media,
        rng,
        children,
        pan_reverse_next: HashMap::new(),
        advisories: Vec::new(),
        sars: Vec::new(),
    };
    r.run()
}

impl<'a> Resolver<'a> {
    fn run(&mut self) -> VeditResult<ResolvedPlan> {
        let root = self.comp.root;

        let mut pre_order = Vec::with_capacity(self.comp.regions.len());
        self.collect_pre_order(root, &mut pre_order);

        let mut partials: Vec<Option<Partial>> = Vec::new();
        partials.resize_with(self.comp.regions.len(), || None);
        for &id in &pre_order {
            let partial = self.resolve_content(id)?;
            partials[id.index()] = Some(partial);
        }

        let mut durations = vec![0.0; self.comp.regions.len()];
        self.resolve_duration(root, &partials, &mut durations)?;
        if durations[root.index()] <= 0.0 {
            return Err(VeditError::composition(
                "could not determine a duration for the root region: set one or add content",
            ));
        }

        let mut regions: Vec<Option<ResolvedRegion>> = Vec::new();
        regions.resize_with(self.comp.regions.len(), || None);
        for &id in &pre_order {
            let partial = partials[id.index()]
                .take()
                .ok_or_else(|| VeditError::composition(format!("region {} resolved twice", id.0)))?;
            let parent_abs = self.comp.region(id)?.parent.and_then(|p| {
                regions[p.index()]
                    .as_ref()
                    .map(|r: &ResolvedRegion| r.absolute)
            });
            let resolved = self.finish_region(id, partial, durations[id.index()], parent_abs)?;
            regions[id.index()] = Some(resolved);
        }
        let regions: Vec<ResolvedRegion> = regions
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.ok_or_else(|| VeditError::composition(format!("region {i} is unreachable")))
            })
            .collect::<VeditResult<_>>()?;

        let mut order = Vec::with_capacity(regions.len());
        post_order(&regions, root, &mut order);

        let sar = self.reconcile_sar(&regions);
        let audio_channels = self.reconcile_audio(&regions);

        let root_region = &regions[root.index()];
        let output = ResolvedOutput {
            path: self.comp.output.path.clone(),
            width: root_region.rect.width,
            height: root_region.rect.height,
            duration: root_region.duration,
            sar,
            pixel_format: self.comp.output.pixel_format.clone(),
            audio_channels,
            normalize_audio: self.comp.output.normalize_audio,
        };
        tracing::debug!(
            duration = output.duration,
            sar = %output.sar,
            channels = ?output.audio_channels,
            advisories = self.advisories.len(),
            "resolved composition"
        );

        Ok(ResolvedPlan {
            regions,
            root,
            order,
            output,
            advisories: std::mem::take(&mut self.advisories),
        })
    }

    fn collect_pre_order(&self, id: RegionId, out: &mut Vec<RegionId>) {
        out.push(id);
        for &c in &self.children[id.index()] {
            self.collect_pre_order(c, out);
        }
    }

    fn advise(&mut self, kind: AdvisoryKind, region: Option<RegionId>, message: String) {
        tracing::warn!(kind = ?kind, region = ?region.map(|r| r.0), "{message}");
        self.advisories.push(Advisory {
            kind,
            region,
            message,
        });
    }

    /// Sources, ranges, policies, fits and timings of one region's excerpts.
    fn resolve_content(&mut self, id: RegionId) -> VeditResult<Partial> {
        let comp = self.comp;
        let region = comp.region(id)?;

        let mut fitted = Vec::new();
        let mut tiles = Vec::new();
        let mut cursor = 0.0;
        for (idx, ex) in region.excerpts.iter().enumerate() {
            let mut resolved = self.resolve_excerpt(id, region, idx, ex)?;
            if resolved.policy.style == DisplayStyle::OverlayCascade {
                tiles.push(resolved);
            } else {
                resolved.timeline_start = cursor;
                cursor += resolved.duration();
                fitted.push(resolved);
            }
        }

        let cascade_end = if tiles.is_empty() {
            0.0
        } else {
            self.schedule_cascade(id, region, &mut tiles)?
        };

        let track = match &region.audio_track {
            Some(path) => {
                let source = self.media.resolve(path)?;
                if !source.has_audio() {
                    return Err(VeditError::probe(format!(
                        "audio track '{}' has no audio stream",
                        source.path.display()
                    )));
                }
                Some(source)
            }
            None => None,
        };

        fitted.extend(tiles);
        Ok(Partial {
            excerpts: fitted,
            own_duration: cursor.max(cascade_end),
            track,
        })
    }

    fn resolve_excerpt(
        &mut self,
        id: RegionId,
        region: &Region,
        idx: usize,
        ex: &Excerpt,
    ) -> VeditResult<ResolvedExcerpt> {
        let source = self.media.resolve(&ex.source)?;
        if !source.has_video() {
            return Err(VeditError::probe(format!(
                "'{}' has no video stream",
                source.path.display()
            )));
        }
        self.sars.push((id, source.sar));

        let start = ex.start.max(0.0);
        if start >= source.duration {
            return Err(VeditError::composition(format!(
                "excerpt of '{}' starts at {start}s but the source is {}s long",
                source.path.display(),
                source.duration
            )));
        }
        let end = ex.end.unwrap_or(source.duration);
        if end > source.duration {
            return Err(VeditError::composition(format!(
                "excerpt of '{}' ends at {end}s but the source is {}s long",
                source.path.display(),
                source.duration
            )));
        }
        if end <= start {
            return Err(VeditError::composition(format!(
                "excerpt of '{}' ends at {end}s which is not after its start {start}s",
                source.path.display()
            )));
        }

        let (policy, owner) = match (&ex.display, &region.display) {
            (Some(p), _) => (p.clone(), PolicyOwner::Excerpt(id, idx)),
            (None, Some(p)) => (p.clone(), PolicyOwner::Region(id)),
            (None, None) => (DisplayPolicy::default(), PolicyOwner::Region(id)),
        };
        policy.validate()?;

        let mut transform = fit(
            source.width,
            source.height,
            region.width,
            region.height,
            policy.style,
            Some(&policy.pad_color),
            Some(policy.pan_direction),
        )?;

        let mut pan_direction = None;
        if policy.style == DisplayStyle::Pan
            && let Some(motion) = transform.pan
        {
            let dir = match policy.pan_direction {
                PanDirection::Alternate => {
                    let reverse = self.pan_reverse_next.entry(owner).or_insert(false);
                    let dir = match (motion.axis, *reverse) {
                        (Axis::Horizontal, false) => PanDirection::Right,
                        (Axis::Horizontal, true) => PanDirection::Left,
                        (Axis::Vertical, false) => PanDirection::Down,
                        (Axis::Vertical, true) => PanDirection::Up,
                    };
                    *reverse = !*reverse;
                    dir
                }
                fixed => fixed,
            };
            if dir != policy.pan_direction {
                transform = fit(
                    source.width,
                    source.height,
                    region.width,
                    region.height,
                    policy.style,
                    Some(&policy.pad_color),
                    Some(dir),
                )?;
            }
            pan_direction = Some(dir);
        }

        let include_audio = policy.include_audio && source.has_audio();
        if policy.include_audio && !source.has_audio() {
            self.advise(
                AdvisoryKind::MissingAudio,
                Some(id),
                format!(
                    "'{}' has no audio stream; its excerpt contributes video only",
                    source.path.display()
                ),
            );
        }

        Ok(ResolvedExcerpt {
            source,
            start,
            end,
            policy,
            pan_direction,
            include_audio,
            transform,
            timeline_start: 0.0,
            placement: ExcerptPlacement::Fitted,
        })
    }

    /// Place cascade tiles; returns the cascade's content duration.
    fn schedule_cascade(
        &mut self,
        id: RegionId,
        region: &Region,
        tiles: &mut [ResolvedExcerpt],
    ) -> VeditResult<f64> {
        let first = &tiles[0].policy;
        let params = CascadeParams {
            direction: first.cascade_direction,
            max_concurrency: first.cascade_max_concurrency,
            min_gap: first.cascade_min_gap,
        };
        let disagree = tiles.iter().any(|t| {
            t.policy.cascade_max_concurrency != params.max_concurrency
                || t.policy.cascade_min_gap != params.min_gap
        });
        if disagree {
            self.advise(
                AdvisoryKind::CascadeParams,
                Some(id),
                format!(
                    "cascade excerpts disagree on concurrency/gap; using {} and {}s",
                    params.max_concurrency, params.min_gap
                ),
            );
        }

        let items: Vec<CascadeItem> = tiles
            .iter()
            .map(|t| CascadeItem {
                duration: t.duration(),
                width: t.source.width,
                height: t.source.height,
                direction: Some(t.policy.cascade_direction),
            })
            .collect();
        let slots = cascade::schedule(&items, region.width, region.height, &params, &mut *self.rng)?;
        let end = cascade::total_duration(&slots);
        for (tile, slot) in tiles.iter_mut().zip(slots) {
            tile.timeline_start = slot.start;
            tile.placement = ExcerptPlacement::Cascade(slot);
        }
        Ok(end)
    }

    /// Explicit duration, else audio track duration, else the longest of own content and
    /// children.
    fn resolve_duration(
        &self,
        id: RegionId,
        partials: &[Option<Partial>],
        out: &mut [f64],
    ) -> VeditResult<f64> {
        let mut content = partials[id.index()]
            .as_ref()
            .map(|p| p.own_duration)
            .unwrap_or(0.0);
        for &c in &self.children[id.index()] {
            content = content.max(self.resolve_duration(c, partials, out)?);
        }

        let region = self.comp.region(id)?;
        let track = partials[id.index()].as_ref().and_then(|p| p.track.as_ref());
        let d = match (region.duration, track) {
            (Some(explicit), _) => explicit,
            (None, Some(t)) => t.duration,
            (None, None) => content,
        };
        out[id.index()] = d;
        Ok(d)
    }

    fn finish_region(
        &mut self,
        id: RegionId,
        partial: Partial,
        duration: f64,
        parent_abs: Option<PixelRect>,
    ) -> VeditResult<ResolvedRegion> {
        let comp = self.comp;
        let region = comp.region(id)?;
        let rect = PixelRect::new(region.x, region.y, region.width, region.height);
        let absolute = match parent_abs {
            Some(p) => rect.offset(p.x, p.y),
            None => PixelRect::new(0, 0, region.width, region.height),
        };

        if let Some(parent) = region.parent {
            let p = comp.region(parent)?;
            let bounds = Rect::new(0.0, 0.0, f64::from(p.width), f64::from(p.height));
            let r = rect.to_kurbo();
            if bounds.intersect(r) != r {
                self.advise(
                    AdvisoryKind::OutsideParent,
                    Some(id),
                    format!(
                        "region {} at ({}, {}) {}x{} extends past its parent {}x{}",
                        id.0, rect.x, rect.y, rect.width, rect.height, p.width, p.height
                    ),
                );
            }
        }

        if let Some(image) = &region.background.image {
            let (w, h) = image::image_dimensions(image).map_err(|e| {
                VeditError::probe(format!(
                    "cannot read background image '{}': {e}",
                    image.display()
                ))
            })?;
            if (w, h) != (region.width, region.height) {
                self.advise(
                    AdvisoryKind::BackgroundSize,
                    Some(id),
                    format!(
                        "background image '{}' is {w}x{h} but region {} is {}x{}",
                        image.display(),
                        id.0,
                        region.width,
                        region.height
                    ),
                );
            }
        }

        let mut children = self.children[id.index()].clone();
        children.sort_by_key(|c| z_key(self.comp, *c));

        let watermarks = region
            .watermarks
            .iter()
            .map(|w| resolve_watermark(w, region.width, region.height, duration))
            .collect::<VeditResult<Vec<_>>>()?;

        let tail_start = (duration - TAIL_SECONDS).max(0.0);
        let audio_track = partial.track.map(|source| {
            let fade_out = (source.duration > duration).then(|| (tail_start, duration - tail_start));
            ResolvedAudioTrack { source, fade_out }
        });
        let caption = region.audio_desc.as_ref().map(|text| ResolvedCaption {
            text: text.clone(),
            start: tail_start,
        });

        Ok(ResolvedRegion {
            id,
            parent: region.parent,
            rect,
            absolute,
            duration,
            z_key: z_key(self.comp, id),
            background: region.background.clone(),
            excerpts: partial.excerpts,
            children,
            watermarks,
            audio_track,
            caption,
        })
    }

    /// Root value, else the first source SAR in depth-first order, else 1:1. Disagreeing
    /// sources without a root value fall back to 1:1.
    fn reconcile_sar(&mut self, regions: &[ResolvedRegion]) -> Sar {
        let live: Vec<Sar> = self
            .sars
            .iter()
            .filter(|(id, _)| !regions[id.index()].is_noop())
            .map(|(_, s)| s.reduced())
            .collect();
        let mut distinct: Vec<Sar> = Vec::new();
        for s in &live {
            if !distinct.contains(s) {
                distinct.push(*s);
            }
        }

        if let Some(explicit) = self.comp.output.sar {
            let explicit = explicit.reduced();
            let differing: Vec<String> = distinct
                .iter()
                .filter(|s| **s != explicit)
                .map(|s| s.to_string())
                .collect();
            if !differing.is_empty() {
                self.advise(
                    AdvisoryKind::SarOverride,
                    None,
                    format!(
                        "sources have SAR {} but output SAR {explicit} was requested; output may look distorted",
                        differing.join(", ")
                    ),
                );
            }
            return explicit;
        }

        match distinct.as_slice() {
            [] => Sar::SQUARE,
            [only] => *only,
            many => {
                let list: Vec<String> = many.iter().map(|s| s.to_string()).collect();
                self.advise(
                    AdvisoryKind::MixedSar,
                    None,
                    format!(
                        "sources have different sample aspect ratios ({}); using 1:1",
                        list.join(", ")
                    ),
                );
                Sar::SQUARE
            }
        }
    }

    /// Common channel count of every contributing stream, else mono.
    fn reconcile_audio(&mut self, regions: &[ResolvedRegion]) -> Option<u16> {
        let mut streams = Vec::new();
        for r in regions.iter().filter(|r| !r.is_noop()) {
            streams.extend(
                r.excerpts
                    .iter()
                    .filter(|e| e.include_audio)
                    .filter_map(|e| e.source.audio_channels),
            );
            if let Some(t) = &r.audio_track {
                streams.extend(t.source.audio_channels);
            }
        }
        let first = *streams.first()?;
        if streams.iter().all(|c| *c == first) {
            return Some(first);
        }
        let counts: Vec<String> = streams
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        self.advise(
            AdvisoryKind::MixedChannels,
            None,
            format!(
                "audio streams have different channel counts ({}); downmixing to mono",
                counts.join(", ")
            ),
        );
        Some(1)
    }
}

fn z_key(comp: &Composition, id: RegionId) -> (i64, u32) {
    let seq = id.0;
    let z = comp
        .regions
        .get(id.index())
        .and_then(|r| r.z_index)
        .unwrap_or(i64::from(seq));
    (z, seq)
}

fn post_order(regions: &[ResolvedRegion], id: RegionId, out: &mut Vec<RegionId>) {
    for &c in &regions[id.index()].children {
        post_order(regions, c, out);
    }
    out.push(id);
}

/// Negative starts count back from `duration`; ramps are clamped to the region.
fn clamp_fade(fade: Fade, duration: f64) -> (f64, f64) {
    let start = if fade.start < 0.0 {
        duration + fade.start
    } else {
        fade.start
    };
    let start = start.clamp(0.0, duration.max(0.0));
    let len = fade.duration.min(duration - start).max(0.0);
    (start, len)
}

fn resolve_watermark(
    w: &Watermark,
    region_w: u32,
    region_h: u32,
    duration: f64,
) -> VeditResult<ResolvedWatermark> {
    let (x, y) = match w.placement {
        Placement::At { x, y } => (x, y),
        Placement::Anchored { anchor, margin } => {
            let (ww, wh) = match &w.content {
                WatermarkContent::Solid { width, height, .. } => (*width, *height),
                WatermarkContent::Image { path } => image::image_dimensions(path).map_err(|e| {
                    VeditError::probe(format!(
                        "cannot read watermark image '{}': {e}",
                        path.display()
                    ))
                })?,
            };
            anchor_position(anchor, margin, (ww, wh), (region_w, region_h))
        }
    };
    Ok(ResolvedWatermark {
        content: w.content.clone(),
        x,
        y,
        fade_in: w.fade_in.map(|f| clamp_fade(f, duration)),
        fade_out: w.fade_out.map(|f| clamp_fade(f, duration)),
    })
}

fn anchor_position(anchor: Anchor, margin: u32, size: (u32, u32), region: (u32, u32)) -> (i64, i64) {
    let m = i64::from(margin);
    let (w, h) = (i64::from(size.0), i64::from(size.1));
    let (rw, rh) = (i64::from(region.0), i64::from(region.1));
    match anchor {
        Anchor::TopLeft => (m, m),
        Anchor::TopRight => (rw - w - m, m),
        Anchor::BottomLeft => (m, rh - h - m),
        Anchor::BottomRight => (rw - w - m, rh - h - m),
        Anchor::Center => ((rw - w) / 2, (rh - h) / 2),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resolve/tree.rs"]
mod tests;
