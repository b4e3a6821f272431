use crate::foundation::error::{VeditError, VeditResult};
use crate::foundation::random::{RandomSource, shuffle};
use crate::layout::cascade::{CascadeParams, schedule_times};
use crate::media::probe::MetadataResolver;
use crate::scene::model::{Composition, DisplayPolicy, DisplayStyle, Excerpt, RegionId};

/// How far a region may run ahead of the shortest one, as a factor of
/// `shortest + excerpt`.
pub const BALANCE_FACTOR: f64 = 1.2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DistributeOpts {
    /// Keep cycling through the excerpts until every region has at least this much content.
    pub min_duration: Option<f64>,
    /// Shuffle the excerpt list before every pass.
    pub shuffle: bool,
}

/// Running content length of one target region.
struct Slot {
    id: RegionId,
    aspect: f64,
    fitted: f64,
    cascade: Vec<f64>,
    params: Option<CascadeParams>,
}

impl Slot {
    fn duration(&self) -> VeditResult<f64> {
        let Some(params) = self.params else {
            return Ok(self.fitted);
        };
        let starts = schedule_times(&self.cascade, params.max_concurrency, params.min_gap)?;
        let cascade_end = starts
            .iter()
            .zip(&self.cascade)
            .map(|(s, d)| s + d)
            .fold(0.0, f64::max);
        Ok(self.fitted.max(cascade_end))
    }

    fn push(&mut self, policy: &DisplayPolicy, duration: f64) {
        if policy.style == DisplayStyle::OverlayCascade {
            self.params.get_or_insert(CascadeParams {
                direction: policy.cascade_direction,
                max_concurrency: policy.cascade_max_concurrency,
                min_gap: policy.cascade_min_gap,
            });
            self.cascade.push(duration);
        } else {
            self.fitted += duration;
        }
    }
}

/// Append `excerpts` to `regions` of `comp`, balancing content length.
///
/// Each excerpt goes to the first region, ordered by closest aspect ratio and then by shortest
/// content, whose content plus the excerpt stays within [`BALANCE_FACTOR`] times the shortest
/// region's content plus the excerpt. With a minimum duration, regions that reached it take no
/// more excerpts and the list is repeated until all of them have. Returns how many excerpts were
/// placed.
pub fn distribute_excerpts(
    comp: &mut Composition,
    regions: &[RegionId],
    excerpts: &[Excerpt],
    media: &MetadataResolver,
    opts: &DistributeOpts,
    rng: &mut dyn RandomSource,
) -> VeditResult<usize> {
    if regions.is_empty() {
        return Err(VeditError::validation("distribute_excerpts needs at least one region"));
    }
    if let Some(min) = opts.min_duration
        && (!min.is_finite() || min <= 0.0)
    {
        return Err(VeditError::validation("min_duration must be finite and > 0"));
    }
    if excerpts.is_empty() {
        return Ok(0);
    }

    let mut slots = Vec::with_capacity(regions.len());
    for &id in regions {
        let region = comp.region(id)?;
        let mut slot = Slot {
            id,
            aspect: f64::from(region.width) / f64::from(region.height),
            fitted: 0.0,
            cascade: Vec::new(),
            params: None,
        };
        for ex in &region.excerpts {
            let policy = ex.display.clone().or_else(|| region.display.clone()).unwrap_or_default();
            slot.push(&policy, excerpt_duration(ex, media)?);
        }
        slots.push(slot);
    }

    let mut placed = 0;
    let mut total = total_duration(&slots)?;
    loop {
        let mut list = excerpts.to_vec();
        if opts.shuffle {
            shuffle(&mut list, rng);
        }

        for ex in list {
            let source = media.resolve(&ex.source)?;
            if !source.has_video() {
                return Err(VeditError::probe(format!(
                    "'{}' has no video stream",
                    source.path.display()
                )));
            }
            let aspect = f64::from(source.width) / f64::from(source.height);
            let d = excerpt_duration(&ex, media)?;

            let mut ranked = Vec::with_capacity(slots.len());
            for (i, slot) in slots.iter().enumerate() {
                ranked.push(((slot.aspect - aspect).abs(), slot.duration()?, i));
            }
            let shortest = ranked.iter().map(|r| r.1).fold(f64::INFINITY, f64::min);
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

            let pick = ranked.iter().find(|(_, current, _)| {
                current + d <= BALANCE_FACTOR * (shortest + d)
                    && opts.min_duration.is_none_or(|min| *current < min)
            });
            let Some(&(_, _, i)) = pick else {
                if opts.min_duration.is_none() {
                    return Err(VeditError::composition(format!(
                        "could not place excerpt of '{}'",
                        source.path.display()
                    )));
                }
                continue;
            };

            let slot = &mut slots[i];
            let region = comp.region_mut(slot.id)?;
            let policy = ex.display.clone().or_else(|| region.display.clone()).unwrap_or_default();
            slot.push(&policy, d);
            region.excerpts.push(ex);
            placed += 1;
        }

        let Some(min) = opts.min_duration else {
            break;
        };
        let mut shortest = f64::INFINITY;
        for slot in &slots {
            shortest = shortest.min(slot.duration()?);
        }
        if shortest >= min {
            break;
        }
        let grown = total_duration(&slots)?;
        if grown <= total {
            tracing::warn!(shortest, min, "excerpts cannot fill every region to the minimum duration");
            break;
        }
        total = grown;
    }

    tracing::debug!(placed, regions = regions.len(), "distributed excerpts");
    Ok(placed)
}

fn total_duration(slots: &[Slot]) -> VeditResult<f64> {
    let mut sum = 0.0;
    for slot in slots {
        sum += slot.duration()?;
    }
    Ok(sum)
}

fn excerpt_duration(ex: &Excerpt, media: &MetadataResolver) -> VeditResult<f64> {
    let source = media.resolve(&ex.source)?;
    let start = ex.start.max(0.0);
    let end = ex.end.unwrap_or(source.duration).min(source.duration);
    Ok((end - start).max(0.0))
}

#[cfg(test)]
#[path = "../tests/unit/distribute.rs"]
mod tests;
