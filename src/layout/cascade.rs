use crate::foundation::error::{VeditError, VeditResult};
use crate::foundation::random::RandomSource;
use crate::layout::fit::{Axis, scaled_size};
use crate::scene::model::CascadeDirection;

/// Smallest tile, as a fraction of the governing dimension.
pub const MIN_SIZE_FACTOR: f64 = 1.0 / 3.0;
/// Largest tile, as a fraction of the governing dimension.
pub const MAX_SIZE_FACTOR: f64 = 0.5;

/// Concurrency and spacing limits shared by one cascade.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CascadeParams {
    /// Direction for items that do not carry their own.
    pub direction: CascadeDirection,
    /// Maximum tiles on screen at once.
    pub max_concurrency: u32,
    /// Minimum seconds between consecutive start times.
    pub min_gap: f64,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            direction: CascadeDirection::Down,
            max_concurrency: 3,
            min_gap: 4.0,
        }
    }
}

impl CascadeParams {
    pub fn validate(&self) -> VeditResult<()> {
        if self.max_concurrency == 0 {
            return Err(VeditError::validation("cascade max_concurrency must be >= 1"));
        }
        if !self.min_gap.is_finite() || self.min_gap < 0.0 {
            return Err(VeditError::validation("cascade min_gap must be finite and >= 0"));
        }
        Ok(())
    }
}

/// One excerpt to place: its playing time and native frame size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeItem {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub direction: Option<CascadeDirection>,
}

/// Straight-line sweep along one axis.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sweep {
    /// Axis of travel.
    pub axis: Axis,
    /// Tile edge position along `axis` when the tile starts.
    pub from: f64,
    /// Tile edge position along `axis` when the tile ends.
    pub to: f64,
}

impl Sweep {
    /// Pixels per second over a clip lasting `duration` seconds (signed).
    pub fn velocity(&self, duration: f64) -> f64 {
        if duration <= 0.0 {
            0.0
        } else {
            (self.to - self.from) / duration
        }
    }

    /// Position `elapsed` seconds after the tile starts.
    pub fn position_at(&self, elapsed: f64, duration: f64) -> f64 {
        self.from + self.velocity(duration) * elapsed.clamp(0.0, duration.max(0.0))
    }
}

/// Placement of one cascade item.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CascadeSlot {
    /// Index into the input item list.
    pub index: usize,
    /// Start time within the region, seconds.
    pub start: f64,
    /// `start + duration`.
    pub end: f64,
    /// Fraction of the governing dimension chosen for the tile.
    pub size_factor: f64,
    /// Tile width after aspect-preserving scaling.
    pub tile_width: u32,
    /// Tile height after aspect-preserving scaling.
    pub tile_height: u32,
    /// Offset on the axis perpendicular to travel; the tile stays fully inside the region there.
    pub cross_offset: i64,
    /// Direction of travel.
    pub direction: CascadeDirection,
    /// Leading-edge to trailing-edge motion.
    pub sweep: Sweep,
}

impl CascadeSlot {
    /// Tile top-left at region time `t`, `None` outside `[start, end)`.
    pub fn position_at(&self, t: f64) -> Option<(f64, f64)> {
        if t < self.start || t >= self.end {
            return None;
        }
        let along = self.sweep.position_at(t - self.start, self.end - self.start);
        let cross = self.cross_offset as f64;
        Some(match self.sweep.axis {
            Axis::Horizontal => (along, cross),
            Axis::Vertical => (cross, along),
        })
    }
}

/// Assign start times to items with the given durations, in order.
///
/// Each start is at least `min_gap` after the previous one (the first starts at 0). While
/// `max_concurrency` items are still playing at the candidate start, the candidate moves to the
/// earliest end among them. Items are never dropped or shortened.
pub fn schedule_times(durations: &[f64], max_concurrency: u32, min_gap: f64) -> VeditResult<Vec<f64>> {
    CascadeParams {
        direction: CascadeDirection::Down,
        max_concurrency,
        min_gap,
    }
    .validate()?;

    let mut intervals: Vec<(f64, f64)> = Vec::with_capacity(durations.len());
    let mut starts = Vec::with_capacity(durations.len());
    for &d in durations {
        if !d.is_finite() || d < 0.0 {
            return Err(VeditError::validation(format!(
                "cascade item duration must be finite and >= 0, got {d}"
            )));
        }
        let mut t = match starts.last() {
            Some(prev) => prev + min_gap,
            None => 0.0,
        };
        loop {
            let mut active = 0u32;
            let mut earliest_end = f64::INFINITY;
            for &(s, e) in &intervals {
                if s <= t && e > t {
                    active += 1;
                    earliest_end = earliest_end.min(e);
                }
            }
            if active < max_concurrency {
                break;
            }
            t = earliest_end;
        }
        intervals.push((t, t + d));
        starts.push(t);
    }
    Ok(starts)
}

/// Time, size and place every item on a `region_w`x`region_h` region.
///
/// The tile box is `size_factor` of the governing dimension (width for horizontal travel,
/// height for vertical) by the whole cross dimension; the source is fitted inside that box so it
/// never exceeds the region on the cross axis.
pub fn schedule(
    items: &[CascadeItem],
    region_w: u32,
    region_h: u32,
    params: &CascadeParams,
    rng: &mut dyn RandomSource,
) -> VeditResult<Vec<CascadeSlot>> {
    params.validate()?;
    if region_w == 0 || region_h == 0 {
        return Err(VeditError::validation("cascade region dimensions must be > 0"));
    }
    let durations: Vec<f64> = items.iter().map(|i| i.duration).collect();
    let starts = schedule_times(&durations, params.max_concurrency, params.min_gap)?;

    let mut out = Vec::with_capacity(items.len());
    for (index, (item, start)) in items.iter().zip(starts).enumerate() {
        if item.width == 0 || item.height == 0 {
            return Err(VeditError::validation(format!(
                "cascade item {index} has zero dimensions"
            )));
        }
        let direction = item.direction.unwrap_or(params.direction);
        let horizontal = direction.is_horizontal();
        let size_factor = rng.uniform(MIN_SIZE_FACTOR, MAX_SIZE_FACTOR);

        let (box_w, box_h) = if horizontal {
            (((f64::from(region_w) * size_factor).floor() as u32).max(2), region_h)
        } else {
            (region_w, ((f64::from(region_h) * size_factor).floor() as u32).max(2))
        };
        let (_, tile_w, tile_h) = scaled_size(item.width, item.height, box_w, box_h, false);

        let (cross_extent, tile_cross) = if horizontal {
            (region_h, tile_h)
        } else {
            (region_w, tile_w)
        };
        let cross_offset = rng.int_inclusive(0, i64::from(cross_extent.saturating_sub(tile_cross)));

        let (rw, rh) = (f64::from(region_w), f64::from(region_h));
        let (tw, th) = (f64::from(tile_w), f64::from(tile_h));
        let sweep = match direction {
            CascadeDirection::Down => Sweep {
                axis: Axis::Vertical,
                from: -th,
                to: rh,
            },
            CascadeDirection::Up => Sweep {
                axis: Axis::Vertical,
                from: rh,
                to: -th,
            },
            CascadeDirection::Right => Sweep {
                axis: Axis::Horizontal,
                from: -tw,
                to: rw,
            },
            CascadeDirection::Left => Sweep {
                axis: Axis::Horizontal,
                from: rw,
                to: -tw,
            },
        };

        out.push(CascadeSlot {
            index,
            start,
            end: start + item.duration,
            size_factor,
            tile_width: tile_w,
            tile_height: tile_h,
            cross_offset,
            direction,
            sweep,
        });
    }
    Ok(out)
}

/// Content duration of a cascade: the latest end time, 0 when empty.
pub fn total_duration(slots: &[CascadeSlot]) -> f64 {
    slots.iter().map(|s| s.end).fold(0.0, f64::max)
}

#[cfg(test)]
#[path = "../../tests/unit/layout/cascade.rs"]
mod tests;
