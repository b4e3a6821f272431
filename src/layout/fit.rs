use crate::foundation::core::{Affine, Color, Rect};
use crate::foundation::error::{VeditError, VeditResult};
use crate::scene::model::{DisplayStyle, PanDirection};

/// Scaled sizes within this many pixels of the target snap onto it.
pub const SNAP_PX: u32 = 2;

/// Screen axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// x
    Horizontal,
    /// y
    Vertical,
}

/// Linear scroll of the crop window across the overscanned axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PanMotion {
    /// Axis that overscans.
    pub axis: Axis,
    /// `false` scrolls toward +x/+y (RIGHT/DOWN), `true` toward -x/-y (LEFT/UP).
    pub reverse: bool,
    /// Overscan in pixels: the distance the crop window travels.
    pub travel: u32,
}

impl PanMotion {
    /// Crop window offset along [`PanMotion::axis`] at `t` seconds into a clip lasting
    /// `duration` seconds.
    pub fn crop_offset_at(&self, t: f64, duration: f64) -> u32 {
        if duration <= 0.0 {
            return if self.reverse { self.travel } else { 0 };
        }
        let pps = f64::from(self.travel) / duration;
        let moved = (pps * t.clamp(0.0, duration)).trunc() as u32;
        let moved = moved.min(self.travel);
        if self.reverse {
            self.travel - moved
        } else {
            moved
        }
    }

    /// Pixels per second for an excerpt lasting `duration` seconds.
    pub fn speed(&self, duration: f64) -> f64 {
        if duration <= 0.0 {
            0.0
        } else {
            f64::from(self.travel) / duration
        }
    }
}

/// Deterministic geometric mapping of a source frame into a target rectangle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FitTransform {
    /// Style that produced this transform.
    pub style: DisplayStyle,
    /// Uniform scale factor (never an independent x/y stretch).
    pub scale: f64,
    /// Source width.
    pub source_width: u32,
    /// Source height.
    pub source_height: u32,
    /// Width after scaling and even rounding.
    pub scaled_width: u32,
    /// Height after scaling and even rounding.
    pub scaled_height: u32,
    /// Target width.
    pub target_width: u32,
    /// Target height.
    pub target_height: u32,
    /// Left edge of the scaled frame inside the target at t=0 (negative when cropped).
    pub offset_x: i64,
    /// Top edge of the scaled frame inside the target at t=0 (negative when cropped).
    pub offset_y: i64,
    /// Border colour; only set for [`DisplayStyle::Pad`].
    pub pad_color: Option<Color>,
    /// Scroll, only set for [`DisplayStyle::Pan`] when the frame actually overscans.
    pub pan: Option<PanMotion>,
}

impl FitTransform {
    /// `true` when the source must be resampled.
    pub fn needs_scale(&self) -> bool {
        self.scaled_width != self.source_width || self.scaled_height != self.source_height
    }

    /// `true` when the scaled frame extends past the target.
    pub fn overscans(&self) -> bool {
        self.scaled_width > self.target_width || self.scaled_height > self.target_height
    }

    /// Source pixel space to target pixel space at t=0.
    pub fn to_affine(&self) -> Affine {
        let sx = f64::from(self.scaled_width) / f64::from(self.source_width);
        let sy = f64::from(self.scaled_height) / f64::from(self.source_height);
        Affine::translate((self.offset_x as f64, self.offset_y as f64))
            * Affine::scale_non_uniform(sx, sy)
    }

    /// Part of the target actually covered by the scaled frame.
    pub fn covered_rect(&self) -> Rect {
        let frame = Rect::new(
            self.offset_x as f64,
            self.offset_y as f64,
            self.offset_x as f64 + f64::from(self.scaled_width),
            self.offset_y as f64 + f64::from(self.scaled_height),
        );
        let target = Rect::new(
            0.0,
            0.0,
            f64::from(self.target_width),
            f64::from(self.target_height),
        );
        frame.intersect(target)
    }
}

/// Scale `src` to cover (`cover = true`) or fit inside a `tgt` rectangle.
///
/// Returns `(scale, width, height)`. Cover rounds up and contain rounds down so the
/// CROP/PAD inequalities hold after rounding; sizes within [`SNAP_PX`] of the target snap onto
/// it, and odd sizes are made even in the same rounding direction.
pub fn scaled_size(src_w: u32, src_h: u32, tgt_w: u32, tgt_h: u32, cover: bool) -> (f64, u32, u32) {
    let sx = f64::from(tgt_w) / f64::from(src_w);
    let sy = f64::from(tgt_h) / f64::from(src_h);
    let scale = if cover { sx.max(sy) } else { sx.min(sy) };

    let round = |v: f64| -> u32 {
        let v = if cover { v.ceil() } else { v.floor() };
        v.max(1.0) as u32
    };
    let w = snap_even(round(f64::from(src_w) * scale), tgt_w, cover);
    let h = snap_even(round(f64::from(src_h) * scale), tgt_h, cover);
    (scale, w, h)
}

fn snap_even(v: u32, target: u32, cover: bool) -> u32 {
    let mut v = if v.abs_diff(target) <= SNAP_PX { target } else { v };
    if v % 2 == 1 {
        if cover {
            v += 1;
        } else if v > 1 {
            v -= 1;
        }
    }
    v
}

/// Compute the transform for displaying a `src_w`x`src_h` frame in a `tgt_w`x`tgt_h` rectangle.
///
/// `pan_direction` must already be concrete for alternating policies; [`PanDirection::Alternate`]
/// is taken as the forward (RIGHT/DOWN) step. For [`DisplayStyle::OverlayCascade`] the frame is
/// passed through at native size; the cascade scheduler does the sizing.
pub fn fit(
    src_w: u32,
    src_h: u32,
    tgt_w: u32,
    tgt_h: u32,
    style: DisplayStyle,
    pad_color: Option<&Color>,
    pan_direction: Option<PanDirection>,
) -> VeditResult<FitTransform> {
    if src_w == 0 || src_h == 0 {
        return Err(VeditError::validation("fit source dimensions must be > 0"));
    }
    if tgt_w == 0 || tgt_h == 0 {
        return Err(VeditError::validation("fit target dimensions must be > 0"));
    }

    let base = FitTransform {
        style,
        scale: 1.0,
        source_width: src_w,
        source_height: src_h,
        scaled_width: src_w,
        scaled_height: src_h,
        target_width: tgt_w,
        target_height: tgt_h,
        offset_x: 0,
        offset_y: 0,
        pad_color: None,
        pan: None,
    };

    match style {
        DisplayStyle::OverlayCascade => Ok(base),
        DisplayStyle::Pad => {
            let (scale, w, h) = scaled_size(src_w, src_h, tgt_w, tgt_h, false);
            Ok(FitTransform {
                scale,
                scaled_width: w,
                scaled_height: h,
                offset_x: centered(tgt_w, w),
                offset_y: centered(tgt_h, h),
                pad_color: Some(pad_color.cloned().unwrap_or_default()),
                ..base
            })
        }
        DisplayStyle::Crop => {
            let (scale, w, h) = scaled_size(src_w, src_h, tgt_w, tgt_h, true);
            Ok(FitTransform {
                scale,
                scaled_width: w,
                scaled_height: h,
                offset_x: centered(tgt_w, w),
                offset_y: centered(tgt_h, h),
                ..base
            })
        }
        DisplayStyle::Pan => {
            let (scale, w, h) = scaled_size(src_w, src_h, tgt_w, tgt_h, true);
            let over_x = w.saturating_sub(tgt_w);
            let over_y = h.saturating_sub(tgt_h);
            let pan = if over_x == 0 && over_y == 0 {
                None
            } else {
                let axis = if over_x >= over_y {
                    Axis::Horizontal
                } else {
                    Axis::Vertical
                };
                let reverse = matches!(
                    pan_direction,
                    Some(PanDirection::Up) | Some(PanDirection::Left)
                );
                let travel = match axis {
                    Axis::Horizontal => over_x,
                    Axis::Vertical => over_y,
                };
                Some(PanMotion {
                    axis,
                    reverse,
                    travel,
                })
            };

            let (mut offset_x, mut offset_y) = (centered(tgt_w, w), centered(tgt_h, h));
            if let Some(p) = pan {
                let start = -i64::from(p.crop_offset_at(0.0, 1.0));
                match p.axis {
                    Axis::Horizontal => offset_x = start,
                    Axis::Vertical => offset_y = start,
                }
            }
            Ok(FitTransform {
                scale,
                scaled_width: w,
                scaled_height: h,
                offset_x,
                offset_y,
                pan,
                ..base
            })
        }
    }
}

/// Offset that centres `inner` in `outer`, negative when `inner` is larger.
fn centered(outer: u32, inner: u32) -> i64 {
    (i64::from(outer) - i64::from(inner)) / 2
}

#[cfg(test)]
#[path = "../../tests/unit/layout/fit.rs"]
mod tests;
