use std::collections::HashSet;
use std::path::PathBuf;

use crate::foundation::core::{Color, PixelFormat, Sar};
use crate::foundation::error::{VeditError, VeditResult};

/// Index of a [`Region`] inside [`Composition::regions`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RegionId(pub u32);

impl RegionId {
    /// Arena slot.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How an excerpt is fitted into the region that hosts it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    /// Scale to cover the region, clip the overscan equally on both edges.
    Crop,
    /// Scale to fit inside the region, fill the border with the pad colour.
    #[default]
    Pad,
    /// Scale to cover the region, scroll across the overscanned axis while playing.
    Pan,
    /// Shrink to a tile and sweep it across the region on a cascade schedule.
    OverlayCascade,
}

impl DisplayStyle {
    /// Stable tag used in fingerprints and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayStyle::Crop => "crop",
            DisplayStyle::Pad => "pad",
            DisplayStyle::Pan => "pan",
            DisplayStyle::OverlayCascade => "overlay_cascade",
        }
    }
}

/// Configured scroll direction for [`DisplayStyle::Pan`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanDirection {
    /// Scroll toward the top (reverse on the vertical axis).
    Up,
    /// Scroll toward the bottom (forward on the vertical axis).
    Down,
    /// Scroll toward the left (reverse on the horizontal axis).
    Left,
    /// Scroll toward the right (forward on the horizontal axis).
    Right,
    /// Forward for the first panning excerpt, then reverse, then forward...
    #[default]
    Alternate,
}

/// Direction a cascade tile sweeps across its region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeDirection {
    /// Enter at the bottom edge, leave at the top.
    Up,
    /// Enter at the top edge, leave at the bottom.
    #[default]
    Down,
    /// Enter at the right edge, leave at the left.
    Left,
    /// Enter at the left edge, leave at the right.
    Right,
}

impl CascadeDirection {
    /// `true` for left/right sweeps.
    pub fn is_horizontal(self) -> bool {
        matches!(self, CascadeDirection::Left | CascadeDirection::Right)
    }
}

/// Fit, pan, cascade and audio parameters for an excerpt shown in a region.
///
/// Resolved per (excerpt, region) pair: the excerpt's own policy wins, then the region's, then
/// [`DisplayPolicy::default`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DisplayPolicy {
    /// Fit style.
    pub style: DisplayStyle,
    /// Border colour for [`DisplayStyle::Pad`].
    pub pad_color: Color,
    /// Scroll direction for [`DisplayStyle::Pan`].
    pub pan_direction: PanDirection,
    /// Sweep direction for [`DisplayStyle::OverlayCascade`].
    pub cascade_direction: CascadeDirection,
    /// Maximum tiles sweeping at the same instant.
    pub cascade_max_concurrency: u32,
    /// Minimum seconds between two tile start times.
    pub cascade_min_gap: f64,
    /// Mix this excerpt's audio into the output.
    pub include_audio: bool,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            style: DisplayStyle::Pad,
            pad_color: Color::black(),
            pan_direction: PanDirection::Alternate,
            cascade_direction: CascadeDirection::Down,
            cascade_max_concurrency: 3,
            cascade_min_gap: 4.0,
            include_audio: false,
        }
    }
}

impl DisplayPolicy {
    /// Default policy with [`DisplayStyle::Crop`].
    pub fn crop() -> Self {
        Self {
            style: DisplayStyle::Crop,
            ..Self::default()
        }
    }

    /// Default policy with [`DisplayStyle::Pad`] over `color`.
    pub fn pad(color: Color) -> Self {
        Self {
            style: DisplayStyle::Pad,
            pad_color: color,
            ..Self::default()
        }
    }

    /// Default policy with [`DisplayStyle::Pan`].
    pub fn pan(direction: PanDirection) -> Self {
        Self {
            style: DisplayStyle::Pan,
            pan_direction: direction,
            ..Self::default()
        }
    }

    /// Default policy with [`DisplayStyle::OverlayCascade`].
    pub fn cascade(direction: CascadeDirection) -> Self {
        Self {
            style: DisplayStyle::OverlayCascade,
            cascade_direction: direction,
            ..Self::default()
        }
    }

    /// Set the audio inclusion flag.
    pub fn with_audio(mut self, include_audio: bool) -> Self {
        self.include_audio = include_audio;
        self
    }

    /// Set the cascade concurrency and minimum start gap.
    pub fn with_cascade_limits(mut self, max_concurrency: u32, min_gap: f64) -> Self {
        self.cascade_max_concurrency = max_concurrency;
        self.cascade_min_gap = min_gap;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> VeditResult<()> {
        if self.cascade_max_concurrency == 0 {
            return Err(VeditError::validation("cascade_max_concurrency must be >= 1"));
        }
        if !self.cascade_min_gap.is_finite() || self.cascade_min_gap < 0.0 {
            return Err(VeditError::validation(
                "cascade_min_gap must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

/// A time-bounded view into a source media file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Excerpt {
    /// Source file; made absolute when resolved.
    pub source: PathBuf,
    /// Start offset into the source, seconds. Negative values clamp to 0.
    #[serde(default)]
    pub start: f64,
    /// Absolute end offset into the source, seconds. `None` plays to the end of the source.
    #[serde(default)]
    pub end: Option<f64>,
    /// Per-excerpt display override.
    #[serde(default)]
    pub display: Option<DisplayPolicy>,
}

impl Excerpt {
    /// The whole of `source`.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            start: 0.0,
            end: None,
            display: None,
        }
    }

    /// `source` between `start` and `end` seconds.
    pub fn range(source: impl Into<PathBuf>, start: f64, end: f64) -> Self {
        Self {
            source: source.into(),
            start,
            end: Some(end),
            display: None,
        }
    }

    /// Attach a display policy that takes precedence over the hosting region's.
    pub fn with_display(mut self, display: DisplayPolicy) -> Self {
        self.display = Some(display);
        self
    }

    /// Replace the display override in place.
    pub fn set_display(&mut self, display: Option<DisplayPolicy>) {
        self.display = display;
    }

    pub(crate) fn validate(&self) -> VeditResult<()> {
        if !self.start.is_finite() {
            return Err(VeditError::composition(format!(
                "excerpt of '{}' has a non-finite start",
                self.source.display()
            )));
        }
        if let Some(end) = self.end {
            if !end.is_finite() {
                return Err(VeditError::composition(format!(
                    "excerpt of '{}' has a non-finite end",
                    self.source.display()
                )));
            }
            if end <= self.start.max(0.0) {
                return Err(VeditError::composition(format!(
                    "excerpt of '{}' ends at {end} which is not after its start {}",
                    self.source.display(),
                    self.start
                )));
            }
        }
        if let Some(d) = &self.display {
            d.validate()?;
        }
        Ok(())
    }
}

/// What a watermark draws.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkContent {
    /// A still image, drawn at its natural size.
    Image {
        /// Image file.
        path: PathBuf,
    },
    /// A solid colour box.
    Solid {
        /// Fill colour.
        color: Color,
        /// Box width.
        width: u32,
        /// Box height.
        height: u32,
    },
}

/// Region corner (or centre) a watermark is anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Top-left corner.
    TopLeft,
    /// Top-right corner.
    TopRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom-right corner.
    BottomRight,
    /// Centred on both axes.
    Center,
}

/// Where a watermark sits in its region.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Top-left corner at a fixed pixel offset.
    At {
        /// Left edge.
        x: i64,
        /// Top edge.
        y: i64,
    },
    /// Anchored with a uniform margin.
    Anchored {
        /// Anchor point.
        anchor: Anchor,
        /// Inset from the anchored edges.
        margin: u32,
    },
}

impl Default for Placement {
    fn default() -> Self {
        Placement::At { x: 0, y: 0 }
    }
}

/// One fade ramp. A negative `start` counts backward from the end of the owning region.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Fade {
    /// Ramp start, seconds.
    pub start: f64,
    /// Ramp length, seconds.
    pub duration: f64,
}

/// A timed overlay owned by a region.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Watermark {
    /// Image or colour box.
    pub content: WatermarkContent,
    /// Position inside the owning region.
    #[serde(default)]
    pub placement: Placement,
    /// Optional fade-in.
    #[serde(default)]
    pub fade_in: Option<Fade>,
    /// Optional fade-out.
    #[serde(default)]
    pub fade_out: Option<Fade>,
}

impl Watermark {
    /// Image watermark at the region origin.
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            content: WatermarkContent::Image { path: path.into() },
            placement: Placement::default(),
            fade_in: None,
            fade_out: None,
        }
    }

    /// Solid colour box watermark.
    pub fn solid(color: Color, width: u32, height: u32) -> VeditResult<Self> {
        if width == 0 || height == 0 {
            return Err(VeditError::validation(
                "solid watermark width and height must be > 0",
            ));
        }
        Ok(Self {
            content: WatermarkContent::Solid {
                color,
                width,
                height,
            },
            placement: Placement::default(),
            fade_in: None,
            fade_out: None,
        })
    }

    /// Place at a pixel offset.
    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.placement = Placement::At { x, y };
        self
    }

    /// Anchor to a corner or the centre.
    pub fn anchored(mut self, anchor: Anchor, margin: u32) -> Self {
        self.placement = Placement::Anchored { anchor, margin };
        self
    }

    /// Fade in from `start` over `duration` seconds.
    pub fn fade_in(mut self, start: f64, duration: f64) -> Self {
        self.fade_in = Some(Fade { start, duration });
        self
    }

    /// Fade out from `start` over `duration` seconds.
    pub fn fade_out(mut self, start: f64, duration: f64) -> Self {
        self.fade_out = Some(Fade { start, duration });
        self
    }

    pub(crate) fn validate(&self) -> VeditResult<()> {
        for fade in [self.fade_in, self.fade_out].into_iter().flatten() {
            if !fade.start.is_finite() || !fade.duration.is_finite() || fade.duration < 0.0 {
                return Err(VeditError::validation(
                    "watermark fades need a finite start and a duration >= 0",
                ));
            }
        }
        if let WatermarkContent::Solid { width, height, .. } = self.content
            && (width == 0 || height == 0)
        {
            return Err(VeditError::validation(
                "solid watermark width and height must be > 0",
            ));
        }
        Ok(())
    }
}

/// Region backdrop: a colour, optionally covered by an unscaled still image.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Background {
    /// Fill colour.
    #[serde(default)]
    pub color: Color,
    /// Still image drawn at the region origin.
    #[serde(default)]
    pub image: Option<PathBuf>,
}

/// A rectangular, time-bounded composition unit.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    /// Parent slot, `None` for the root and for detached regions.
    pub parent: Option<RegionId>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Left edge relative to the parent.
    pub x: i64,
    /// Top edge relative to the parent.
    pub y: i64,
    /// Excerpts shown in this region, in play order.
    pub excerpts: Vec<Excerpt>,
    /// Backdrop.
    pub background: Background,
    /// External audio file mixed under this region.
    pub audio_track: Option<PathBuf>,
    /// Attribution text shown bottom-left for the last 5 seconds.
    pub audio_desc: Option<String>,
    /// Timed overlays.
    pub watermarks: Vec<Watermark>,
    /// Explicit duration, seconds.
    pub duration: Option<f64>,
    /// Explicit stacking order; unset regions stack in creation order.
    pub z_index: Option<i64>,
    /// Display policy for excerpts without their own.
    pub display: Option<DisplayPolicy>,
}

impl Region {
    /// A `width`x`height` region at the parent origin with defaults everywhere else.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            parent: None,
            width,
            height,
            x: 0,
            y: 0,
            excerpts: Vec::new(),
            background: Background::default(),
            audio_track: None,
            audio_desc: None,
            watermarks: Vec::new(),
            duration: None,
            z_index: None,
            display: None,
        }
    }
}

/// Where and how the root region is encoded.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputSpec {
    /// Destination file.
    pub path: PathBuf,
    /// Explicit output sample aspect ratio.
    #[serde(default)]
    pub sar: Option<Sar>,
    /// Pixel format for every transcode and composition.
    #[serde(default)]
    pub pixel_format: PixelFormat,
    /// Apply dynamic loudness normalisation to the final mix.
    #[serde(default = "default_true")]
    pub normalize_audio: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./output.mp4"),
            sar: None,
            pixel_format: PixelFormat::default(),
            normalize_audio: true,
        }
    }
}

/// Arena of regions forming one tree, plus its output contract.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Composition {
    /// Region records; a region's creation order is its slot index.
    pub regions: Vec<Region>,
    /// Root slot.
    pub root: RegionId,
    /// Output destination and format.
    pub output: OutputSpec,
}

impl Composition {
    /// Borrow a region.
    pub fn region(&self, id: RegionId) -> VeditResult<&Region> {
        self.regions
            .get(id.index())
            .ok_or_else(|| VeditError::composition(format!("unknown region {}", id.0)))
    }

    /// Borrow a region mutably.
    pub fn region_mut(&mut self, id: RegionId) -> VeditResult<&mut Region> {
        self.regions
            .get_mut(id.index())
            .ok_or_else(|| VeditError::composition(format!("unknown region {}", id.0)))
    }

    /// Children of `id` in creation order.
    pub fn children(&self, id: RegionId) -> Vec<RegionId> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.parent == Some(id))
            .map(|(i, _)| RegionId(i as u32))
            .collect()
    }

    /// Move `child` under `parent`. Cycles are not rejected here; [`Composition::validate`]
    /// reports them.
    pub fn attach(&mut self, child: RegionId, parent: RegionId) -> VeditResult<()> {
        self.region(parent)?;
        self.region_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Check the tree shape and every value that would make resolution meaningless.
    pub fn validate(&self) -> VeditResult<()> {
        let root = self.region(self.root)?;
        if root.parent.is_some() {
            return Err(VeditError::composition("the root region must not have a parent"));
        }

        for (idx, region) in self.regions.iter().enumerate() {
            let id = RegionId(idx as u32);
            self.check_reaches_root(id)?;

            if region.width == 0 || region.height == 0 {
                return Err(VeditError::composition(format!(
                    "region {idx} must have non-zero width and height"
                )));
            }
            if let Some(d) = region.duration
                && (!d.is_finite() || d < 0.0)
            {
                return Err(VeditError::composition(format!(
                    "region {idx} has negative or non-finite duration {d}"
                )));
            }
            if let Some(p) = &region.display {
                p.validate()?;
            }
            for excerpt in &region.excerpts {
                excerpt.validate()?;
            }
            for w in &region.watermarks {
                w.validate()?;
            }
        }
        Ok(())
    }

    fn check_reaches_root(&self, id: RegionId) -> VeditResult<()> {
        let mut seen = HashSet::new();
        let mut cur = id;
        loop {
            if cur == self.root {
                return Ok(());
            }
            if !seen.insert(cur) {
                return Err(VeditError::composition(format!(
                    "region {} is part of a cycle",
                    id.0
                )));
            }
            match self.region(cur)?.parent {
                Some(p) => cur = p,
                None => {
                    return Err(VeditError::composition(format!(
                        "region {} is not attached to the root",
                        id.0
                    )));
                }
            }
        }
    }

    /// A root that renders a plain colour (or still image) for `duration` seconds.
    pub fn solid(
        duration: f64,
        width: u32,
        height: u32,
        background: Background,
        output: OutputSpec,
    ) -> VeditResult<Self> {
        let mut root = Region::new(width, height);
        root.duration = Some(duration);
        root.background = background;
        let comp = Self {
            regions: vec![root],
            root: RegionId(0),
            output,
        };
        comp.validate()?;
        Ok(comp)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
