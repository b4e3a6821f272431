use std::path::PathBuf;

use crate::foundation::core::{Color, PixelFormat, Sar};
use crate::foundation::error::{VeditError, VeditResult};
use crate::scene::model::{
    Background, Composition, DisplayPolicy, Excerpt, OutputSpec, Region, RegionId, Watermark,
};

/// Default region size when none is given.
pub const DEFAULT_REGION_SIZE: (u32, u32) = (1280, 720);

pub struct RegionBuilder {
    region: Region,
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_SIZE.0, DEFAULT_REGION_SIZE.1)
    }
}

impl RegionBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            region: Region::new(width, height),
        }
    }

    pub fn position(mut self, x: i64, y: i64) -> Self {
        self.region.x = x;
        self.region.y = y;
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.region.duration = Some(seconds);
        self
    }

    pub fn z_index(mut self, z: i64) -> Self {
        self.region.z_index = Some(z);
        self
    }

    pub fn display(mut self, policy: DisplayPolicy) -> Self {
        self.region.display = Some(policy);
        self
    }

    pub fn background_color(mut self, color: Color) -> Self {
        self.region.background.color = color;
        self
    }

    pub fn background_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.region.background.image = Some(path.into());
        self
    }

    pub fn audio_track(mut self, path: impl Into<PathBuf>) -> Self {
        self.region.audio_track = Some(path.into());
        self
    }

    /// Attribution text shown over the last 5 seconds of the region.
    pub fn audio_desc(mut self, text: impl Into<String>) -> Self {
        self.region.audio_desc = Some(text.into());
        self
    }

    pub fn excerpt(mut self, excerpt: Excerpt) -> Self {
        self.region.excerpts.push(excerpt);
        self
    }

    pub fn excerpts(mut self, excerpts: impl IntoIterator<Item = Excerpt>) -> Self {
        self.region.excerpts.extend(excerpts);
        self
    }

    pub fn watermark(mut self, watermark: Watermark) -> Self {
        self.region.watermarks.push(watermark);
        self
    }

    pub fn build(self) -> Region {
        self.region
    }
}

/// Assembles a [`Composition`] arena. Regions are created in call order, which is also their
/// default stacking order.
pub struct CompositionBuilder {
    regions: Vec<Region>,
    output: OutputSpec,
}

impl CompositionBuilder {
    pub fn new(root: RegionBuilder) -> Self {
        Self {
            regions: vec![root.build()],
            output: OutputSpec::default(),
        }
    }

    pub fn root(&self) -> RegionId {
        RegionId(0)
    }

    /// Create a region under `parent` and return its id.
    pub fn add(&mut self, parent: RegionId, region: RegionBuilder) -> VeditResult<RegionId> {
        if parent.index() >= self.regions.len() {
            return Err(VeditError::composition(format!(
                "unknown parent region {}",
                parent.0
            )));
        }
        let id = RegionId(self.regions.len() as u32);
        let mut region = region.build();
        region.parent = Some(parent);
        self.regions.push(region);
        Ok(id)
    }

    pub fn region_mut(&mut self, id: RegionId) -> VeditResult<&mut Region> {
        self.regions
            .get_mut(id.index())
            .ok_or_else(|| VeditError::composition(format!("unknown region {}", id.0)))
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.path = path.into();
        self
    }

    pub fn sar(mut self, sar: Sar) -> Self {
        self.output.sar = Some(sar);
        self
    }

    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.output.pixel_format = format;
        self
    }

    pub fn normalize_audio(mut self, on: bool) -> Self {
        self.output.normalize_audio = on;
        self
    }

    pub fn build(self) -> VeditResult<Composition> {
        let comp = Composition {
            regions: self.regions,
            root: RegionId(0),
            output: self.output,
        };
        comp.validate()?;
        Ok(comp)
    }
}

/// Nested, serde-friendly form of a region used for JSON input.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RegionDef {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    #[serde(default)]
    pub excerpts: Vec<Excerpt>,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub audio_track: Option<PathBuf>,
    #[serde(default)]
    pub audio_desc: Option<String>,
    #[serde(default)]
    pub watermarks: Vec<Watermark>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub z_index: Option<i64>,
    #[serde(default)]
    pub display: Option<DisplayPolicy>,
    #[serde(default)]
    pub children: Vec<RegionDef>,
}

fn default_width() -> u32 {
    DEFAULT_REGION_SIZE.0
}

fn default_height() -> u32 {
    DEFAULT_REGION_SIZE.1
}

/// JSON document: the root region tree plus output options.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CompositionDef {
    pub root: RegionDef,
    #[serde(default)]
    pub output: OutputSpec,
}

impl CompositionDef {
    /// Flatten into an arena. Regions are numbered in pre-order, so a parent is always created
    /// before its children and siblings keep their listed order.
    pub fn into_composition(self) -> VeditResult<Composition> {
        let mut regions = Vec::new();
        flatten(self.root, None, &mut regions);
        let comp = Composition {
            regions,
            root: RegionId(0),
            output: self.output,
        };
        comp.validate()?;
        Ok(comp)
    }

    pub fn from_json(text: &str) -> VeditResult<Composition> {
        let def: CompositionDef =
            serde_json::from_str(text).map_err(|e| VeditError::serde(e.to_string()))?;
        def.into_composition()
    }
}

fn flatten(def: RegionDef, parent: Option<RegionId>, out: &mut Vec<Region>) {
    let id = RegionId(out.len() as u32);
    out.push(Region {
        parent,
        width: def.width,
        height: def.height,
        x: def.x,
        y: def.y,
        excerpts: def.excerpts,
        background: def.background,
        audio_track: def.audio_track,
        audio_desc: def.audio_desc,
        watermarks: def.watermarks,
        duration: def.duration,
        z_index: def.z_index,
        display: def.display,
    });
    for child in def.children {
        flatten(child, Some(id), out);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/builder.rs"]
mod tests;
