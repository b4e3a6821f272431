use std::fmt;
use std::str::FromStr;

use crate::foundation::error::{VeditError, VeditResult};

pub use kurbo::{Affine, Rect, Vec2};

/// Sample aspect ratio (the width:height shape of one pixel) as a rational `num:den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sar {
    /// Numerator (pixel width).
    pub num: u32,
    /// Denominator (pixel height).
    pub den: u32,
}

impl Sar {
    /// Square pixels.
    pub const SQUARE: Sar = Sar { num: 1, den: 1 };

    /// Create a validated SAR. A zero numerator is accepted (it is normalized later), a zero
    /// denominator is not.
    pub fn new(num: u32, den: u32) -> VeditResult<Self> {
        if den == 0 {
            return Err(VeditError::validation("sample aspect ratio denominator must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Ratio as floating point.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Return `true` for an exact 1:1 ratio in any reduced or unreduced form.
    pub fn is_square(self) -> bool {
        self.num == self.den
    }

    /// Collapse nonsense and near-square ratios onto 1:1.
    ///
    /// `0:n` is treated as 1:1, and any ratio strictly inside `(0.9, 1.1)` is assumed to be a
    /// rounding artifact of a square-pixel source (e.g. `649:639`).
    pub fn normalized(self) -> Self {
        if self.num == 0 || self.den == 0 {
            return Self::SQUARE;
        }
        let r = self.as_f64();
        if r > 0.9 && r < 1.1 {
            return Self::SQUARE;
        }
        self.reduced()
    }

    /// Reduce to lowest terms so equal ratios compare equal.
    pub fn reduced(self) -> Self {
        fn gcd(a: u32, b: u32) -> u32 {
            if b == 0 { a } else { gcd(b, a % b) }
        }
        let g = gcd(self.num, self.den).max(1);
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }
}

impl Default for Sar {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl fmt::Display for Sar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

impl FromStr for Sar {
    type Err = VeditError;

    /// Parse `W:H` (ffprobe's notation) or `W/H`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (a, b) = s
            .split_once(':')
            .or_else(|| s.split_once('/'))
            .ok_or_else(|| {
                VeditError::validation(format!("sample aspect ratio '{s}' must be in W:H format"))
            })?;
        let num = a.trim().parse::<u32>().map_err(|_| {
            VeditError::validation(format!("sample aspect ratio '{s}' must be in W:H format"))
        })?;
        let den = b.trim().parse::<u32>().map_err(|_| {
            VeditError::validation(format!("sample aspect ratio '{s}' must be in W:H format"))
        })?;
        Self::new(num, den)
    }
}

impl TryFrom<String> for Sar {
    type Error = VeditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sar> for String {
    fn from(value: Sar) -> Self {
        value.to_string()
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl FrameRate {
    /// NTSC 29.97, the fixed output rate of every transcode and composition.
    pub const NTSC_30: FrameRate = FrameRate {
        num: 30000,
        den: 1001,
    };

    /// Create a validated rate.
    pub fn new(num: u32, den: u32) -> VeditResult<Self> {
        if den == 0 || num == 0 {
            return Err(VeditError::validation("frame rate num/den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A colour understood by the backend: a named colour (`"Black"`, `"green"`) or `#RRGGBB`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    /// Parse and validate a colour spec.
    pub fn new(spec: impl Into<String>) -> VeditResult<Self> {
        let spec = spec.into();
        let s = spec.trim();
        if s.is_empty() {
            return Err(VeditError::validation("color must be non-empty"));
        }
        if let Some(hex) = s.strip_prefix('#').or_else(|| s.strip_prefix("0x")) {
            let ok = (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit());
            if !ok {
                return Err(VeditError::validation(format!(
                    "color '{s}' must be #RRGGBB or #RRGGBBAA"
                )));
            }
            return Ok(Self(format!("#{hex}")));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(VeditError::validation(format!("invalid color name '{s}'")));
        }
        Ok(Self(s.to_string()))
    }

    /// Solid black.
    pub fn black() -> Self {
        Self("black".to_string())
    }

    /// Solid white.
    pub fn white() -> Self {
        Self("white".to_string())
    }

    /// Backend spelling of this colour.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Color {
    type Error = VeditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.0
    }
}

/// Output pixel format, defaulting to 4:2:0 chroma-subsampled `yuv420p`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PixelFormat(String);

impl PixelFormat {
    /// Validate a pixel format name (`yuv420p`, `yuv422p10le`, ...).
    pub fn new(name: impl Into<String>) -> VeditResult<Self> {
        let name = name.into();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(VeditError::validation(format!("invalid pixel format '{name}'")));
        }
        Ok(Self(name))
    }

    /// Backend spelling of this format.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self("yuv420p".to_string())
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = VeditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PixelFormat> for String {
    fn from(value: PixelFormat) -> Self {
        value.0
    }
}

/// Integer pixel rectangle, positioned relative to some parent surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Construct a rectangle.
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Same rectangle moved by `(dx, dy)`.
    pub fn offset(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Floating-point view for geometric queries.
    pub fn to_kurbo(self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.x as f64 + f64::from(self.width),
            self.y as f64 + f64::from(self.height),
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
