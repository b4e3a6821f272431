use std::fmt;
use std::path::Path;
use std::str::FromStr;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::PixelFormat;
use crate::foundation::error::{VeditError, VeditResult};
use crate::scene::model::{DisplayStyle, PanDirection};

const XXH3_SEED: u64 = 0x5ed1_7c0d_e4a1_9b37;

/// Cache key capturing everything that determines an excerpt's transcoded bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl Fingerprint {
    /// 32 lowercase hex digits; also the artifact file stem.
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = VeditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VeditError::cache(format!("invalid fingerprint '{s}'")));
        }
        let hi = u64::from_str_radix(&s[..16], 16)
            .map_err(|e| VeditError::cache(format!("invalid fingerprint '{s}': {e}")))?;
        let lo = u64::from_str_radix(&s[16..], 16)
            .map_err(|e| VeditError::cache(format!("invalid fingerprint '{s}': {e}")))?;
        Ok(Self { hi, lo })
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Inputs of one excerpt fingerprint.
///
/// `pan_direction` is only hashed for PAN excerpts whose configured direction alternates,
/// because only then can the same excerpt render two different ways in one tree.
#[derive(Clone, Debug)]
pub struct FingerprintInput<'a> {
    pub source: &'a Path,
    pub start: f64,
    pub end: f64,
    pub style: DisplayStyle,
    pub target_width: u32,
    pub target_height: u32,
    pub configured_pan: PanDirection,
    pub concrete_pan: Option<PanDirection>,
    pub pixel_format: &'a PixelFormat,
    pub include_audio: bool,
}

pub fn fingerprint_excerpt(input: &FingerprintInput<'_>) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_str(&input.source.to_string_lossy());
    h.write_f64(input.start);
    h.write_f64(input.end);
    h.write_str(input.style.as_str());
    h.write_u32(input.target_width);
    h.write_u32(input.target_height);
    let pan = if input.style == DisplayStyle::Pan && input.configured_pan == PanDirection::Alternate
    {
        input.concrete_pan
    } else {
        None
    };
    match pan {
        Some(p) => {
            h.write_u8(1);
            h.write_u8(pan_tag(p));
        }
        None => h.write_u8(0),
    }
    h.write_str(input.pixel_format.as_str());
    h.write_bool(input.include_audio);
    h.finish()
}

fn pan_tag(p: PanDirection) -> u8 {
    match p {
        PanDirection::Up => 1,
        PanDirection::Down => 2,
        PanDirection::Left => 3,
        PanDirection::Right => 4,
        PanDirection::Alternate => 5,
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        // -0.0 and 0.0 are the same offset
        let v = if v == 0.0 { 0.0 } else { v };
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/fingerprint.rs"]
mod tests;
