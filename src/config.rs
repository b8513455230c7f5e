//! Filter configuration: the HSV bounds, invert flag and ROI selection.
//!
//! The HSV bounds round-trip through a small JSON file:
//!
//! ```json
//! {
//!   "hueLow": 0,
//!   "hueHigh": 10,
//!   "satLow": 100,
//!   "satHigh": 255,
//!   "valLow": 100,
//!   "valHigh": 255,
//!   "invertMask": false
//! }
//! ```
//!
//! Loading is all-or-nothing: one bad key rejects the whole file.

use crate::error::{Error, Result};
use crate::geometry::RectSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HUE_MAX: u8 = 179;
pub const SAT_VAL_MAX: u8 = 255;

/// Inclusive HSV bounds (OpenCV 8-bit scale: hue 0-179) plus mask inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HsvRange {
    pub hue_low: u8,
    pub hue_high: u8,
    pub sat_low: u8,
    pub sat_high: u8,
    pub val_low: u8,
    pub val_high: u8,
    #[serde(rename = "invertMask")]
    pub invert: bool,
}

impl Default for HsvRange {
    fn default() -> Self {
        Self {
            hue_low: 0,
            hue_high: 10,
            sat_low: 100,
            sat_high: 255,
            val_low: 100,
            val_high: 255,
            invert: false,
        }
    }
}

/// One of the six slider-controlled bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    HueLow,
    HueHigh,
    SatLow,
    SatHigh,
    ValLow,
    ValHigh,
}

impl Bound {
    pub const ALL: [Bound; 6] = [
        Bound::HueLow,
        Bound::HueHigh,
        Bound::SatLow,
        Bound::SatHigh,
        Bound::ValLow,
        Bound::ValHigh,
    ];

    /// JSON key, also accepted on the event script
    pub fn key(self) -> &'static str {
        match self {
            Bound::HueLow => "hueLow",
            Bound::HueHigh => "hueHigh",
            Bound::SatLow => "satLow",
            Bound::SatHigh => "satHigh",
            Bound::ValLow => "valLow",
            Bound::ValHigh => "valHigh",
        }
    }

    pub fn max(self) -> u8 {
        match self {
            Bound::HueLow | Bound::HueHigh => HUE_MAX,
            _ => SAT_VAL_MAX,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key().eq_ignore_ascii_case(key))
    }
}

impl HsvRange {
    pub fn get(&self, bound: Bound) -> u8 {
        match bound {
            Bound::HueLow => self.hue_low,
            Bound::HueHigh => self.hue_high,
            Bound::SatLow => self.sat_low,
            Bound::SatHigh => self.sat_high,
            Bound::ValLow => self.val_low,
            Bound::ValHigh => self.val_high,
        }
    }

    /// Set one bound, rejecting values outside the slider range
    pub fn set(&mut self, bound: Bound, value: u32) -> Result<()> {
        if value > bound.max() as u32 {
            return Err(Error::InvalidConfig(format!(
                "{} must be within 0..={}, got {}",
                bound.key(),
                bound.max(),
                value
            )));
        }
        let value = value as u8;
        match bound {
            Bound::HueLow => self.hue_low = value,
            Bound::HueHigh => self.hue_high = value,
            Bound::SatLow => self.sat_low = value,
            Bound::SatHigh => self.sat_high = value,
            Bound::ValLow => self.val_low = value,
            Bound::ValHigh => self.val_high = value,
        }
        Ok(())
    }

    /// Lower bounds as (h, s, v)
    pub fn lower(&self) -> [u8; 3] {
        [self.hue_low, self.sat_low, self.val_low]
    }

    /// Upper bounds as (h, s, v)
    pub fn upper(&self) -> [u8; 3] {
        [self.hue_high, self.sat_high, self.val_high]
    }

    /// Parse a config file, validating every bound before anything is applied.
    ///
    /// `invertMask` is optional; when absent or not a boolean the invert flag
    /// of `current` is kept.
    pub fn from_json(json: &str, current: &HsvRange) -> Result<HsvRange> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidConfig("expected a JSON object".to_string()))?;

        let mut problems = Vec::new();
        let mut parsed = *current;

        for bound in Bound::ALL {
            match object.get(bound.key()) {
                None => problems.push(format!("{} is missing", bound.key())),
                Some(v) => match v.as_u64() {
                    Some(n) if n <= bound.max() as u64 => {
                        parsed.set(bound, n as u32)?;
                    }
                    _ => problems.push(format!(
                        "{} must be an integer within 0..={}, got {}",
                        bound.key(),
                        bound.max(),
                        v
                    )),
                },
            }
        }

        if !problems.is_empty() {
            for problem in &problems {
                tracing::error!("rejected config: {}", problem);
            }
            return Err(Error::InvalidConfig(problems.join("; ")));
        }

        if let Some(invert) = object.get("invertMask").and_then(Value::as_bool) {
            parsed.invert = invert;
        }

        Ok(parsed)
    }

    /// Pretty-printed JSON with the six bounds and `invertMask`
    pub fn to_json(&self) -> String {
        // a struct of integers and a bool always serializes
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Everything the filter needs besides the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub range: HsvRange,
    pub rect: RectSpec,
    pub show_rect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            range: HsvRange::default(),
            rect: RectSpec::default(),
            show_rect: true,
        }
    }
}

impl SessionConfig {
    /// Apply a config file. On error the current range is left untouched.
    pub fn load(&mut self, json: &str) -> Result<HsvRange> {
        self.range = HsvRange::from_json(json, &self.range)?;
        tracing::info!("loaded HSV config {:?}", self.range);
        Ok(self.range)
    }

    /// Restore the default bounds and clear the invert flag
    pub fn reset(&mut self) -> HsvRange {
        self.range = HsvRange::default();
        self.range
    }

    pub fn export(&self) -> String {
        self.range.to_json()
    }

    /// The ROI to measure, or `None` when the rectangle is hidden
    pub fn active_rect(&self) -> Option<RectSpec> {
        self.show_rect.then_some(self.rect)
    }
}
