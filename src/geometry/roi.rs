use std::fmt;
use std::str::FromStr;

/// Requested ROI size in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectSpec {
    pub width: u32,
    pub height: u32,
}

/// Selectable ROI sizes; the first entry is active on startup
pub const PRESETS: [RectSpec; 4] = [
    RectSpec::new(400, 200),
    RectSpec::new(200, 100),
    RectSpec::new(300, 300),
    RectSpec::new(600, 400),
];

impl RectSpec {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for RectSpec {
    fn default() -> Self {
        PRESETS[0]
    }
}

impl fmt::Display for RectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for RectSpec {
    type Err = String;

    /// Parses `WxH`, e.g. `400x200`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w
            .trim()
            .parse()
            .map_err(|e| format!("bad rectangle width '{w}': {e}"))?;
        let height = h
            .trim()
            .parse()
            .map_err(|e| format!("bad rectangle height '{h}': {e}"))?;
        Ok(Self::new(width, height))
    }
}

/// A rectangle centered in a canvas and clipped to it.
///
/// Width or height may come out as zero (or negative for a zero-sized
/// canvas); such a rectangle is degenerate and must not be drawn or measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiRect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl RoiRect {
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    pub fn area(&self) -> u64 {
        if self.is_degenerate() {
            0
        } else {
            (self.w * self.h) as u64
        }
    }
}

/// Center `spec` in a `canvas_w` x `canvas_h` canvas.
///
/// A request larger than the canvas is clipped flush to the canvas edges
/// instead of failing.
pub fn compute_rect(canvas_w: u32, canvas_h: u32, spec: RectSpec) -> RoiRect {
    let (cw, ch) = (canvas_w as i64, canvas_h as i64);
    let (sw, sh) = (spec.width as i64, spec.height as i64);

    let x = (cw - sw).div_euclid(2).max(0);
    let y = (ch - sh).div_euclid(2).max(0);

    RoiRect {
        x,
        y,
        w: sw.min(cw - x),
        h: sh.min(ch - y),
    }
}
