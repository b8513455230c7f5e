mod roi;
mod transform;

pub use roi::{compute_rect, RectSpec, RoiRect, PRESETS};
pub use transform::{Transform, BUTTON_ZOOM_STEP, MAX_SCALE, MIN_SCALE, WHEEL_ZOOM_STEP};
