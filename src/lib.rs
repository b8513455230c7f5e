//! HSV color-range capture: grab a frame from a camera or a still image,
//! mask the pixels inside an HSV range and measure how much of a centered
//! rectangle they cover.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod output;
pub mod segmentation;
pub mod session;

pub use error::{Error, Result};
