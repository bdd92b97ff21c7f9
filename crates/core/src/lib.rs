//! Live face spotlight: stabilizes per-frame face detections and composites
//! the tracked region into a small preview surface.

pub mod capture;
pub mod compositor;
pub mod detection;
pub mod pipeline;
pub mod shared;
