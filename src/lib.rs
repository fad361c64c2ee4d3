//! Real-time "invisibility" compositor: the subject is erased from live video
//! and the hole is filled from a previously captured background plate.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod error;
pub mod feather;
pub mod geometry;
pub mod host;
pub mod mask;
pub mod output;
pub mod pipeline;
pub mod plate;
pub mod projection;
pub mod raster;
pub mod scheduler;
pub mod segmentation;
