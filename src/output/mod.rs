mod loopback;

pub use loopback::{rgb_to_yuv, V4L2Output};

use anyhow::Result;

use crate::raster::Raster;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output. Transparent pixels are flattened onto
    /// black.
    fn write_frame(&mut self, frame: &Raster) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}
