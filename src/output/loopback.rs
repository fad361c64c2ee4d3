use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

use crate::raster::Raster;

/// Writes YUYV frames to a v4l2loopback device.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        negotiate_format(path, width, height);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Announce the YUYV format so consumers see the right geometry. Failure is
/// not fatal; some loopback setups fix the format at module load.
fn negotiate_format(path: &Path, width: u32, height: u32) {
    let device = match Device::with_path(path) {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!("Could not query {}: {}", path.display(), e);
            return;
        }
    };
    let wanted = Format::new(width, height, FourCC::new(b"YUYV"));
    match Output::set_format(&device, &wanted) {
        Ok(actual) if actual.width == width && actual.height == height => {
            tracing::debug!("Loopback format set to {}x{} YUYV", width, height);
        }
        Ok(actual) => tracing::warn!(
            "Loopback device settled on {}x{} instead of {}x{}",
            actual.width,
            actual.height,
            width,
            height
        ),
        Err(e) => tracing::warn!("Failed to set loopback format: {}", e),
    }
}

/// Pack an RGB image as YUV 4:2:2, two pixels per `Y0 U Y1 V` group.
fn rgb_to_yuyv(rgb_image: &RgbImage, yuyv: &mut Vec<u8>) {
    let (width, height) = rgb_image.dimensions();
    yuyv.clear();

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = rgb_image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                rgb_image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            // chroma is shared by the pair
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }
}

/// BT.601 RGB to YUV.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &Raster) -> Result<()> {
        let mut rgb = frame.to_rgb_image();
        if rgb.dimensions() != (self.width, self.height) {
            rgb = image::imageops::resize(
                &rgb,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
        }

        rgb_to_yuyv(&rgb, &mut self.yuyv);

        self.file
            .write_all(&self.yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
