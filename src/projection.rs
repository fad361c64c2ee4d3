use crate::raster::Raster;

/// Where a source raster lands inside a destination raster.
///
/// Built by [`cover`] (uniform scale, fill and crop) or [`stretch`]
/// (independent scales, exact fit). When `mirror` is set the destination
/// space is flipped horizontally about its own center before drawing, so
/// two rasters placed with the same geometry and flag stay aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale_x: f32,
    pub scale_y: f32,
    pub target_width: f32,
    pub target_height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub mirror: bool,
    source: (u32, u32),
    dest: (u32, u32),
}

/// Cover fit: `s = max(dw/sw, dh/sh)`, target `(sw*s, sh*s)` centered in the
/// destination. The overflowing dimension is cropped equally on both sides.
pub fn cover(source: (u32, u32), dest: (u32, u32), mirror: bool) -> Placement {
    let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
    let (dw, dh) = (dest.0.max(1) as f32, dest.1.max(1) as f32);
    let scale = (dw / sw).max(dh / sh);
    let target_width = sw * scale;
    let target_height = sh * scale;
    Placement {
        scale_x: scale,
        scale_y: scale,
        target_width,
        target_height,
        offset_x: (dw - target_width) / 2.0,
        offset_y: (dh - target_height) / 2.0,
        mirror,
        source: (source.0.max(1), source.1.max(1)),
        dest: (dest.0.max(1), dest.1.max(1)),
    }
}

/// Stretch fit: the source is scaled independently per axis to exactly the
/// destination rectangle.
pub fn stretch(source: (u32, u32), dest: (u32, u32), mirror: bool) -> Placement {
    let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
    let (dw, dh) = (dest.0.max(1) as f32, dest.1.max(1) as f32);
    Placement {
        scale_x: dw / sw,
        scale_y: dh / sh,
        target_width: dw,
        target_height: dh,
        offset_x: 0.0,
        offset_y: 0.0,
        mirror,
        source: (source.0.max(1), source.1.max(1)),
        dest: (dest.0.max(1), dest.1.max(1)),
    }
}

impl Placement {
    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source
    }

    pub fn dest_dimensions(&self) -> (u32, u32) {
        self.dest
    }

    /// Source pixel sampled for destination pixel `(x, y)`, or `None` when the
    /// destination pixel center lies outside the placed target.
    #[inline]
    pub fn source_pixel(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        let u = if self.mirror {
            self.dest.0 as f32 - (x as f32 + 0.5)
        } else {
            x as f32 + 0.5
        };
        let v = y as f32 + 0.5;
        let local_x = u - self.offset_x;
        let local_y = v - self.offset_y;
        if local_x < 0.0
            || local_y < 0.0
            || local_x >= self.target_width
            || local_y >= self.target_height
        {
            return None;
        }
        let sx = ((local_x / self.scale_x) as u32).min(self.source.0 - 1);
        let sy = ((local_y / self.scale_y) as u32).min(self.source.1 - 1);
        Some((sx, sy))
    }
}

/// Walk every destination pixel covered by `placement` and hand it, with the
/// sampled source pixel, to `blend`.
pub fn draw<F>(src: &Raster, dst: &mut Raster, placement: &Placement, mut blend: F)
where
    F: FnMut(&mut [u8], [u8; 4]),
{
    if src.as_bytes().is_empty() {
        return;
    }
    debug_assert_eq!(src.dimensions(), placement.source);
    debug_assert_eq!(dst.dimensions(), placement.dest);
    let (dw, dh) = dst.dimensions();
    let stride = dw as usize * 4;
    let bytes = dst.as_bytes_mut();
    for y in 0..dh {
        let row = &mut bytes[y as usize * stride..(y as usize + 1) * stride];
        for x in 0..dw {
            if let Some((sx, sy)) = placement.source_pixel(x, y) {
                let i = x as usize * 4;
                blend(&mut row[i..i + 4], src.pixel(sx, sy));
            }
        }
    }
}

/// Plain copy draw (source replaces destination where covered).
pub fn draw_copy(src: &Raster, dst: &mut Raster, placement: &Placement) {
    draw(src, dst, placement, |d, s| d.copy_from_slice(&s));
}
