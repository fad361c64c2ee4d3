use image::RgbImage;

/// Rectangular RGBA8 pixel buffer, row-major, 4 bytes per pixel.
///
/// Used for color rasters (video, plate, output) and for masks. For masks
/// only the alpha channel carries meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    /// Raster filled with one RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut raster = Self::new(width, height);
        raster.fill(rgba);
        raster
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut raster = Self::new(width, height);
        raster.copy_from_rgb(image);
        raster
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Change dimensions, reusing the existing allocation where possible.
    /// Returns true when the dimensions actually changed. Contents are
    /// cleared on change.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize((width as usize) * (height as usize) * 4, 0);
        true
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * 4
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    #[inline]
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.data[self.offset(x, y) + 3]
    }

    /// Copy an opaque RGB frame in, resizing in place if needed.
    pub fn copy_from_rgb(&mut self, image: &RgbImage) {
        let (width, height) = image.dimensions();
        self.resize(width, height);
        for (dst, src) in self.data.chunks_exact_mut(4).zip(image.as_raw().chunks_exact(3)) {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        }
    }

    /// Flatten onto black and drop alpha.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b, a] = self.pixel(x, y);
            let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
            image::Rgb([scale(r), scale(g), scale(b)])
        })
    }

    /// Number of pixels with non-zero alpha.
    pub fn opaque_count(&self) -> usize {
        self.data.chunks_exact(4).filter(|px| px[3] > 0).count()
    }
}
