/// Decoded image: tightly packed RGBA8 rows, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 data. Returns `None` if the length does not match.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Single-colour image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_fn(width, height, |_, _| rgba)
    }

    /// Build an image pixel by pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be positive");
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGBA of the pixel at `(x, y)`, clamped to the image bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1)) as usize;
        let y = y.min(self.height.saturating_sub(1)) as usize;
        let i = (y * self.width as usize + x) * 4;
        match self.data.get(i..i + 4) {
            Some(&[r, g, b, a]) => [r, g, b, a],
            _ => [0; 4],
        }
    }

    /// Take over a decoded image. Returns `None` for a zero-size image.
    pub fn from_image(img: image::RgbaImage) -> Option<Self> {
        let (width, height) = img.dimensions();
        Self::from_rgba8(width, height, img.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        assert!(PixelBuffer::from_rgba8(2, 2, vec![0; 15]).is_none());
        assert!(PixelBuffer::from_rgba8(0, 2, vec![]).is_none());
        assert!(PixelBuffer::from_rgba8(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn pixel_lookup_clamps() {
        let img = PixelBuffer::from_fn(2, 2, |x, y| [x as u8, y as u8, 0, 255]);
        assert_eq!(img.pixel(1, 0), [1, 0, 0, 255]);
        assert_eq!(img.pixel(0, 1), [0, 1, 0, 255]);
        assert_eq!(img.pixel(9, 9), [1, 1, 0, 255]);
    }

    #[test]
    fn converts_from_image_crate() {
        let img = image::RgbaImage::from_pixel(3, 1, image::Rgba([9, 8, 7, 6]));
        let buf = PixelBuffer::from_image(img).unwrap();
        assert_eq!(buf.width(), 3);
        assert_eq!(buf.height(), 1);
        assert_eq!(buf.pixel(2, 0), [9, 8, 7, 6]);
    }

    #[test]
    fn zero_size_image_is_rejected() {
        assert!(PixelBuffer::from_image(image::RgbaImage::new(0, 0)).is_none());
        assert!(PixelBuffer::from_image(image::RgbaImage::new(4, 0)).is_none());
    }
}
