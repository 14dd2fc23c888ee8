use ndarray::ArrayView3;

use crate::shared::rect::Rect;

/// A single video frame: contiguous RGB bytes in row-major order.
///
/// Colour conversion happens at source/sink boundaries only; everything
/// in between works on RGB.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// A uniformly filled RGB frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Copies the part of `rect` that lies inside the frame.
    ///
    /// Returns `None` when the visible part is empty. The crop keeps the
    /// source frame index.
    pub fn crop(&self, rect: &Rect) -> Option<Frame> {
        let visible = rect.clamp_to(self.width, self.height)?;
        let channels = self.channels as usize;
        let (x, y) = (visible.x as usize, visible.y as usize);
        let (w, h) = (visible.width as usize, visible.height as usize);
        let stride = self.width as usize * channels;

        let mut out = Vec::with_capacity(w * h * channels);
        for row in y..y + h {
            let start = row * stride + x * channels;
            out.extend_from_slice(&self.data[start..start + w * channels]);
        }
        Some(Frame::new(out, w as u32, h as u32, self.channels, self.index))
    }

    /// Writes one pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let channels = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        let n = channels.min(3);
        self.data[offset..offset + n].copy_from_slice(&rgb[..n]);
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        &self.data[offset..offset + channels]
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_filled_sets_every_pixel() {
        let frame = Frame::filled(3, 2, [1, 2, 3], 0);
        assert_eq!(frame.data().len(), 18);
        assert_eq!(frame.pixel(2, 1), &[1, 2, 3]);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_rows() {
        // 4x4 frame where the red channel encodes x + 10 * y
        let mut data = Vec::new();
        for y in 0..4u8 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x + 10 * y, 0, 0]);
            }
        }
        let frame = Frame::new(data, 4, 4, 3, 7);

        let crop = frame.crop(&Rect::new(1, 2, 2, 2)).unwrap();

        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.index(), 7);
        assert_eq!(crop.pixel(0, 0)[0], 21);
        assert_eq!(crop.pixel(1, 1)[0], 32);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = Frame::filled(10, 10, [9, 9, 9], 0);
        let crop = frame.crop(&Rect::new(-5, 6, 8, 8)).unwrap();
        assert_eq!((crop.width(), crop.height()), (3, 4));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = Frame::filled(10, 10, [0, 0, 0], 0);
        assert!(frame.crop(&Rect::new(20, 20, 5, 5)).is_none());
        assert!(frame.crop(&Rect::new(2, 2, 0, 5)).is_none());
    }

    #[test]
    fn test_put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0], 0);
        frame.put_pixel(-1, 0, [255, 0, 0]);
        frame.put_pixel(2, 1, [255, 0, 0]);
        frame.put_pixel(1, 1, [255, 0, 0]);
        assert_eq!(frame.data().iter().filter(|&&v| v == 255).count(), 1);
        assert_eq!(frame.pixel(1, 1), &[255, 0, 0]);
    }
}
