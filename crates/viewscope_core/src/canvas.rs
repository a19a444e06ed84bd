//! Paint surfaces for capturing node output.
//!
//! [`Pixmap`] is an offscreen RGBA buffer with a painter's stack (offset and
//! clip). [`TouchTracker`] wraps any canvas and remembers whether anything
//! was done to it, so untouched captures can be thrown away unencoded.

use image::{Rgba, RgbaImage};
use palette::Srgba;

use crate::Rect;

/// Drawing operations a node may use while painting itself.
pub trait Canvas {
    /// Size of the backing surface in pixels.
    fn size(&self) -> (u32, u32);

    /// Push the current offset and clip.
    fn save(&mut self);

    /// Pop back to the last saved offset and clip.
    fn restore(&mut self);

    fn translate(&mut self, dx: i32, dy: i32);

    /// Intersect the current clip with `rect` (in local coordinates).
    fn clip_rect(&mut self, rect: Rect);

    fn fill_rect(&mut self, rect: Rect, color: Srgba<u8>);

    /// Overwrite the whole surface, ignoring offset and clip.
    fn clear(&mut self, color: Srgba<u8>);
}

#[derive(Debug, Clone, Copy)]
struct PaintState {
    offset: (i32, i32),
    clip: Rect,
}

/// Offscreen RGBA surface backed by an [`RgbaImage`].
pub struct Pixmap {
    image: RgbaImage,
    state: PaintState,
    stack: Vec<PaintState>,
}

impl Pixmap {
    /// Allocate a transparent surface.
    ///
    /// Returns `None` for empty sizes and when the pixel buffer cannot be
    /// reserved; callers treat both as "nothing to capture".
    pub fn try_new(width: i32, height: i32) -> Option<Self> {
        if width <= 0 || height <= 0 {
            return None;
        }

        let len = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        let mut pixels = Vec::new();
        if let Err(err) = pixels.try_reserve_exact(len) {
            tracing::debug!(width, height, %err, "pixmap allocation failed");
            return None;
        }
        pixels.resize(len, 0);

        let image = RgbaImage::from_raw(width as u32, height as u32, pixels)?;
        Some(Self {
            image,
            state: PaintState {
                offset: (0, 0),
                clip: Rect::from_size(width, height),
            },
            stack: Vec::new(),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Read back one pixel, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Srgba<u8>> {
        let Rgba([r, g, b, a]) = *self.image.get_pixel_checked(x, y)?;
        Some(Srgba::new(r, g, b, a))
    }
}

impl Canvas for Pixmap {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.state.offset.0 += dx;
        self.state.offset.1 += dy;
    }

    fn clip_rect(&mut self, rect: Rect) {
        let (dx, dy) = self.state.offset;
        // An empty clip swallows all later fills until restore.
        self.state.clip = self
            .state
            .clip
            .intersect(&rect.offset(dx, dy))
            .unwrap_or_default();
    }

    fn fill_rect(&mut self, rect: Rect, color: Srgba<u8>) {
        let (dx, dy) = self.state.offset;
        let Some(area) = rect.offset(dx, dy).intersect(&self.state.clip) else {
            return;
        };

        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let dst = self.image.get_pixel_mut(x as u32, y as u32);
                blend_over(dst, color);
            }
        }
    }

    fn clear(&mut self, color: Srgba<u8>) {
        let fill = Rgba([color.red, color.green, color.blue, color.alpha]);
        for pixel in self.image.pixels_mut() {
            *pixel = fill;
        }
    }
}

/// Source-over compositing of a straight-alpha colour onto a pixel.
fn blend_over(dst: &mut Rgba<u8>, src: Srgba<u8>) {
    let sa = src.alpha as u32;
    if sa == 0 {
        return;
    }
    if sa == 255 {
        *dst = Rgba([src.red, src.green, src.blue, 255]);
        return;
    }

    let da = dst[3] as u32 * (255 - sa) / 255;
    let out_a = sa + da;
    let mix = |s: u8, d: u8| ((s as u32 * sa + d as u32 * da) / out_a) as u8;
    *dst = Rgba([
        mix(src.red, dst[0]),
        mix(src.green, dst[1]),
        mix(src.blue, dst[2]),
        out_a as u8,
    ]);
}

/// Canvas decorator that records whether any mutating call reached it.
pub struct TouchTracker<'a> {
    inner: &'a mut dyn Canvas,
    touched: bool,
}

impl<'a> TouchTracker<'a> {
    pub fn new(inner: &'a mut dyn Canvas) -> Self {
        Self {
            inner,
            touched: false,
        }
    }

    pub fn was_touched(&self) -> bool {
        self.touched
    }
}

impl Canvas for TouchTracker<'_> {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn save(&mut self) {
        self.touched = true;
        self.inner.save();
    }

    fn restore(&mut self) {
        self.touched = true;
        self.inner.restore();
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.touched = true;
        self.inner.translate(dx, dy);
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.touched = true;
        self.inner.clip_rect(rect);
    }

    fn fill_rect(&mut self, rect: Rect, color: Srgba<u8>) {
        self.touched = true;
        self.inner.fill_rect(rect, color);
    }

    fn clear(&mut self, color: Srgba<u8>) {
        self.touched = true;
        self.inner.clear(color);
    }
}
