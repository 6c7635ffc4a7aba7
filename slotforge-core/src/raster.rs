//! Raster Surface - Display List to Pixels
//!
//! Replays a `DisplayList` into a tiny-skia pixmap. Text is drawn as
//! per-glyph coverage boxes from the layout's advances; hosts that need real
//! outlines replay the same list into their own text stack.

use tiny_skia::{FilterQuality, IntSize, Paint, Pattern, Pixmap, SpreadMode, Transform};

use crate::assets::DecodedImage;
use crate::hashing::sha256_hex;
use crate::model::{Bounds, Color, Rect};
use crate::render::{DisplayList, DrawOp, PlacedLine, RenderError, Surface};

#[derive(Debug, Default)]
pub struct PixmapSurface {
    pixmap: Option<Pixmap>,
}

impl PixmapSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    /// Premultiplied RGBA8 of the last paint.
    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixmap.as_ref().map(|p| p.data())
    }

    pub fn digest(&self) -> Option<String> {
        self.pixels().map(sha256_hex)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        let pixmap = self
            .pixmap
            .as_ref()
            .ok_or_else(|| RenderError::Surface("nothing painted yet".into()))?;
        pixmap.encode_png().map_err(|e| RenderError::Surface(e.to_string()))
    }
}

impl Surface for PixmapSurface {
    fn paint(&mut self, list: &DisplayList) -> Result<(), RenderError> {
        let mut pixmap = Pixmap::new(list.width, list.height)
            .ok_or(RenderError::InvalidCanvas { width: list.width, height: list.height })?;

        for op in &list.ops {
            match op {
                DrawOp::Clear { color, .. } => pixmap.fill(sk_color(*color)),
                DrawOp::FillRect { frame, rect, color } => {
                    fill_rect(&mut pixmap, *rect, *color, frame_transform(frame));
                }
                DrawOp::Image { frame, source, dest, image } => {
                    draw_image(&mut pixmap, image, *source, *dest, frame_transform(frame))?;
                }
                DrawOp::Text { frame, color, font_size, lines, .. } => {
                    let transform = frame_transform(frame);
                    for line in lines {
                        draw_line(&mut pixmap, line, *font_size, *color, transform);
                    }
                }
            }
        }

        self.pixmap = Some(pixmap);
        Ok(())
    }
}

fn sk_color(c: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

/// Cell-local space to canvas space: rotate about the box centre, then place.
fn frame_transform(frame: &Bounds) -> Transform {
    let placed = Transform::from_translate(frame.x as f32, frame.y as f32);
    if frame.rotation == 0.0 {
        return placed;
    }
    placed.pre_concat(Transform::from_rotate_at(
        frame.rotation as f32,
        (frame.width / 2.0) as f32,
        (frame.height / 2.0) as f32,
    ))
}

fn fill_rect(pixmap: &mut Pixmap, rect: Rect, color: Color, transform: Transform) {
    let Some(r) = tiny_skia::Rect::from_xywh(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32)
    else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(sk_color(color));
    paint.anti_alias = true;
    pixmap.fill_rect(r, &paint, transform, None);
}

fn premultiplied(image: &DecodedImage) -> Option<Pixmap> {
    let mut data = Vec::with_capacity(image.pixels().len());
    for px in image.pixels().chunks_exact(4) {
        let a = px[3] as u16;
        let mul = |c: u8| ((c as u16 * a + 127) / 255) as u8;
        data.extend_from_slice(&[mul(px[0]), mul(px[1]), mul(px[2]), px[3]]);
    }
    Pixmap::from_vec(data, IntSize::from_wh(image.width(), image.height())?)
}

fn draw_image(
    pixmap: &mut Pixmap,
    image: &DecodedImage,
    source: Rect,
    dest: Rect,
    transform: Transform,
) -> Result<(), RenderError> {
    if source.is_empty() || dest.is_empty() {
        return Ok(());
    }
    let texture = premultiplied(image).ok_or_else(|| RenderError::Surface("image too large for pixmap".into()))?;
    let Some(target) = tiny_skia::Rect::from_xywh(dest.x as f32, dest.y as f32, dest.width as f32, dest.height as f32)
    else {
        return Ok(());
    };

    // image pixels -> cell-local: scale source onto dest
    let sx = dest.width / source.width;
    let sy = dest.height / source.height;
    let pattern = Transform::from_row(
        sx as f32,
        0.0,
        0.0,
        sy as f32,
        (dest.x - source.x * sx) as f32,
        (dest.y - source.y * sy) as f32,
    );

    let mut paint = Paint::default();
    paint.shader = Pattern::new(texture.as_ref(), SpreadMode::Pad, FilterQuality::Bilinear, 1.0, pattern);
    paint.anti_alias = true;
    pixmap.fill_rect(target, &paint, transform, None);
    Ok(())
}

fn draw_line(pixmap: &mut Pixmap, line: &PlacedLine, font_size: f64, color: Color, transform: Transform) {
    for glyph in line.glyphs.iter().filter(|g| !g.ch.is_whitespace()) {
        let tall = glyph.ch.is_uppercase() || glyph.ch.is_ascii_digit();
        let height = font_size * if tall { 0.7 } else { 0.5 };
        let rect = Rect::new(
            line.x + glyph.x + glyph.advance * 0.1,
            line.baseline - height,
            glyph.advance * 0.8,
            height,
        );
        fill_rect(pixmap, rect, color, transform);
    }
}
