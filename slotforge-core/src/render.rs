//! Shared Renderer - Single Entry Point
//!
//! CRITICAL: every caller (designer canvas, end-user canvas, export) paints a
//! page through `Renderer::render`. It takes page state and nothing else, so
//! there is no way to ask it to behave differently for a particular audience.
//! Designer-only guides are hidden cells, not a renderer flag.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

use crate::assets::DecodedImage;
use crate::config::EngineConfig;
use crate::constraints::fit_image;
use crate::hashing::canonical_digest;
use crate::model::{Background, Bounds, CellContent, Color, FontSpec, MediaContent, Page, Rect, TextAlign};
use crate::text::{Glyph, TextLayout};

#[cfg(feature = "test-hooks")]
thread_local! {
    static RENDER_CALL_COUNT: std::cell::Cell<u32> = std::cell::Cell::new(0);
}

/// Renderer invocations on the current thread.
#[cfg(feature = "test-hooks")]
pub fn get_render_call_count() -> u32 {
    RENDER_CALL_COUNT.with(|c| c.get())
}

#[cfg(feature = "test-hooks")]
pub fn reset_render_call_count() {
    RENDER_CALL_COUNT.with(|c| c.set(0));
}

/// Ascent used to place the baseline, as a fraction of font size.
const ASCENT: f64 = 0.8;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("Page {0} has no background")]
    MissingBackground(u32),

    #[error("Page {0} has no cells")]
    EmptyPage(u32),

    #[error("Invalid canvas size {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("Surface error: {0}")]
    Surface(String),
}

fn serialize_image<S: Serializer>(image: &Arc<DecodedImage>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(image.digest())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub text: String,
    /// Left edge and top of the line box, cell-local.
    pub x: f64,
    pub y: f64,
    pub baseline: f64,
    pub glyphs: Vec<Glyph>,
}

/// One paint instruction. Geometry inside `frame` is cell-local; the surface
/// applies the frame's translation and rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawOp {
    Clear {
        width: u32,
        height: u32,
        color: Color,
    },
    FillRect {
        frame: Bounds,
        rect: Rect,
        color: Color,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        frame: Bounds,
        source: Rect,
        dest: Rect,
        #[serde(serialize_with = "serialize_image")]
        image: Arc<DecodedImage>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        frame: Bounds,
        color: Color,
        font: FontSpec,
        font_size: f64,
        lines: Vec<PlacedLine>,
    },
}

/// Output of a render: everything a surface needs to produce pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayList {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<DrawOp>,
}

impl DisplayList {
    /// SHA-256 over canonical JSON; equal digests mean equal paint.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        canonical_digest(self)
    }
}

/// Anything that can turn a display list into pixels.
pub trait Surface {
    fn paint(&mut self, list: &DisplayList) -> Result<(), RenderError>;
}

/// Keeps the last display list it was given. Useful for comparing renders.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub last: Option<DisplayList>,
    pub frames: usize,
}

impl Surface for RecordingSurface {
    fn paint(&mut self, list: &DisplayList) -> Result<(), RenderError> {
        self.last = Some(list.clone());
        self.frames += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    layout: TextLayout,
    placeholder: Color,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Renderer {
    pub fn new(layout: TextLayout, placeholder: Color) -> Self {
        Self { layout, placeholder }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(TextLayout::from_config(config), config.placeholder_color)
    }

    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    /// Paint the page: background, then visible cells by ascending layer.
    /// Reads the page only; the same state always yields the same list.
    pub fn render(&self, page: &Page) -> Result<DisplayList, RenderError> {
        #[cfg(feature = "test-hooks")]
        RENDER_CALL_COUNT.with(|c| c.set(c.get() + 1));

        if page.width == 0 || page.height == 0 {
            return Err(RenderError::InvalidCanvas { width: page.width, height: page.height });
        }
        let background = page.background.as_ref().ok_or(RenderError::MissingBackground(page.index))?;
        if page.cells.is_empty() {
            return Err(RenderError::EmptyPage(page.index));
        }

        let mut ops = vec![];
        self.paint_background(page, background, &mut ops);

        for cell in page.layered_cells().into_iter().filter(|c| c.visible) {
            match &cell.content {
                CellContent::Fill { color } => ops.push(DrawOp::FillRect {
                    frame: cell.bounds,
                    rect: cell.bounds.local_rect(),
                    color: *color,
                }),
                CellContent::Media(media) => self.paint_media(cell.bounds, media, &mut ops),
                CellContent::Text(run) => {
                    let laid = self.layout.layout(&run.text, &run.font, run.font_size, cell.bounds.width);
                    let lines = laid
                        .lines
                        .into_iter()
                        .enumerate()
                        .map(|(i, line)| {
                            let x = match run.align {
                                TextAlign::Left => 0.0,
                                TextAlign::Center => (cell.bounds.width - line.width) / 2.0,
                                TextAlign::Right => cell.bounds.width - line.width,
                            };
                            let y = i as f64 * laid.line_height;
                            PlacedLine {
                                text: line.text,
                                x,
                                y,
                                baseline: y + run.font_size * ASCENT,
                                glyphs: line.glyphs,
                            }
                        })
                        .collect();
                    ops.push(DrawOp::Text {
                        frame: cell.bounds,
                        color: run.color,
                        font: run.font.clone(),
                        font_size: run.font_size,
                        lines,
                    });
                }
            }
        }

        Ok(DisplayList { width: page.width, height: page.height, ops })
    }

    /// Render and hand the result to `surface`.
    pub fn render_to(&self, page: &Page, surface: &mut dyn Surface) -> Result<DisplayList, RenderError> {
        let list = self.render(page)?;
        surface.paint(&list)?;
        Ok(list)
    }

    fn paint_background(&self, page: &Page, background: &Background, ops: &mut Vec<DrawOp>) {
        match background {
            Background::Color { color } => ops.push(DrawOp::Clear {
                width: page.width,
                height: page.height,
                color: *color,
            }),
            Background::Media(media) => {
                ops.push(DrawOp::Clear { width: page.width, height: page.height, color: self.placeholder });
                if media.image.is_some() {
                    let canvas = Bounds::new(0.0, 0.0, page.width as f64, page.height as f64);
                    self.paint_media(canvas, media, ops);
                }
            }
        }
    }

    fn paint_media(&self, frame: Bounds, media: &MediaContent, ops: &mut Vec<DrawOp>) {
        match &media.image {
            Some(image) => {
                let placement = media
                    .placement
                    .unwrap_or_else(|| fit_image(image.width(), image.height(), frame.width, frame.height, media.fit));
                ops.push(DrawOp::Image {
                    frame,
                    source: placement.source,
                    dest: placement.dest,
                    image: Arc::clone(image),
                });
            }
            None => ops.push(DrawOp::FillRect { frame, rect: frame.local_rect(), color: self.placeholder }),
        }
    }
}
