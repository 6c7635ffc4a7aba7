//! Page Model - Cells, Backgrounds, Geometry
//!
//! Records only. A cell's bounds are its geometry contract; content is the
//! only thing end-user binding is allowed to touch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::assets::DecodedImage;

/// Stable identifier of a cell's content, assigned once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Geometric bounds of a cell in canvas pixels. Rotation is in degrees,
/// clockwise, about the centre of the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height, rotation: 0.0 }
    }

    pub fn rotated(self, degrees: f64) -> Self {
        Self { rotation: degrees, ..self }
    }

    /// The box in its own unrotated frame, origin at the top-left corner.
    pub fn local_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// RGBA colour, serialized as `#rrggbbaa` (or `#rrggbb` on input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value).ok_or_else(|| format!("invalid colour '{}'", value))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default)]
    pub italic: bool,
}

fn default_weight() -> u16 { 400 }
fn default_true() -> bool { true }
fn is_false(v: &bool) -> bool { !*v }

impl FontSpec {
    pub fn new(family: impl Into<String>, weight: u16) -> Self {
        Self { family: family.into(), weight, italic: false }
    }
}

impl Default for FontSpec {
    fn default() -> Self {
        Self::new("sans-serif", default_weight())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub font: FontSpec,
    pub font_size: f64,
    #[serde(default = "default_text_color")]
    pub color: Color,
    #[serde(default)]
    pub align: TextAlign,
    /// Set when auto-fit could not make the text fit even at the minimum size.
    #[serde(default, skip_serializing_if = "is_false")]
    pub overflow: bool,
}

fn default_text_color() -> Color { Color::BLACK }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Cover,
    Contain,
    Fill,
}

/// Source rectangle (image pixels) mapped onto a destination rectangle
/// (cell-local pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlacement {
    pub fit_mode: FitMode,
    pub source: Rect,
    pub dest: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub source: String,
    #[serde(default)]
    pub fit: FitMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<ImagePlacement>,
    /// Decoded pixels. Runtime only; re-hydrated after load.
    #[serde(skip)]
    pub image: Option<Arc<DecodedImage>>,
}

impl MediaContent {
    pub fn new(source: impl Into<String>, fit: FitMode) -> Self {
        Self { source: source.into(), fit, placement: None, image: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Media,
    Fill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CellContent {
    Text(TextRun),
    Media(MediaContent),
    Fill { color: Color },
}

impl CellContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            CellContent::Text(_) => ContentKind::Text,
            CellContent::Media(_) => ContentKind::Media,
            CellContent::Fill { .. } => ContentKind::Fill,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub content_id: ContentId,
    #[serde(default)]
    pub layer: i32,
    pub bounds: Bounds,
    /// Hidden cells (designer guides, for instance) are skipped by the renderer.
    #[serde(default = "default_true")]
    pub visible: bool,
    pub content: CellContent,
}

impl Cell {
    pub fn text_run(&self) -> Option<&TextRun> {
        match &self.content {
            CellContent::Text(run) => Some(run),
            _ => None,
        }
    }

    pub fn media(&self) -> Option<&MediaContent> {
        match &self.content {
            CellContent::Media(media) => Some(media),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Background {
    Color { color: Color },
    Media(MediaContent),
}

/// How a content id resolves against the page's cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    Unique(&'a Cell),
    Missing,
    Ambiguous(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Option<Background>,
    #[serde(default)]
    pub cells: Vec<Cell>,
    /// Next id to hand out. Persisted so deleted ids are never reissued.
    #[serde(default)]
    pub next_content_id: u64,
}

impl Page {
    pub fn new(index: u32, width: u32, height: u32, background: Background) -> Self {
        Self {
            index,
            width,
            height,
            background: Some(background),
            cells: vec![],
            next_content_id: 1,
        }
    }

    /// Append a cell and return its freshly allocated content id.
    pub fn add_cell(&mut self, bounds: Bounds, content: CellContent, layer: i32) -> ContentId {
        let max_existing = self.cells.iter().map(|c| c.content_id.0).max().unwrap_or(0);
        let id = ContentId(self.next_content_id.max(max_existing + 1));
        self.next_content_id = id.0 + 1;
        self.cells.push(Cell { content_id: id, layer, bounds, visible: true, content });
        id
    }

    pub fn remove_cell(&mut self, id: ContentId) -> Option<Cell> {
        let pos = self.cells.iter().position(|c| c.content_id == id)?;
        Some(self.cells.remove(pos))
    }

    pub fn cell(&self, id: ContentId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.content_id == id)
    }

    pub fn cell_mut(&mut self, id: ContentId) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.content_id == id)
    }

    pub fn resolve(&self, id: ContentId) -> Resolution<'_> {
        let mut matches = self.cells.iter().filter(|c| c.content_id == id);
        match (matches.next(), matches.count()) {
            (None, _) => Resolution::Missing,
            (Some(cell), 0) => Resolution::Unique(cell),
            (Some(_), rest) => Resolution::Ambiguous(rest + 1),
        }
    }

    pub fn set_visible(&mut self, id: ContentId, visible: bool) -> bool {
        match self.cell_mut(id) {
            Some(cell) => {
                cell.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Cells in paint order: ascending layer, ties keep document order.
    pub fn layered_cells(&self) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.iter().collect();
        cells.sort_by_key(|c| c.layer);
        cells
    }

    /// Every media reference on the page, background first.
    pub fn media_sources(&self) -> Vec<String> {
        let mut sources = vec![];
        if let Some(Background::Media(media)) = &self.background {
            sources.push(media.source.clone());
        }
        for cell in &self.cells {
            if let CellContent::Media(media) = &cell.content {
                sources.push(media.source.clone());
            }
        }
        sources
    }
}
