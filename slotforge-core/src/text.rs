//! Text Layout - Measurement and Greedy Wrapping
//!
//! Auto-fit and painting both go through `TextLayout::layout`, so the size
//! the enforcer picks is exactly the size the renderer lays out.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::model::FontSpec;

const FIT_EPSILON: f64 = 1e-9;

/// Per-glyph horizontal advances. Implement this over a real font stack
/// when exact metrics matter; `AdvanceTable` is the built-in fallback.
pub trait TextMetrics: Send + Sync {
    /// Advance of `ch` in em units (multiply by font size for pixels).
    fn advance_em(&self, ch: char, font: &FontSpec) -> f64;
}

/// Deterministic width classes approximating a proportional sans-serif.
/// Families containing "mono" get a fixed 0.6em advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvanceTable;

impl TextMetrics for AdvanceTable {
    fn advance_em(&self, ch: char, font: &FontSpec) -> f64 {
        if font.family.to_ascii_lowercase().contains("mono") {
            return 0.6;
        }
        let base = match ch {
            'i' | 'j' | 'l' | 'I' | '!' | '|' | '.' | ',' | ':' | ';' | '\'' => 0.28,
            'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.36,
            'm' | 'w' | 'M' | 'W' | '@' => 0.86,
            c if c.is_whitespace() => 0.28,
            c if c.is_ascii_digit() => 0.56,
            c if c as u32 >= 0x2E80 => 1.0,
            c if c.is_uppercase() => 0.68,
            _ => 0.54,
        };
        if font.weight >= 600 {
            base * 1.06
        } else {
            base
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Glyph {
    pub ch: char,
    /// Offset from the start of the line, px.
    pub x: f64,
    pub advance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaidOutLine {
    pub text: String,
    pub width: f64,
    pub glyphs: Vec<Glyph>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaidOutText {
    pub lines: Vec<LaidOutLine>,
    pub line_height: f64,
    pub width: f64,
    pub height: f64,
}

impl LaidOutText {
    pub fn fits_within(&self, width: f64, height: f64) -> bool {
        self.width <= width + FIT_EPSILON && self.height <= height + FIT_EPSILON
    }
}

#[derive(Clone)]
pub struct TextLayout {
    metrics: Arc<dyn TextMetrics>,
    line_height: f64,
}

impl fmt::Debug for TextLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextLayout").field("line_height", &self.line_height).finish()
    }
}

impl Default for TextLayout {
    fn default() -> Self {
        Self::new(Arc::new(AdvanceTable), 1.2)
    }
}

impl TextLayout {
    pub fn new(metrics: Arc<dyn TextMetrics>, line_height: f64) -> Self {
        Self { metrics, line_height }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Arc::new(AdvanceTable), config.line_height)
    }

    pub fn with_metrics(&self, metrics: Arc<dyn TextMetrics>) -> Self {
        Self { metrics, line_height: self.line_height }
    }

    fn word_width(&self, word: &str, font: &FontSpec, size: f64) -> f64 {
        word.chars().map(|c| self.metrics.advance_em(c, font) * size).sum()
    }

    /// Greedy whitespace wrap at `max_width`. Explicit newlines always break.
    /// A single word wider than `max_width` gets a line of its own and
    /// overflows horizontally.
    pub fn layout(&self, text: &str, font: &FontSpec, size: f64, max_width: f64) -> LaidOutText {
        let space = self.metrics.advance_em(' ', font) * size;
        let mut raw_lines: Vec<String> = vec![];

        for paragraph in text.split('\n') {
            let mut current = String::new();
            let mut current_width = 0.0;
            for word in paragraph.split_whitespace() {
                let w = self.word_width(word, font, size);
                if current.is_empty() {
                    current.push_str(word);
                    current_width = w;
                } else if current_width + space + w <= max_width + FIT_EPSILON {
                    current.push(' ');
                    current.push_str(word);
                    current_width += space + w;
                } else {
                    raw_lines.push(std::mem::take(&mut current));
                    current.push_str(word);
                    current_width = w;
                }
            }
            raw_lines.push(current);
        }

        let lines: Vec<LaidOutLine> = raw_lines
            .into_iter()
            .map(|text| {
                let mut x = 0.0;
                let glyphs = text
                    .chars()
                    .map(|ch| {
                        let advance = self.metrics.advance_em(ch, font) * size;
                        let glyph = Glyph { ch, x, advance };
                        x += advance;
                        glyph
                    })
                    .collect();
                LaidOutLine { text, width: x, glyphs }
            })
            .collect();

        let line_height = size * self.line_height;
        let width = lines.iter().map(|l| l.width).fold(0.0, f64::max);
        let height = lines.len() as f64 * line_height;
        LaidOutText { lines, line_height, width, height }
    }

    pub fn fits(&self, text: &str, font: &FontSpec, size: f64, width: f64, height: f64) -> bool {
        self.layout(text, font, size, width).fits_within(width, height)
    }
}
