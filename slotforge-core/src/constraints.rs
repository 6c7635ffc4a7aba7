//! Constraint Enforcer - Designer Limits Applied to End-User Values
//!
//! Pure functions. A candidate value either comes back in a form the renderer
//! can paint without exceeding the slot's constraints, or it is rejected.
//! Nothing here touches the page.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::DecodedImage;
use crate::config::AutofitConfig;
use crate::model::{Bounds, ContentKind, FitMode, FontSpec, ImagePlacement, Rect};
use crate::slots::{SlotType, ValidationError};
use crate::text::TextLayout;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConstraints {
    pub max_characters: u32,
    pub min_font_size: f64,
    pub max_font_size: f64,
}

impl TextConstraints {
    pub fn new(max_characters: u32, min_font_size: f64, max_font_size: f64) -> Self {
        Self { max_characters, min_font_size, max_font_size }
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        if self.max_characters == 0 {
            return Err(ValidationError::InvalidConstraint("maxCharacters must be at least 1".into()));
        }
        if !(self.min_font_size.is_finite() && self.max_font_size.is_finite()) {
            return Err(ValidationError::InvalidConstraint("font sizes must be finite".into()));
        }
        if self.min_font_size <= 0.0 {
            return Err(ValidationError::InvalidConstraint("minFontSize must be positive".into()));
        }
        if self.min_font_size > self.max_font_size {
            return Err(ValidationError::InvalidConstraint(format!(
                "minFontSize {} exceeds maxFontSize {}",
                self.min_font_size, self.max_font_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConstraints {
    pub fit_mode: FitMode,
    #[serde(default)]
    pub aspect_lock: bool,
}

impl ImageConstraints {
    pub fn new(fit_mode: FitMode, aspect_lock: bool) -> Self {
        Self { fit_mode, aspect_lock }
    }

    /// Aspect lock always wins over the requested mode.
    pub fn effective_fit(&self) -> FitMode {
        if self.aspect_lock {
            FitMode::Contain
        } else {
            self.fit_mode
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotConstraints {
    Text(TextConstraints),
    Image(ImageConstraints),
}

impl SlotConstraints {
    pub fn slot_type(&self) -> SlotType {
        match self {
            SlotConstraints::Text(_) => SlotType::Text,
            SlotConstraints::Image(_) => SlotType::Image,
        }
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        match self {
            SlotConstraints::Text(c) => c.check(),
            SlotConstraints::Image(_) => Ok(()),
        }
    }
}

/// Why a candidate value was not applied. Per slot, never fatal to a page.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum ContentRejection {
    #[error("Text too long: {actual} characters, limit is {max}")]
    TextTooLong { max: u32, actual: usize },

    #[error("Media failed to load from {url}: {reason}")]
    MediaLoadFailed { url: String, reason: String },

    #[error("Slot expects {expected:?} content but the cell holds {found:?}")]
    KindMismatch { expected: SlotType, found: ContentKind },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FittedText {
    pub text: String,
    pub font_size: f64,
    pub line_count: usize,
    /// True when even the minimum size overflows the bounds.
    pub overflow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RenderableValue {
    Text(FittedText),
    Image(ImagePlacement),
}

pub enum Candidate<'a> {
    Text { value: &'a str, font: &'a FontSpec },
    Image(&'a DecodedImage),
}

/// Largest size in `[min, max]` at which `text` fits `width`×`height`.
/// Returns `(min, true)` when nothing in range fits.
pub fn autofit_font_size(
    layout: &TextLayout,
    autofit: &AutofitConfig,
    text: &str,
    font: &FontSpec,
    constraints: &TextConstraints,
    width: f64,
    height: f64,
) -> (f64, bool) {
    let fits = |size: f64| layout.fits(text, font, size, width, height);

    if fits(constraints.max_font_size) {
        return (constraints.max_font_size, false);
    }
    if !fits(constraints.min_font_size) {
        return (constraints.min_font_size, true);
    }

    // Invariant: fits(lo) && !fits(hi)
    let mut lo = constraints.min_font_size;
    let mut hi = constraints.max_font_size;
    let mut iterations = 0;
    while hi - lo >= autofit.tolerance && iterations < autofit.max_iterations {
        let mid = (lo + hi) / 2.0;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }
    (lo, false)
}

pub fn enforce_text(
    layout: &TextLayout,
    autofit: &AutofitConfig,
    constraints: &TextConstraints,
    raw: &str,
    font: &FontSpec,
    bounds: &Bounds,
) -> Result<FittedText, ContentRejection> {
    let actual = raw.chars().count();
    if actual > constraints.max_characters as usize {
        return Err(ContentRejection::TextTooLong { max: constraints.max_characters, actual });
    }

    let (font_size, overflow) =
        autofit_font_size(layout, autofit, raw, font, constraints, bounds.width, bounds.height);
    if overflow {
        warn!(
            "text overflows {}x{} even at {}px; rendering overflowed",
            bounds.width, bounds.height, font_size
        );
    }
    let line_count = layout.layout(raw, font, font_size, bounds.width).lines.len();
    Ok(FittedText { text: raw.to_string(), font_size, line_count, overflow })
}

/// Map an image of `image_w`×`image_h` onto a `width`×`height` box.
pub fn fit_image(image_w: u32, image_h: u32, width: f64, height: f64, mode: FitMode) -> ImagePlacement {
    let (sw, sh) = (image_w as f64, image_h as f64);
    let full_source = Rect::new(0.0, 0.0, sw, sh);
    let full_dest = Rect::new(0.0, 0.0, width, height);

    if full_dest.is_empty() || full_source.is_empty() {
        return ImagePlacement { fit_mode: mode, source: full_source, dest: Rect::new(0.0, 0.0, 0.0, 0.0) };
    }

    match mode {
        FitMode::Fill => ImagePlacement { fit_mode: mode, source: full_source, dest: full_dest },
        FitMode::Contain => {
            let scale = (width / sw).min(height / sh);
            let (dw, dh) = (sw * scale, sh * scale);
            ImagePlacement {
                fit_mode: mode,
                source: full_source,
                dest: Rect::new((width - dw) / 2.0, (height - dh) / 2.0, dw, dh),
            }
        }
        FitMode::Cover => {
            let scale = (width / sw).max(height / sh);
            let (vw, vh) = (width / scale, height / scale);
            ImagePlacement {
                fit_mode: mode,
                source: Rect::new((sw - vw) / 2.0, (sh - vh) / 2.0, vw, vh),
                dest: full_dest,
            }
        }
    }
}

pub fn enforce_image(constraints: &ImageConstraints, image: &DecodedImage, bounds: &Bounds) -> ImagePlacement {
    fit_image(image.width(), image.height(), bounds.width, bounds.height, constraints.effective_fit())
}

/// Stateless front door over the text and image rules.
pub struct ConstraintEnforcer<'a> {
    layout: &'a TextLayout,
    autofit: AutofitConfig,
}

impl<'a> ConstraintEnforcer<'a> {
    pub fn new(layout: &'a TextLayout, autofit: AutofitConfig) -> Self {
        Self { layout, autofit }
    }

    pub fn enforce(
        &self,
        constraints: &SlotConstraints,
        bounds: &Bounds,
        candidate: Candidate<'_>,
    ) -> Result<RenderableValue, ContentRejection> {
        match (constraints, candidate) {
            (SlotConstraints::Text(c), Candidate::Text { value, font }) => {
                enforce_text(self.layout, &self.autofit, c, value, font, bounds).map(RenderableValue::Text)
            }
            (SlotConstraints::Image(c), Candidate::Image(image)) => {
                Ok(RenderableValue::Image(enforce_image(c, image, bounds)))
            }
            (SlotConstraints::Text(_), Candidate::Image(_)) => Err(ContentRejection::KindMismatch {
                expected: SlotType::Text,
                found: ContentKind::Media,
            }),
            (SlotConstraints::Image(_), Candidate::Text { .. }) => Err(ContentRejection::KindMismatch {
                expected: SlotType::Image,
                found: ContentKind::Text,
            }),
        }
    }
}
