//! End-User Content Binder
//!
//! Substitutes user values into the cells their slots reference. Only cell
//! content changes; bounds are never touched. Every per-slot problem is
//! reported and skipped so sibling slots still apply.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::assets::{DecodedImage, MediaCache};
use crate::config::AutofitConfig;
use crate::constraints::{Candidate, ConstraintEnforcer, ContentRejection, RenderableValue, SlotConstraints};
use crate::model::{CellContent, ContentId, ContentKind, MediaContent, Page, Resolution};
use crate::render::{DisplayList, RenderError, Renderer};
use crate::slots::{ContentSlot, ContentSlotSet, SlotId, SlotType};

/// Values supplied by the end user, keyed by slot id or field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserContentMap(BTreeMap<String, String>);

impl UserContentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Slot id wins over field name when both are present.
    pub fn value_for(&self, slot: &ContentSlot) -> Option<&str> {
        self.0
            .get(slot.slot_id.as_str())
            .or_else(|| self.0.get(&slot.field_name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An image value waiting on the asset loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
    pub slot_id: SlotId,
    pub content_id: ContentId,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotIssue {
    #[serde(rename_all = "camelCase")]
    Orphaned { slot_id: SlotId, field_name: String, source_content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    Rejected { slot_id: SlotId, field_name: String, rejection: ContentRejection },
    /// Stored constraints failed validation on load; the slot is skipped.
    #[serde(rename_all = "camelCase")]
    InvalidConstraints { slot_id: SlotId, field_name: String, reason: String },
}

impl SlotIssue {
    pub fn slot_id(&self) -> &SlotId {
        match self {
            SlotIssue::Orphaned { slot_id, .. }
            | SlotIssue::Rejected { slot_id, .. }
            | SlotIssue::InvalidConstraints { slot_id, .. } => slot_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindReport {
    pub applied: Vec<SlotId>,
    /// No value supplied; the designer's content stands.
    pub defaulted: Vec<SlotId>,
    /// Applied, but the text overflows even at the minimum font size.
    pub overflowed: Vec<SlotId>,
    pub pending_media: Vec<MediaRequest>,
    pub issues: Vec<SlotIssue>,
}

/// End-user side notifications, for inline form errors.
pub trait BindObserver {
    fn slot_issue(&self, issue: &SlotIssue);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundFrame {
    pub report: BindReport,
    pub display: DisplayList,
}

pub struct ContentBinder<'a> {
    renderer: &'a Renderer,
    autofit: AutofitConfig,
}

impl<'a> ContentBinder<'a> {
    pub fn new(renderer: &'a Renderer, autofit: AutofitConfig) -> Self {
        Self { renderer, autofit }
    }

    /// Apply `content` to `page`, then render exactly once.
    pub fn bind(
        &self,
        page: &mut Page,
        slots: &ContentSlotSet,
        content: &UserContentMap,
        media: &MediaCache,
    ) -> Result<BoundFrame, RenderError> {
        let report = self.apply_content(page, slots, content, media);
        let display = self.renderer.render(page)?;
        Ok(BoundFrame { report, display })
    }

    /// Substitute values into cells. Images not yet in `media` are returned
    /// as pending requests and their cells keep the designer's content.
    pub fn apply_content(
        &self,
        page: &mut Page,
        slots: &ContentSlotSet,
        content: &UserContentMap,
        media: &MediaCache,
    ) -> BindReport {
        let mut report = BindReport::default();

        for slot in slots.iter() {
            let Some(value) = content.value_for(slot) else {
                report.defaulted.push(slot.slot_id.clone());
                continue;
            };

            if let Some(reason) = slots.invalid_reason(&slot.slot_id) {
                warn!("skipping slot {} with invalid constraints: {}", slot.field_name, reason);
                report.issues.push(SlotIssue::InvalidConstraints {
                    slot_id: slot.slot_id.clone(),
                    field_name: slot.field_name.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            if let Err(issue) = resolve_unique(page, slot) {
                warn!("skipping orphaned slot {} ({})", slot.slot_id, slot.field_name);
                report.issues.push(issue);
                continue;
            }

            let outcome = match &slot.constraints {
                SlotConstraints::Text(_) => self.substitute(page, slot, value, None),
                SlotConstraints::Image(_) => match media.get(value) {
                    Some(image) => self.substitute(page, slot, value, Some(image)),
                    None => match page.cell(slot.source_content_id).map(|c| &c.content) {
                        Some(CellContent::Media(_)) => {
                            report.pending_media.push(MediaRequest {
                                slot_id: slot.slot_id.clone(),
                                content_id: slot.source_content_id,
                                source: value.to_string(),
                            });
                            Ok(Applied::Pending)
                        }
                        found => Err(kind_mismatch(slot, found)),
                    },
                },
            };

            match outcome {
                Ok(Applied::Done) => {
                    debug!("applied {} to {}", slot.field_name, slot.source_content_id);
                    report.applied.push(slot.slot_id.clone());
                }
                Ok(Applied::Overflowed) => {
                    report.applied.push(slot.slot_id.clone());
                    report.overflowed.push(slot.slot_id.clone());
                }
                Ok(Applied::Pending) => {}
                Err(rejection) => {
                    warn!("rejected value for {}: {}", slot.field_name, rejection);
                    report.issues.push(SlotIssue::Rejected {
                        slot_id: slot.slot_id.clone(),
                        field_name: slot.field_name.clone(),
                        rejection,
                    });
                }
            }
        }
        report
    }

    /// Run `value` (or the decoded `image`) through the slot's constraints
    /// and write the result into its cell.
    fn substitute(
        &self,
        page: &mut Page,
        slot: &ContentSlot,
        value: &str,
        image: Option<Arc<DecodedImage>>,
    ) -> Result<Applied, ContentRejection> {
        let renderable = {
            let cell = page.cell(slot.source_content_id).map(|c| &c.content);
            let candidate = match (cell, image.as_deref()) {
                (Some(CellContent::Text(run)), _) => Candidate::Text { value, font: &run.font },
                (Some(CellContent::Media(_)), Some(image)) => Candidate::Image(image),
                (found, _) => return Err(kind_mismatch(slot, found)),
            };
            ConstraintEnforcer::new(self.renderer.layout(), self.autofit).enforce(
                &slot.constraints,
                &slot.bounds,
                candidate,
            )?
        };

        let Some(cell) = page.cell_mut(slot.source_content_id) else {
            return Ok(Applied::Done);
        };
        match (renderable, &mut cell.content) {
            (RenderableValue::Text(fitted), CellContent::Text(run)) => {
                run.text = fitted.text;
                run.font_size = fitted.font_size;
                run.overflow = fitted.overflow;
                Ok(if fitted.overflow { Applied::Overflowed } else { Applied::Done })
            }
            (RenderableValue::Image(placement), content) => {
                *content = CellContent::Media(MediaContent {
                    source: value.to_string(),
                    fit: placement.fit_mode,
                    placement: Some(placement),
                    image,
                });
                Ok(Applied::Done)
            }
            (RenderableValue::Text(_), content) => Err(kind_mismatch(slot, Some(&*content))),
        }
    }

    /// Attach an asynchronously loaded image for `request`. Returns the
    /// issue if the slot or its cell no longer accepts it.
    pub fn attach_media(
        &self,
        page: &mut Page,
        slots: &ContentSlotSet,
        request: &MediaRequest,
        image: Arc<DecodedImage>,
    ) -> Result<(), SlotIssue> {
        let Some(slot) = slots.get(&request.slot_id) else {
            // Slot removed while the load was in flight; nothing to do.
            return Ok(());
        };
        resolve_unique(page, slot)?;
        if slot.slot_type != SlotType::Image {
            return Ok(());
        }
        self.substitute(page, slot, &request.source, Some(image))
            .map(|_| ())
            .map_err(|rejection| SlotIssue::Rejected {
                slot_id: slot.slot_id.clone(),
                field_name: slot.field_name.clone(),
                rejection,
            })
    }
}

enum Applied {
    Done,
    Overflowed,
    Pending,
}

fn resolve_unique(page: &Page, slot: &ContentSlot) -> Result<(), SlotIssue> {
    match page.resolve(slot.source_content_id) {
        Resolution::Unique(_) => Ok(()),
        Resolution::Missing | Resolution::Ambiguous(_) => Err(SlotIssue::Orphaned {
            slot_id: slot.slot_id.clone(),
            field_name: slot.field_name.clone(),
            source_content_id: slot.source_content_id,
        }),
    }
}

fn kind_mismatch(slot: &ContentSlot, found: Option<&CellContent>) -> ContentRejection {
    ContentRejection::KindMismatch {
        expected: slot.slot_type,
        found: found.map_or(ContentKind::Fill, CellContent::kind),
    }
}
