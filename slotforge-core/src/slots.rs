//! Content Slots - Designer-Authored Bindings
//!
//! A slot binds one cell to one end-user field. Its bounds are captured from
//! the cell when the slot is defined and never recomputed afterwards.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::constraints::SlotConstraints;
use crate::model::{Bounds, Cell, CellContent, ContentId, ContentKind, Page, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Text,
    Image,
}

impl SlotType {
    fn accepts(&self, kind: ContentKind) -> bool {
        matches!(
            (self, kind),
            (SlotType::Text, ContentKind::Text) | (SlotType::Image, ContentKind::Media)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate field name: {0}")]
    DuplicateFieldName(String),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Label '{0}' does not yield a field name")]
    EmptyFieldName(String),

    #[error("Slot type {declared:?} does not match {constraints:?} constraints")]
    TypeMismatch { declared: SlotType, constraints: SlotType },

    #[error("{slot_type:?} slot cannot bind a {found:?} cell")]
    CellKindMismatch { slot_type: SlotType, found: ContentKind },

    #[error("{0} is already bound to a slot")]
    CellAlreadyBound(ContentId),

    #[error("{0} is locked by a content slot")]
    CellLocked(ContentId),

    #[error("{0} not found on page")]
    CellNotFound(ContentId),
}

/// Machine key for a label: lower camel case, non-alphanumerics stripped.
/// Existing camel-case boundaries are kept, so a derived name maps to itself.
///
/// `"Call-to-Action Button!"` becomes `callToActionButton`.
pub fn derive_field_name(label: &str) -> String {
    let mut tokens: Vec<String> = vec![];
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in label.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let boundary = c.is_uppercase() && prev.map_or(false, |p| p.is_lowercase() || p.is_numeric());
        if boundary && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    let mut name = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let lower = token.to_lowercase();
        if i == 0 {
            name.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSlot {
    pub slot_id: SlotId,
    pub source_content_id: ContentId,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    pub field_name: String,
    pub field_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_description: Option<String>,
    pub constraints: SlotConstraints,
    /// Snapshot of the cell's bounds at definition time.
    pub bounds: Bounds,
}

/// Input to `SlotManager::define_slot`.
#[derive(Debug, Clone)]
pub struct SlotDraft {
    pub field_label: String,
    pub field_description: Option<String>,
    pub slot_type: SlotType,
    pub constraints: SlotConstraints,
}

impl SlotDraft {
    pub fn new(field_label: impl Into<String>, slot_type: SlotType, constraints: SlotConstraints) -> Self {
        Self {
            field_label: field_label.into(),
            field_description: None,
            slot_type,
            constraints,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.field_description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStateChange {
    pub content_id: ContentId,
    pub slot_id: SlotId,
    pub locked: bool,
}

/// The one hook the UI layer gets into slot definition.
pub trait SlotObserver {
    fn lock_state_changed(&self, change: &LockStateChange);
}

/// All slots of one page, plus which of them are currently orphaned and
/// which were loaded with constraints that fail validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSlotSet {
    slots: Vec<ContentSlot>,
    orphaned: BTreeSet<SlotId>,
    invalid: BTreeMap<SlotId, String>,
}

impl ContentSlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot_id: &SlotId) -> Option<&ContentSlot> {
        self.slots.iter().find(|s| &s.slot_id == slot_id)
    }

    pub fn find_by_source_content_id(&self, content_id: ContentId) -> Option<&ContentSlot> {
        self.slots.iter().find(|s| s.source_content_id == content_id)
    }

    pub fn find_by_field_name(&self, field_name: &str) -> Option<&ContentSlot> {
        self.slots.iter().find(|s| s.field_name == field_name)
    }

    pub fn is_orphaned(&self, slot_id: &SlotId) -> bool {
        self.orphaned.contains(slot_id)
    }

    pub fn orphaned(&self) -> impl Iterator<Item = &SlotId> {
        self.orphaned.iter()
    }

    /// Why a stored slot was quarantined, if it was.
    pub fn invalid_reason(&self, slot_id: &SlotId) -> Option<&str> {
        self.invalid.get(slot_id).map(String::as_str)
    }

    pub fn is_invalid(&self, slot_id: &SlotId) -> bool {
        self.invalid.contains_key(slot_id)
    }

    pub fn as_slice(&self) -> &[ContentSlot] {
        &self.slots
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum LoadIssue {
    #[serde(rename_all = "camelCase")]
    OrphanedSlot { slot_id: SlotId, source_content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    AmbiguousSource { slot_id: SlotId, source_content_id: ContentId, matches: usize },
    #[serde(rename_all = "camelCase")]
    DuplicateFieldName { slot_id: SlotId, field_name: String },
    #[serde(rename_all = "camelCase")]
    InvalidConstraints { slot_id: SlotId, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn orphaned(&self) -> Vec<&SlotId> {
        self.issues
            .iter()
            .filter_map(|i| match i {
                LoadIssue::OrphanedSlot { slot_id, .. } | LoadIssue::AmbiguousSource { slot_id, .. } => Some(slot_id),
                LoadIssue::DuplicateFieldName { .. } | LoadIssue::InvalidConstraints { .. } => None,
            })
            .collect()
    }
}

/// Persisted form of a page: the page record with its slots alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    #[serde(flatten)]
    pub page: Page,
    #[serde(default)]
    pub content_slots: Vec<ContentSlot>,
}

/// Form field descriptor handed to UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub slot_id: SlotId,
    pub field_name: String,
    pub field_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_description: Option<String>,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    pub constraints: SlotConstraints,
    /// The designer's content, shown until the end user replaces it.
    pub default_value: Option<String>,
}

pub struct LoadedPage {
    pub page: Page,
    pub slots: SlotManager,
    pub report: LoadReport,
}

/// Owns a page's `ContentSlotSet` and notifies observers of lock changes.
#[derive(Default)]
pub struct SlotManager {
    set: ContentSlotSet,
    observers: Vec<Box<dyn SlotObserver>>,
}

impl fmt::Debug for SlotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotManager")
            .field("set", &self.set)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn SlotObserver>) {
        self.observers.push(observer);
    }

    pub fn slots(&self) -> &ContentSlotSet {
        &self.set
    }

    fn notify(&self, change: LockStateChange) {
        for observer in &self.observers {
            observer.lock_state_changed(&change);
        }
    }

    /// Bind `cell` to a new end-user field. The cell's current bounds become
    /// the slot's fixed bounds.
    pub fn define_slot(&mut self, cell: &Cell, draft: SlotDraft) -> Result<ContentSlot, ValidationError> {
        check_constraints(draft.slot_type, &draft.constraints)?;

        let declared = draft.slot_type;
        if !declared.accepts(cell.content.kind()) {
            return Err(ValidationError::CellKindMismatch { slot_type: declared, found: cell.content.kind() });
        }
        if self.set.find_by_source_content_id(cell.content_id).is_some() {
            return Err(ValidationError::CellAlreadyBound(cell.content_id));
        }

        let field_name = derive_field_name(&draft.field_label);
        if field_name.is_empty() {
            return Err(ValidationError::EmptyFieldName(draft.field_label));
        }
        if self.set.find_by_field_name(&field_name).is_some() {
            return Err(ValidationError::DuplicateFieldName(field_name));
        }

        let slot = ContentSlot {
            slot_id: SlotId::generate(),
            source_content_id: cell.content_id,
            slot_type: declared,
            field_name,
            field_label: draft.field_label,
            field_description: draft.field_description,
            constraints: draft.constraints,
            bounds: cell.bounds,
        };
        info!("defined slot {} ({}) on {}", slot.slot_id, slot.field_name, cell.content_id);
        self.set.slots.push(slot.clone());
        self.notify(LockStateChange {
            content_id: slot.source_content_id,
            slot_id: slot.slot_id.clone(),
            locked: true,
        });
        Ok(slot)
    }

    /// Remove a slot. The cell it referenced is left as it is.
    pub fn remove_slot(&mut self, slot_id: &SlotId) -> Option<ContentSlot> {
        let pos = self.set.slots.iter().position(|s| &s.slot_id == slot_id)?;
        let slot = self.set.slots.remove(pos);
        self.set.orphaned.remove(slot_id);
        info!("removed slot {} ({})", slot.slot_id, slot.field_name);
        self.notify(LockStateChange {
            content_id: slot.source_content_id,
            slot_id: slot.slot_id.clone(),
            locked: false,
        });
        Some(slot)
    }

    pub fn find_by_source_content_id(&self, content_id: ContentId) -> Option<&ContentSlot> {
        self.set.find_by_source_content_id(content_id)
    }

    pub fn is_locked(&self, content_id: ContentId) -> bool {
        self.set.find_by_source_content_id(content_id).is_some()
    }

    /// Designer-side geometry edit, refused for cells a slot depends on.
    pub fn move_cell(&self, page: &mut Page, content_id: ContentId, bounds: Bounds) -> Result<(), ValidationError> {
        if self.is_locked(content_id) {
            return Err(ValidationError::CellLocked(content_id));
        }
        let cell = page.cell_mut(content_id).ok_or(ValidationError::CellNotFound(content_id))?;
        cell.bounds = bounds;
        Ok(())
    }

    /// Recompute which slots no longer resolve to exactly one cell.
    pub fn refresh_orphans(&mut self, page: &Page) -> Vec<LoadIssue> {
        let mut issues = vec![];
        self.set.orphaned.clear();
        for slot in &self.set.slots {
            match page.resolve(slot.source_content_id) {
                Resolution::Unique(_) => {}
                Resolution::Missing => {
                    warn!("slot {} ({}) is orphaned: {} is gone", slot.slot_id, slot.field_name, slot.source_content_id);
                    self.set.orphaned.insert(slot.slot_id.clone());
                    issues.push(LoadIssue::OrphanedSlot {
                        slot_id: slot.slot_id.clone(),
                        source_content_id: slot.source_content_id,
                    });
                }
                Resolution::Ambiguous(matches) => {
                    warn!("slot {} ({}) matches {} cells", slot.slot_id, slot.field_name, matches);
                    self.set.orphaned.insert(slot.slot_id.clone());
                    issues.push(LoadIssue::AmbiguousSource {
                        slot_id: slot.slot_id.clone(),
                        source_content_id: slot.source_content_id,
                        matches,
                    });
                }
            }
        }
        issues
    }

    /// Fields for the end-user form, in definition order. Orphans and
    /// quarantined slots are left out.
    pub fn form_fields(&self, page: &Page) -> Vec<FormField> {
        self.set
            .iter()
            .filter(|s| !self.set.is_orphaned(&s.slot_id) && !self.set.is_invalid(&s.slot_id))
            .map(|slot| FormField {
                slot_id: slot.slot_id.clone(),
                field_name: slot.field_name.clone(),
                field_label: slot.field_label.clone(),
                field_description: slot.field_description.clone(),
                slot_type: slot.slot_type,
                constraints: slot.constraints,
                default_value: page.cell(slot.source_content_id).and_then(|cell| match &cell.content {
                    CellContent::Text(run) => Some(run.text.clone()),
                    CellContent::Media(media) => Some(media.source.clone()),
                    CellContent::Fill { .. } => None,
                }),
            })
            .collect()
    }

    /// Orphaned slots are written out unchanged so they can be repaired later.
    pub fn serialize(&self, page: &Page) -> PageRecord {
        PageRecord { page: page.clone(), content_slots: self.set.slots.clone() }
    }

    /// Rebuild a page and its slots. Slots that no longer resolve are marked
    /// orphaned, slots whose stored constraints no longer validate are
    /// quarantined. Both are reported; the load itself does not fail.
    pub fn deserialize(record: PageRecord) -> LoadedPage {
        let PageRecord { page, content_slots } = record;
        let mut manager = SlotManager {
            set: ContentSlotSet { slots: content_slots, ..ContentSlotSet::default() },
            observers: vec![],
        };

        let mut issues = manager.refresh_orphans(&page);
        for slot in &manager.set.slots {
            if let Err(e) = check_constraints(slot.slot_type, &slot.constraints) {
                warn!("slot {} ({}) has invalid constraints: {}", slot.slot_id, slot.field_name, e);
                manager.set.invalid.insert(slot.slot_id.clone(), e.to_string());
                issues.push(LoadIssue::InvalidConstraints { slot_id: slot.slot_id.clone(), reason: e.to_string() });
            }
        }
        let mut seen = HashSet::new();
        for slot in manager.set.iter() {
            if !seen.insert(slot.field_name.as_str()) {
                warn!("duplicate field name '{}' in stored slots", slot.field_name);
                issues.push(LoadIssue::DuplicateFieldName {
                    slot_id: slot.slot_id.clone(),
                    field_name: slot.field_name.clone(),
                });
            }
        }

        LoadedPage { page, slots: manager, report: LoadReport { issues } }
    }
}

/// Constraint ranges are sane and agree with the declared slot type.
fn check_constraints(declared: SlotType, constraints: &SlotConstraints) -> Result<(), ValidationError> {
    constraints.check()?;
    if declared != constraints.slot_type() {
        return Err(ValidationError::TypeMismatch { declared, constraints: constraints.slot_type() });
    }
    Ok(())
}
