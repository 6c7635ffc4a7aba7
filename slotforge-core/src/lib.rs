//! SlotForge Core - Content-Slot Templating Engine
//!
//! # The Five Laws (Non-Negotiable)
//! 1. One Renderer: designer, end user and export all paint through `Renderer::render`
//! 2. Slots Are Contracts: a slot binds one cell, and its bounds never move
//! 3. Constraints Are Enforced Before Paint
//! 4. Orphans Are Reported, Never Fatal
//! 5. Deterministic Output: same page state, same pixels

pub mod model;
pub mod text;
pub mod assets;
pub mod constraints;
pub mod slots;
pub mod render;
pub mod raster;
pub mod binder;
pub mod session;
pub mod export;
pub mod preset;
pub mod hashing;
pub mod config;

pub use model::{Background, Bounds, Cell, CellContent, Color, ContentId, FitMode, FontSpec, MediaContent, Page, TextRun};
pub use constraints::{ConstraintEnforcer, ContentRejection, ImageConstraints, SlotConstraints, TextConstraints};
pub use slots::{ContentSlot, ContentSlotSet, SlotDraft, SlotId, SlotManager, SlotType, ValidationError};
pub use render::{DisplayList, RenderError, Renderer, Surface};
pub use raster::PixmapSurface;
pub use binder::{BindReport, ContentBinder, SlotIssue, UserContentMap};
pub use session::{Debouncer, EditSession};
pub use export::{ExportDriver, ExportError, ExportKind, ExportManifest, ExportScope, ExportedFile};
pub use preset::{LoadError, Preset, PresetLibrary};
pub use hashing::{canonical_json, compute_job_hash, sha256_hex};
pub use config::EngineConfig;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
