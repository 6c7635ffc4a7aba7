//! Export Driver - Sampling Painted Pages
//!
//! Exports replay the shared renderer into a pixmap; they never paint by any
//! other route. A page is borrowed read-only for the whole export through an
//! `ExportScope`, so it cannot change between frames.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{EngineConfig, ExportConfig};
use crate::hashing::{canonical_digest, compute_job_hash, sha256_hex};
use crate::model::Page;
use crate::raster::PixmapSurface;
use crate::render::{RenderError, Renderer};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Page {0} has an edit or media load in progress")]
    EditInProgress(u32),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("Sequence of {requested} frames exceeds the limit of {max}")]
    TooManyFrames { requested: u64, max: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read-only access to one page for the duration of an export.
#[derive(Debug, Clone, Copy)]
pub struct ExportScope<'a> {
    page: &'a Page,
    renderer: &'a Renderer,
}

impl<'a> ExportScope<'a> {
    pub fn new(page: &'a Page, renderer: &'a Renderer) -> Self {
        Self { page, renderer }
    }

    pub fn page(&self) -> &'a Page {
        self.page
    }

    fn paint_png(&self) -> Result<Vec<u8>, ExportError> {
        let mut surface = PixmapSurface::new();
        self.renderer.render_to(self.page, &mut surface)?;
        Ok(surface.encode_png()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub size: [u32; 2],
    pub data_base64: String,
    pub hash: String,
    /// Presentation time within a sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl ExportedFile {
    fn png(filename: String, page: &Page, data: &[u8], timestamp_ms: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            format: "png".into(),
            size: [page.width, page.height],
            data_base64: base64::engine::general_purpose::STANDARD.encode(data),
            hash: sha256_hex(data),
            timestamp_ms,
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data_base64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportKind {
    Still,
    #[serde(rename_all = "camelCase")]
    Sequence { fps: u32, duration_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub id: String,
    pub preset_id: String,
    pub page_index: u32,
    pub kind: ExportKind,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub job_hash: String,
    pub manifest_hash: String,
    pub files: Vec<ExportedFile>,
}

/// Receives exported files: an upload queue, a directory, a zip writer.
pub trait ExportSink {
    fn accept(&mut self, file: &ExportedFile, bytes: &[u8]) -> Result<(), ExportError>;
}

impl ExportSink for Vec<ExportedFile> {
    fn accept(&mut self, file: &ExportedFile, _bytes: &[u8]) -> Result<(), ExportError> {
        self.push(file.clone());
        Ok(())
    }
}

/// Writes each file under a root directory.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, written: vec![] })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn write_manifest(&mut self, manifest: &ExportManifest) -> Result<PathBuf, ExportError> {
        let path = self.root.join(format!("manifest-page-{}.json", manifest.page_index));
        fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
        self.written.push(path.clone());
        Ok(path)
    }
}

impl ExportSink for DirectorySink {
    fn accept(&mut self, file: &ExportedFile, bytes: &[u8]) -> Result<(), ExportError> {
        let path = self.root.join(&file.filename);
        fs::write(&path, bytes)?;
        self.written.push(path);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportDriver {
    config: ExportConfig,
}

impl ExportDriver {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.export)
    }

    /// `ceil(duration * fps)` frames, at least one.
    pub fn frame_count(&self, fps: u32, duration_ms: u64) -> Result<u32, ExportError> {
        if fps == 0 {
            return Err(ExportError::InvalidSequence("fps must be at least 1".into()));
        }
        if duration_ms == 0 {
            return Err(ExportError::InvalidSequence("duration must be positive".into()));
        }
        // Past u64 the request is reported as u64::MAX frames.
        let requested = duration_ms
            .checked_mul(u64::from(fps))
            .map_or(u64::MAX, |frame_ms| frame_ms.div_ceil(1000).max(1));
        if requested > self.config.max_frames as u64 {
            return Err(ExportError::TooManyFrames { requested, max: self.config.max_frames });
        }
        Ok(requested as u32)
    }

    pub fn still(&self, scope: &ExportScope<'_>) -> Result<ExportedFile, ExportError> {
        let page = scope.page();
        let data = scope.paint_png()?;
        Ok(ExportedFile::png(format!("page-{}.png", page.index), page, &data, None))
    }

    /// Frames of a timed sequence. The page is fixed for the whole scope, so
    /// it is painted once and every frame carries the same pixels.
    pub fn sequence(
        &self,
        scope: &ExportScope<'_>,
        fps: u32,
        duration_ms: u64,
    ) -> Result<Vec<ExportedFile>, ExportError> {
        let frames = self.frame_count(fps, duration_ms)?;
        let page = scope.page();
        let data = scope.paint_png()?;
        Ok((0..frames)
            .map(|i| {
                let filename = format!("page-{}-frame-{:05}.png", page.index, i);
                ExportedFile::png(filename, page, &data, Some(i as u64 * 1000 / fps as u64))
            })
            .collect())
    }

    /// Export one page, hand every file to `sink`, and return the manifest.
    pub fn export(
        &self,
        scope: &ExportScope<'_>,
        preset_id: &str,
        content: &impl Serialize,
        kind: ExportKind,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportManifest, ExportError> {
        let files = match kind {
            ExportKind::Still => vec![self.still(scope)?],
            ExportKind::Sequence { fps, duration_ms } => self.sequence(scope, fps, duration_ms)?,
        };
        for file in &files {
            let bytes = file
                .bytes()
                .map_err(|e| ExportError::InvalidSequence(format!("corrupt payload: {}", e)))?;
            sink.accept(file, &bytes)?;
        }

        let page_index = scope.page().index;
        let mut manifest = ExportManifest {
            id: Uuid::new_v4().to_string(),
            preset_id: preset_id.to_string(),
            page_index,
            kind,
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            job_hash: compute_job_hash(preset_id, page_index, content, ENGINE_VERSION)?,
            manifest_hash: String::new(),
            files,
        };
        manifest.manifest_hash = canonical_digest(&manifest)?;

        info!(
            "exported page {} of {}: {} file(s)",
            page_index,
            preset_id,
            manifest.files.len()
        );
        Ok(manifest)
    }

    /// Default-rate sequence from the configured fps.
    pub fn default_sequence(&self, duration_ms: u64) -> ExportKind {
        ExportKind::Sequence { fps: self.config.fps, duration_ms }
    }
}
