//! Presets - Saved Designer Layouts
//!
//! A preset is an ordered list of page records. Loading always goes through
//! the engine version check, and every page comes back through
//! `SlotManager::deserialize` so orphaned slots are reported, not fatal.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::Page;
use crate::slots::{LoadedPage, PageRecord, SlotManager};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Preset {preset} requires engine >= {required}, current is {current}")]
    EngineVersionMismatch { preset: String, required: String, current: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Preset {preset} has no page {index}")]
    PageNotFound { preset: String, index: u32 },
}

fn default_engine_min_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_engine_min_version")]
    pub engine_min_version: String,
    #[serde(default)]
    pub pages: Vec<PageRecord>,
}

impl Preset {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            engine_min_version: ENGINE_VERSION.to_string(),
            pages: vec![],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.check_engine_version()?;
        Ok(preset)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn check_engine_version(&self) -> Result<(), LoadError> {
        let engine = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| LoadError::InvalidVersion(ENGINE_VERSION.to_string()))?;
        let required = semver::Version::parse(&self.engine_min_version)
            .map_err(|_| LoadError::InvalidVersion(self.engine_min_version.clone()))?;

        if engine < required {
            return Err(LoadError::EngineVersionMismatch {
                preset: self.id.clone(),
                required: self.engine_min_version.clone(),
                current: ENGINE_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Save a designer page. A page with the same index is overwritten.
    pub fn save_page(&mut self, page: &Page, slots: &SlotManager) {
        let record = slots.serialize(page);
        match self.pages.iter_mut().find(|r| r.page.index == page.index) {
            Some(existing) => *existing = record,
            None => {
                self.pages.push(record);
                self.pages.sort_by_key(|r| r.page.index);
            }
        }
    }

    pub fn load_page(&self, index: u32) -> Result<LoadedPage, LoadError> {
        self.pages
            .iter()
            .find(|r| r.page.index == index)
            .cloned()
            .map(SlotManager::deserialize)
            .ok_or_else(|| LoadError::PageNotFound { preset: self.id.clone(), index })
    }

    pub fn load_pages(&self) -> Vec<LoadedPage> {
        self.pages.iter().cloned().map(SlotManager::deserialize).collect()
    }
}

/// Preset library - loads and caches presets
#[derive(Debug, Default)]
pub struct PresetLibrary {
    presets: BTreeMap<String, Preset>,
}

impl PresetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` preset in `dir`. Unreadable or incompatible files
    /// are skipped with a warning.
    pub fn load_from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let mut library = Self::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |e| e == "json") {
                    match Preset::load(&path) {
                        Ok(preset) => library.register(preset),
                        Err(e) => warn!("skipping preset {}: {}", path.display(), e),
                    }
                }
            }
        }
        Ok(library)
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.get(id)
    }

    pub fn list(&self) -> Vec<&Preset> {
        self.presets.values().collect()
    }

    pub fn register(&mut self, preset: Preset) {
        self.presets.insert(preset.id.clone(), preset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{SlotConstraints, TextConstraints};
    use crate::model::{Background, Bounds, CellContent, Color, FontSpec, TextRun};
    use crate::slots::{SlotDraft, SlotType};

    fn designer_page(index: u32, text: &str) -> (Page, SlotManager) {
        let mut page = Page::new(index, 200, 100, Background::Color { color: Color::WHITE });
        let id = page.add_cell(
            Bounds::new(0.0, 0.0, 200.0, 40.0),
            CellContent::Text(TextRun {
                text: text.into(),
                font: FontSpec::default(),
                font_size: 20.0,
                color: Color::BLACK,
                align: Default::default(),
                overflow: false,
            }),
            0,
        );
        let mut slots = SlotManager::new();
        slots
            .define_slot(
                page.cell(id).unwrap(),
                SlotDraft::new("Title", SlotType::Text, SlotConstraints::Text(TextConstraints::new(30, 10.0, 30.0))),
            )
            .unwrap();
        (page, slots)
    }

    #[test]
    fn test_save_page_overwrites_same_index() {
        let mut preset = Preset::new("flyer", "Flyer");
        let (p1, s1) = designer_page(1, "second");
        let (p0, s0) = designer_page(0, "first");
        preset.save_page(&p1, &s1);
        preset.save_page(&p0, &s0);
        assert_eq!(preset.pages.iter().map(|r| r.page.index).collect::<Vec<_>>(), vec![0, 1]);

        let (p0b, s0b) = designer_page(0, "replaced");
        preset.save_page(&p0b, &s0b);
        assert_eq!(preset.pages.len(), 2);
        let loaded = preset.load_page(0).unwrap();
        let cell = loaded.page.cells.first().unwrap();
        assert_eq!(cell.text_run().unwrap().text, "replaced");
        assert_eq!(loaded.slots.slots().len(), 1);
        assert!(matches!(preset.load_page(7), Err(LoadError::PageNotFound { index: 7, .. })));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut preset = Preset::new("flyer", "Flyer");
        let (page, slots) = designer_page(0, "hello");
        preset.save_page(&page, &slots);
        let back = Preset::from_json(&preset.to_json().unwrap()).unwrap();
        assert_eq!(back, preset);
    }

    #[test]
    fn test_newer_engine_required() {
        let mut preset = Preset::new("future", "Future");
        preset.engine_min_version = "99.0.0".into();
        assert!(matches!(
            preset.check_engine_version(),
            Err(LoadError::EngineVersionMismatch { .. })
        ));
        preset.engine_min_version = "not-a-version".into();
        assert!(matches!(preset.check_engine_version(), Err(LoadError::InvalidVersion(_))));
    }

    #[test]
    fn test_load_from_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = Preset::new("good", "Good");
        let (page, slots) = designer_page(0, "x");
        good.save_page(&page, &slots);
        fs::write(dir.path().join("good.json"), good.to_json().unwrap()).unwrap();

        let mut future = Preset::new("future", "Future");
        future.engine_min_version = "99.0.0".into();
        fs::write(dir.path().join("future.json"), future.to_json().unwrap()).unwrap();
        fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = PresetLibrary::load_from_dir(dir.path()).unwrap();
        assert_eq!(library.list().len(), 1);
        assert!(library.get("good").is_some());
        assert!(library.get("future").is_none());
    }

    #[test]
    fn test_missing_dir_is_empty_library() {
        let library = PresetLibrary::load_from_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(library.list().is_empty());
    }
}
