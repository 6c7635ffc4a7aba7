//! Asset Loading - Opaque I/O Behind a Future
//!
//! The engine never fetches media itself. An `AssetLoader` hands back a
//! future per source; the binder and session only see the decoded result.

use base64::Engine as _;
use futures::future::{self, FutureExt, LocalBoxFuture};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::hashing::sha256_hex;
use crate::model::{Background, CellContent, MediaContent, Page};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Image has zero width or height")]
    EmptyImage,
}

/// RGBA8 pixels (straight alpha) plus a content digest.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    digest: String,
}

impl DecodedImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::EmptyImage);
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(AssetError::Decode(format!(
                "expected {} bytes of RGBA for {}x{}, got {}",
                expected, width, height, pixels.len()
            )));
        }
        let mut hashed = Vec::with_capacity(pixels.len() + 8);
        hashed.extend_from_slice(&width.to_be_bytes());
        hashed.extend_from_slice(&height.to_be_bytes());
        hashed.extend_from_slice(&pixels);
        let digest = sha256_hex(&hashed);
        Ok(Self { width, height, pixels, digest })
    }

    /// A single-colour image, handy for placeholders and tests.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, AssetError> {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::from_rgba(width, height, pixels)
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn pixels(&self) -> &[u8] { &self.pixels }
    pub fn digest(&self) -> &str { &self.digest }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("digest", &self.digest)
            .finish()
    }
}

/// Decode PNG/JPEG bytes into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, AssetError> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|e| AssetError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    DecodedImage::from_rgba(width, height, rgba.into_raw())
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, AssetError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AssetError::InvalidDataUrl("missing data: scheme".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AssetError::InvalidDataUrl("missing ',' separator".into()))?;
    if !header.ends_with(";base64") {
        return Err(AssetError::InvalidDataUrl("only base64 payloads are supported".into()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AssetError::InvalidDataUrl(e.to_string()))
}

/// Asset-loading collaborator. Resolution order across sources is unspecified.
pub trait AssetLoader {
    fn load<'a>(&'a self, source: &'a str) -> LocalBoxFuture<'a, Result<Arc<DecodedImage>, AssetError>>;
}

/// In-memory asset table keyed by source string. `data:` URLs are decoded
/// directly.
#[derive(Debug, Default)]
pub struct MemoryAssetLoader {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, bytes: Vec<u8>) {
        self.assets.insert(source.into(), bytes);
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load<'a>(&'a self, source: &'a str) -> LocalBoxFuture<'a, Result<Arc<DecodedImage>, AssetError>> {
        async move {
            let bytes = if source.starts_with("data:") {
                decode_data_url(source)?
            } else {
                self.assets
                    .get(source)
                    .cloned()
                    .ok_or_else(|| AssetError::NotFound(source.to_string()))?
            };
            decode_image(&bytes).map(Arc::new)
        }
        .boxed_local()
    }
}

/// Reads media from disk. Relative sources resolve against `root`;
/// `file://` prefixes are stripped.
#[derive(Debug, Clone)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let raw = source.strip_prefix("file://").unwrap_or(source);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl AssetLoader for FileAssetLoader {
    fn load<'a>(&'a self, source: &'a str) -> LocalBoxFuture<'a, Result<Arc<DecodedImage>, AssetError>> {
        async move {
            let bytes = if source.starts_with("data:") {
                decode_data_url(source)?
            } else {
                let path = self.resolve(source);
                debug!("loading asset {}", path.display());
                std::fs::read(&path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => AssetError::NotFound(source.to_string()),
                    _ => AssetError::Io { path: path.display().to_string(), reason: e.to_string() },
                })?
            };
            decode_image(&bytes).map(Arc::new)
        }
        .boxed_local()
    }
}

/// Decoded images by source, shared across re-binds within one session.
#[derive(Debug, Clone, Default)]
pub struct MediaCache {
    images: HashMap<String, Arc<DecodedImage>>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<Arc<DecodedImage>> {
        self.images.get(source).cloned()
    }

    pub fn insert(&mut self, source: impl Into<String>, image: Arc<DecodedImage>) {
        self.images.insert(source.into(), image);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct HydrationReport {
    pub loaded: usize,
    pub failed: Vec<(String, AssetError)>,
}

/// Decode every media reference on the page that has no pixels yet.
/// Failures leave the reference undecoded; the renderer paints a placeholder.
pub async fn hydrate_media(page: &mut Page, loader: &dyn AssetLoader) -> HydrationReport {
    let mut sources = page.media_sources();
    sources.sort();
    sources.dedup();

    let results = future::join_all(sources.iter().map(|s| loader.load(s))).await;
    let resolved: HashMap<&str, Result<Arc<DecodedImage>, AssetError>> =
        sources.iter().map(String::as_str).zip(results).collect();

    // Walk the sorted sources so `failed` comes out in a stable order.
    let mut report = HydrationReport::default();
    for source in &sources {
        match resolved.get(source.as_str()) {
            Some(Ok(_)) => report.loaded += 1,
            Some(Err(e)) => {
                warn!("could not hydrate media {}: {}", source, e);
                report.failed.push((source.clone(), e.clone()));
            }
            None => {}
        }
    }

    let attach = |media: &mut MediaContent| {
        if media.image.is_none() {
            if let Some(Ok(image)) = resolved.get(media.source.as_str()) {
                media.image = Some(Arc::clone(image));
            }
        }
    };
    if let Some(Background::Media(media)) = page.background.as_mut() {
        attach(media);
    }
    for cell in page.cells.iter_mut() {
        if let CellContent::Media(media) = &mut cell.content {
            attach(media);
        }
    }
    report
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    use std::io::Cursor;
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, Color, FitMode};
    use futures::executor::block_on;

    #[test]
    fn test_decode_png() {
        let img = decode_image(&png_bytes(4, 2, [255, 0, 0, 255])).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(&img.pixels()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_data_url() {
        let payload = base64::engine::general_purpose::STANDARD.encode(png_bytes(1, 1, [0, 0, 0, 255]));
        let url = format!("data:image/png;base64,{}", payload);
        let loader = MemoryAssetLoader::new();
        let img = block_on(loader.load(&url)).unwrap();
        assert_eq!(img.width(), 1);
        assert!(matches!(decode_data_url("data:text/plain,hi"), Err(AssetError::InvalidDataUrl(_))));
    }

    #[test]
    fn test_missing_asset() {
        let loader = MemoryAssetLoader::new();
        let err = block_on(loader.load("nope.png")).unwrap_err();
        assert_eq!(err, AssetError::NotFound("nope.png".into()));
    }

    #[test]
    fn test_digest_tracks_pixels() {
        let a = DecodedImage::solid(2, 2, [1, 2, 3, 255]).unwrap();
        let b = DecodedImage::solid(2, 2, [1, 2, 3, 255]).unwrap();
        let c = DecodedImage::solid(2, 2, [1, 2, 4, 255]).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(DecodedImage::solid(0, 2, [0; 4]), Err(AssetError::EmptyImage));
    }

    #[test]
    fn test_file_loader_reads_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), png_bytes(3, 3, [9, 9, 9, 255])).unwrap();
        let loader = FileAssetLoader::new(dir.path());
        let img = block_on(loader.load("logo.png")).unwrap();
        assert_eq!(img.width(), 3);
        assert!(matches!(block_on(loader.load("missing.png")), Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_hydrate_attaches_pixels() {
        let mut page = Page::new(0, 10, 10, Background::Color { color: Color::WHITE });
        let id = page.add_cell(
            Bounds::new(0.0, 0.0, 10.0, 10.0),
            CellContent::Media(MediaContent::new("a.png", FitMode::Cover)),
            0,
        );
        page.add_cell(
            Bounds::new(0.0, 0.0, 10.0, 10.0),
            CellContent::Media(MediaContent::new("gone.png", FitMode::Cover)),
            0,
        );
        let mut loader = MemoryAssetLoader::new();
        loader.insert("a.png", png_bytes(2, 2, [0, 255, 0, 255]));

        let report = block_on(hydrate_media(&mut page, &loader));
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(page.cell(id).unwrap().media().unwrap().image.is_some());
    }

    #[test]
    fn test_hydrate_failures_are_sorted() {
        let mut page = Page::new(0, 10, 10, Background::Color { color: Color::WHITE });
        for source in ["zeta.png", "alpha.png", "mid.png", "beta.png", "alpha.png"] {
            page.add_cell(
                Bounds::new(0.0, 0.0, 10.0, 10.0),
                CellContent::Media(MediaContent::new(source, FitMode::Cover)),
                0,
            );
        }
        let mut loader = MemoryAssetLoader::new();
        loader.insert("mid.png", png_bytes(1, 1, [0, 0, 0, 255]));

        let report = block_on(hydrate_media(&mut page, &loader));
        let failed: Vec<_> = report.failed.iter().map(|(source, _)| source.as_str()).collect();
        assert_eq!(failed, vec!["alpha.png", "beta.png", "zeta.png"]);
        assert_eq!(report.loaded, 1);
    }
}
