//! End-to-end flows: designer saves, end user fills in, export samples.

use futures::executor::block_on;
use slotforge_core::{
    assets::{decode_image, MemoryAssetLoader},
    export::{DirectorySink, ExportKind, ExportedFile},
    Background, Bounds, CellContent, Color, EditSession, EngineConfig, ExportDriver, FitMode, FontSpec,
    ImageConstraints, MediaContent, Page, Preset, PresetLibrary, SlotConstraints, SlotDraft, SlotManager, SlotType,
    TextConstraints, TextRun, UserContentMap,
};
use std::io::Cursor;
use std::time::{Duration, Instant};

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(vec![]);
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn designer_preset() -> Preset {
    let mut page = Page::new(0, 400, 300, Background::Color { color: Color::WHITE });
    let headline = page.add_cell(
        Bounds::new(10.0, 10.0, 200.0, 60.0),
        CellContent::Text(TextRun {
            text: "Grand Opening".into(),
            font: FontSpec::new("Inter", 700),
            font_size: 28.0,
            color: Color::BLACK,
            align: Default::default(),
            overflow: false,
        }),
        1,
    );
    let logo = page.add_cell(
        Bounds::new(250.0, 10.0, 120.0, 80.0),
        CellContent::Media(MediaContent::new("placeholder-logo.png", FitMode::Contain)),
        1,
    );
    // designer-only guide, hidden for everyone
    let guide = page.add_cell(Bounds::new(0.0, 150.0, 400.0, 1.0), CellContent::Fill { color: Color::rgb(255, 0, 255) }, 9);
    page.set_visible(guide, false);

    let mut slots = SlotManager::new();
    slots
        .define_slot(
            page.cell(headline).unwrap(),
            SlotDraft::new("Headline", SlotType::Text, SlotConstraints::Text(TextConstraints::new(40, 12.0, 48.0)))
                .with_description("Shown at the top of the flyer"),
        )
        .unwrap();
    slots
        .define_slot(
            page.cell(logo).unwrap(),
            SlotDraft::new("Logo", SlotType::Image, SlotConstraints::Image(ImageConstraints::new(FitMode::Cover, true))),
        )
        .unwrap();

    let mut preset = Preset::new("opening-flyer", "Opening Flyer");
    preset.save_page(&page, &slots);
    preset
}

fn pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let decoded = decode_image(bytes).unwrap();
    assert_eq!(decoded.width(), width);
    let i = ((y * width + x) * 4) as usize;
    let p = decoded.pixels();
    [p[i], p[i + 1], p[i + 2], p[i + 3]]
}

#[test]
fn scenario_designer_to_end_user_to_export() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("opening-flyer.json"), designer_preset().to_json().unwrap()).unwrap();

    let library = PresetLibrary::load_from_dir(dir.path()).unwrap();
    let preset = library.get("opening-flyer").unwrap();
    let loaded = preset.load_page(0).unwrap();
    assert!(loaded.report.issues.is_empty());

    let fields = loaded.slots.form_fields(&loaded.page);
    let names: Vec<_> = fields.iter().map(|f| f.field_name.as_str()).collect();
    assert_eq!(names, vec!["headline", "logo"]);
    assert_eq!(fields[0].default_value.as_deref(), Some("Grand Opening"));

    let config = EngineConfig::default();
    let mut session = EditSession::from_loaded(loaded, &config);

    // typing burst, then an upload
    let t0 = Instant::now();
    session.edit(UserContentMap::new().with("headline", "Now"), t0);
    session.edit(UserContentMap::new().with("headline", "Now Open"), t0 + Duration::from_millis(120));
    session.edit(
        UserContentMap::new().with("headline", "Now Open").with("logo", "brand.png"),
        t0 + Duration::from_millis(240),
    );
    assert!(session.poll(t0 + Duration::from_millis(300)).unwrap().is_none());
    let bound = session.poll(t0 + Duration::from_millis(540)).unwrap().unwrap();
    assert_eq!(bound.report.applied.len(), 1);
    assert_eq!(bound.report.pending_media.len(), 1);
    assert!(session.export_scope().is_err());

    let mut loader = MemoryAssetLoader::new();
    loader.insert("brand.png", png(60, 40, [0, 200, 0, 255]));
    let updates = block_on(session.settle_media(&loader)).unwrap();
    assert!(updates.iter().all(|u| u.issue.is_none()));

    let out = dir.path().join("out");
    let mut sink = DirectorySink::create(&out).unwrap();
    let scope = session.export_scope().unwrap();
    let manifest = ExportDriver::from_config(&config)
        .export(&scope, &preset.id, session.content(), ExportKind::Still, &mut sink)
        .unwrap();

    assert_eq!(manifest.files.len(), 1);
    let bytes = std::fs::read(out.join("page-0.png")).unwrap();
    assert_eq!(slotforge_core::sha256_hex(&bytes), manifest.files[0].hash);
    // 60x40 into 120x80 under contain fills the cell exactly
    let [r, g, b, a] = pixel(&bytes, 400, 310, 50);
    assert!(r < 5 && (195..=205).contains(&g) && b < 5 && a == 255);
    // hidden guide never paints
    assert_eq!(pixel(&bytes, 400, 5, 150), [255, 255, 255, 255]);
}

#[test]
fn scenario_failed_upload_keeps_designer_default() {
    let preset = designer_preset();
    let config = EngineConfig::default();
    let mut session = EditSession::from_loaded(preset.load_page(0).unwrap(), &config);
    let designer_frame = session.render().unwrap().clone();

    session.apply_now(UserContentMap::new().with("logo", "corrupt.png")).unwrap();
    let mut loader = MemoryAssetLoader::new();
    loader.insert("corrupt.png", b"not an image".to_vec());
    let updates = block_on(session.settle_media(&loader)).unwrap();

    assert!(updates[0].issue.is_some());
    assert_eq!(session.frame(), Some(&designer_frame));
    assert!(session.export_scope().is_ok());
}

#[test]
fn scenario_superseded_upload_is_never_requested() {
    let preset = designer_preset();
    let mut session = EditSession::from_loaded(preset.load_page(0).unwrap(), &EngineConfig::default());

    session.apply_now(UserContentMap::new().with("logo", "first.png")).unwrap();
    session.apply_now(UserContentMap::new().with("logo", "second.png")).unwrap();
    let sources: Vec<_> = session.pending_media().iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["second.png"]);

    let mut loader = MemoryAssetLoader::new();
    loader.insert("first.png", png(4, 4, [255, 0, 0, 255]));
    loader.insert("second.png", png(4, 4, [0, 0, 255, 255]));
    let updates = block_on(session.settle_media(&loader)).unwrap();

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].request.source, "second.png");
}

#[test]
fn scenario_sequence_export() {
    let preset = designer_preset();
    let config = EngineConfig::default();
    let session = EditSession::from_loaded(preset.load_page(0).unwrap(), &config);
    let driver = ExportDriver::from_config(&config);

    let mut files: Vec<ExportedFile> = vec![];
    let manifest = driver
        .export(&session.export_scope().unwrap(), &preset.id, &(), driver.default_sequence(500), &mut files)
        .unwrap();

    assert_eq!(manifest.files.len(), 15);
    assert_eq!(files.len(), 15);
    assert_eq!(manifest.files.last().unwrap().timestamp_ms, Some(466));
}
