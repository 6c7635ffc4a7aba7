//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use slotforge_core::{
    assets::{DecodedImage, MediaCache},
    binder::SlotIssue,
    config::AutofitConfig,
    constraints::autofit_font_size,
    slots::{LoadIssue, PageRecord},
    Background, Bounds, CellContent, Color, ContentBinder, ContentId, ContentRejection, FitMode, FontSpec,
    ImageConstraints, MediaContent, Page, PixmapSurface, Renderer, SlotConstraints, SlotDraft, SlotManager,
    SlotType, Surface, TextConstraints, TextRun, UserContentMap, ValidationError,
};
use std::sync::Arc;

struct Fixture {
    page: Page,
    slots: SlotManager,
    headline: ContentId,
    logo: ContentId,
    badge: ContentId,
}

fn text(s: &str, size: f64) -> CellContent {
    CellContent::Text(TextRun {
        text: s.into(),
        font: FontSpec::new("Inter", 700),
        font_size: size,
        color: Color::BLACK,
        align: Default::default(),
        overflow: false,
    })
}

fn create_fixture() -> Fixture {
    let mut page = Page::new(0, 400, 300, Background::Color { color: Color::rgb(250, 245, 235) });
    page.add_cell(Bounds::new(0.0, 200.0, 400.0, 100.0), CellContent::Fill { color: Color::rgb(20, 40, 80) }, 0);
    let headline = page.add_cell(Bounds::new(10.0, 10.0, 200.0, 60.0), text("Summer Sale", 32.0), 2);
    let logo = page.add_cell(
        Bounds::new(250.0, 10.0, 120.0, 80.0),
        CellContent::Media(MediaContent::new("logo.png", FitMode::Contain)),
        2,
    );
    let badge = page.add_cell(Bounds::new(20.0, 220.0, 160.0, 40.0), text("NEW", 24.0), 3);

    let mut slots = SlotManager::new();
    for (id, draft) in [
        (
            headline,
            SlotDraft::new("Headline", SlotType::Text, SlotConstraints::Text(TextConstraints::new(40, 12.0, 48.0))),
        ),
        (
            logo,
            SlotDraft::new("Logo", SlotType::Image, SlotConstraints::Image(ImageConstraints::new(FitMode::Cover, true))),
        ),
        (
            badge,
            SlotDraft::new("Badge Text", SlotType::Text, SlotConstraints::Text(TextConstraints::new(8, 10.0, 30.0))),
        ),
    ] {
        slots.define_slot(page.cell(id).unwrap(), draft).unwrap();
    }
    Fixture { page, slots, headline, logo, badge }
}

fn bounds_of(page: &Page) -> Vec<(ContentId, Bounds)> {
    page.cells.iter().map(|c| (c.content_id, c.bounds)).collect()
}

#[test]
fn invariant_render_is_pure_and_idempotent() {
    let f = create_fixture();
    let before = f.page.clone();
    let renderer = Renderer::default();

    let a = renderer.render(&f.page).unwrap();
    let b = renderer.render(&f.page).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    assert_eq!(f.page, before);
}

#[test]
fn invariant_designer_and_end_user_see_same_pixels() {
    let f = create_fixture();
    let renderer = Renderer::default();

    let mut designer = PixmapSurface::new();
    let designer_list = renderer.render_to(&f.page, &mut designer).unwrap();

    // End user: stored record, reloaded, no values supplied
    let json = serde_json::to_string(&f.slots.serialize(&f.page)).unwrap();
    let record: PageRecord = serde_json::from_str(&json).unwrap();
    let mut loaded = SlotManager::deserialize(record);
    let binder = ContentBinder::new(&renderer, AutofitConfig::default());
    let bound = binder
        .bind(&mut loaded.page, loaded.slots.slots(), &UserContentMap::new(), &MediaCache::new())
        .unwrap();

    let mut end_user = PixmapSurface::new();
    end_user.paint(&bound.display).unwrap();

    assert_eq!(bound.display, designer_list);
    assert_eq!(end_user.digest(), designer.digest());
    assert_eq!(bound.report.defaulted.len(), 3);
}

#[test]
fn invariant_binding_never_moves_cells() {
    let mut f = create_fixture();
    let before = bounds_of(&f.page);
    let renderer = Renderer::default();
    let mut media = MediaCache::new();
    media.insert("wide.png", Arc::new(DecodedImage::solid(400, 50, [200, 0, 0, 255]).unwrap()));

    let content = UserContentMap::new()
        .with("headline", "A long headline that has to shrink")
        .with("logo", "wide.png")
        .with("badgeText", "HOT");
    ContentBinder::new(&renderer, AutofitConfig::default())
        .bind(&mut f.page, f.slots.slots(), &content, &media)
        .unwrap();

    assert_eq!(bounds_of(&f.page), before);
    let logo = f.page.cell(f.logo).unwrap().media().unwrap();
    // aspect lock forces contain: nothing spills past the cell
    assert_eq!(logo.fit, FitMode::Contain);
    let dest = logo.placement.unwrap().dest;
    assert!(dest.x >= 0.0 && dest.y >= 0.0 && dest.x + dest.width <= 120.0 + 1e-9 && dest.y + dest.height <= 80.0 + 1e-9);
}

#[test]
fn invariant_rejection_is_isolated_per_slot() {
    let mut f = create_fixture();
    let renderer = Renderer::default();
    let content = UserContentMap::new()
        .with("headline", "Fresh Arrivals")
        .with("badgeText", "WAY TOO LONG BADGE");

    let bound = ContentBinder::new(&renderer, AutofitConfig::default())
        .bind(&mut f.page, f.slots.slots(), &content, &MediaCache::new())
        .unwrap();

    assert_eq!(bound.report.applied.len(), 1);
    assert!(matches!(
        &bound.report.issues[..],
        [SlotIssue::Rejected { rejection: ContentRejection::TextTooLong { max: 8, actual: 18 }, .. }]
    ));
    assert_eq!(f.page.cell(f.headline).unwrap().text_run().unwrap().text, "Fresh Arrivals");
    assert_eq!(f.page.cell(f.badge).unwrap().text_run().unwrap().text, "NEW");
}

#[test]
fn invariant_orphaned_slot_is_not_fatal() {
    let mut f = create_fixture();
    f.page.remove_cell(f.badge);
    let record = f.slots.serialize(&f.page);

    let mut loaded = SlotManager::deserialize(record.clone());
    assert!(matches!(&loaded.report.issues[..], [LoadIssue::OrphanedSlot { .. }]));
    assert_eq!(loaded.slots.slots().len(), 3);

    let renderer = Renderer::default();
    let content = UserContentMap::new().with("headline", "Still works").with("badgeText", "LOST");
    let bound = ContentBinder::new(&renderer, AutofitConfig::default())
        .bind(&mut loaded.page, loaded.slots.slots(), &content, &MediaCache::new())
        .unwrap();

    assert_eq!(bound.report.applied.len(), 1);
    assert!(matches!(&bound.report.issues[..], [SlotIssue::Orphaned { .. }]));

    // retained for repair: written back out unchanged
    assert_eq!(loaded.slots.serialize(&loaded.page).content_slots, record.content_slots);
}

#[test]
fn invariant_invalid_stored_constraints_are_skipped() {
    let f = create_fixture();
    let mut record = f.slots.serialize(&f.page);
    let headline = record.content_slots.iter_mut().find(|s| s.field_name == "headline").unwrap();
    headline.constraints = SlotConstraints::Text(TextConstraints::new(40, 48.0, 12.0));
    let json = serde_json::to_string(&record).unwrap();

    let mut loaded = SlotManager::deserialize(serde_json::from_str(&json).unwrap());
    assert!(matches!(&loaded.report.issues[..], [LoadIssue::InvalidConstraints { .. }]));

    let renderer = Renderer::default();
    let content = UserContentMap::new().with("headline", "Hi").with("badgeText", "HOT");
    let bound = ContentBinder::new(&renderer, AutofitConfig::default())
        .bind(&mut loaded.page, loaded.slots.slots(), &content, &MediaCache::new())
        .unwrap();

    assert!(matches!(&bound.report.issues[..], [SlotIssue::InvalidConstraints { .. }]));
    assert_eq!(bound.report.applied.len(), 1);
    let run = loaded.page.cell(f.headline).unwrap().text_run().unwrap();
    assert_eq!(run.text, "Summer Sale");
    assert_eq!(run.font_size, 32.0);
}

#[test]
fn invariant_slots_survive_roundtrip() {
    let f = create_fixture();
    let json = serde_json::to_string(&f.slots.serialize(&f.page)).unwrap();
    let loaded = SlotManager::deserialize(serde_json::from_str(&json).unwrap());

    assert!(loaded.report.issues.is_empty());
    assert_eq!(loaded.page, f.page);
    assert_eq!(loaded.slots.slots(), f.slots.slots());
}

#[test]
fn invariant_field_names_unique() {
    let mut f = create_fixture();
    let extra = f.page.add_cell(Bounds::new(0.0, 100.0, 100.0, 30.0), text("x", 12.0), 1);
    let err = f
        .slots
        .define_slot(
            f.page.cell(extra).unwrap(),
            SlotDraft::new("Headline!", SlotType::Text, SlotConstraints::Text(TextConstraints::new(10, 8.0, 12.0))),
        )
        .unwrap_err();
    assert!(matches!(err, ValidationError::DuplicateFieldName(_)));
}

#[test]
fn invariant_same_content_same_frame() {
    let f = create_fixture();
    let renderer = Renderer::default();
    let binder = ContentBinder::new(&renderer, AutofitConfig::default());
    let content = UserContentMap::new().with("headline", "Repeatable");

    let mut first = f.page.clone();
    let mut second = f.page.clone();
    let a = binder.bind(&mut first, f.slots.slots(), &content, &MediaCache::new()).unwrap();
    binder.bind(&mut second, f.slots.slots(), &content, &MediaCache::new()).unwrap();
    let b = binder.bind(&mut second, f.slots.slots(), &content, &MediaCache::new()).unwrap();

    assert_eq!(a.display, b.display);
    assert_eq!(first, second);
}

#[test]
fn invariant_autofit_stays_in_range() {
    let layout = Renderer::default().layout().clone();
    let autofit = AutofitConfig::default();
    let constraints = TextConstraints::new(500, 12.0, 48.0);
    let font = FontSpec::new("Inter", 400);

    for len in [1usize, 5, 12, 30, 80, 200] {
        let text = "word ".repeat(len);
        let text = text.trim_end();
        let (size, overflow) = autofit_font_size(&layout, &autofit, text, &font, &constraints, 200.0, 60.0);
        assert!((12.0..=48.0).contains(&size), "size {} out of range", size);
        if overflow {
            assert_eq!(size, 12.0);
        } else {
            assert!(layout.fits(text, &font, size, 200.0, 60.0));
        }
    }
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_bind_renders_exactly_once() {
    use slotforge_core::render::{get_render_call_count, reset_render_call_count};

    let mut f = create_fixture();
    let renderer = Renderer::default();
    reset_render_call_count();
    ContentBinder::new(&renderer, AutofitConfig::default())
        .bind(&mut f.page, f.slots.slots(), &UserContentMap::new().with("headline", "Once"), &MediaCache::new())
        .unwrap();
    assert_eq!(get_render_call_count(), 1);
}
