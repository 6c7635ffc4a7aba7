//! Edit Sessions - Debounced End-User Editing
//!
//! One session owns one page for one end user. Edits are coalesced through a
//! single pending timer; when it expires, only the latest snapshot is bound,
//! always starting again from the designer's page so removed entries fall
//! back to the designer defaults.

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use std::time::{Duration, Instant};

use crate::assets::{AssetLoader, MediaCache};
use crate::binder::{BindObserver, BoundFrame, ContentBinder, MediaRequest, SlotIssue, UserContentMap};
use crate::config::{AutofitConfig, EngineConfig};
use crate::constraints::ContentRejection;
use crate::export::{ExportError, ExportScope};
use crate::model::Page;
use crate::render::{DisplayList, RenderError, Renderer};
use crate::slots::{ContentSlotSet, LoadedPage};

/// A cancellable timer with exactly one pending slot. Re-arming replaces
/// the pending value and restarts the window.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None }
    }

    /// Returns true if an earlier pending value was discarded.
    pub fn arm(&mut self, value: T, now: Instant) -> bool {
        self.pending.replace((now + self.window, value)).is_some()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Take the pending value if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.cancel(),
            _ => None,
        }
    }
}

/// Result of one asynchronous media resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpdate {
    pub request: MediaRequest,
    pub issue: Option<SlotIssue>,
    pub display: DisplayList,
}

pub struct EditSession {
    designer: Page,
    live: Page,
    slots: ContentSlotSet,
    renderer: Renderer,
    autofit: AutofitConfig,
    debounce: Debouncer<UserContentMap>,
    media: MediaCache,
    pending_media: Vec<MediaRequest>,
    current: UserContentMap,
    frame: Option<DisplayList>,
    observers: Vec<Box<dyn BindObserver>>,
}

impl EditSession {
    pub fn new(page: Page, slots: ContentSlotSet, config: &EngineConfig) -> Self {
        Self {
            live: page.clone(),
            designer: page,
            slots,
            renderer: Renderer::from_config(config),
            autofit: config.autofit,
            debounce: Debouncer::new(config.debounce_window()),
            media: MediaCache::new(),
            pending_media: vec![],
            current: UserContentMap::new(),
            frame: None,
            observers: vec![],
        }
    }

    pub fn from_loaded(loaded: LoadedPage, config: &EngineConfig) -> Self {
        Self::new(loaded.page, loaded.slots.slots().clone(), config)
    }

    /// Swap in a renderer (custom text metrics, for instance).
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn subscribe(&mut self, observer: Box<dyn BindObserver>) {
        self.observers.push(observer);
    }

    pub fn page(&self) -> &Page {
        &self.live
    }

    pub fn designer_page(&self) -> &Page {
        &self.designer
    }

    pub fn slots(&self) -> &ContentSlotSet {
        &self.slots
    }

    pub fn content(&self) -> &UserContentMap {
        &self.current
    }

    pub fn frame(&self) -> Option<&DisplayList> {
        self.frame.as_ref()
    }

    pub fn pending_media(&self) -> &[MediaRequest] {
        &self.pending_media
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// True when no edit is waiting and no media is in flight.
    pub fn is_settled(&self) -> bool {
        !self.debounce.is_pending() && self.pending_media.is_empty()
    }

    /// Paint the current page without binding anything new.
    pub fn render(&mut self) -> Result<&DisplayList, RenderError> {
        let display = self.renderer.render(&self.live)?;
        Ok(self.frame.insert(display))
    }

    /// Record an edit. Nothing is applied until the debounce window passes.
    pub fn edit(&mut self, content: UserContentMap, now: Instant) {
        if self.debounce.arm(content, now) {
            debug!("edit superseded a pending snapshot");
        }
    }

    /// Apply the pending snapshot if its window has expired.
    pub fn poll(&mut self, now: Instant) -> Result<Option<BoundFrame>, RenderError> {
        match self.debounce.fire(now) {
            Some(content) => self.apply(content).map(Some),
            None => Ok(None),
        }
    }

    /// Apply `content` immediately, discarding any pending snapshot.
    pub fn apply_now(&mut self, content: UserContentMap) -> Result<BoundFrame, RenderError> {
        self.debounce.cancel();
        self.apply(content)
    }

    fn apply(&mut self, content: UserContentMap) -> Result<BoundFrame, RenderError> {
        let mut live = self.designer.clone();
        let binder = ContentBinder::new(&self.renderer, self.autofit);
        let bound = binder.bind(&mut live, &self.slots, &content, &self.media)?;

        info!(
            "bound {} slot(s), {} pending media, {} issue(s)",
            bound.report.applied.len(),
            bound.report.pending_media.len(),
            bound.report.issues.len()
        );
        for issue in &bound.report.issues {
            self.notify(issue);
        }

        self.live = live;
        self.current = content;
        self.pending_media = bound.report.pending_media.clone();
        self.frame = Some(bound.display.clone());
        Ok(bound)
    }

    fn notify(&self, issue: &SlotIssue) {
        for observer in &self.observers {
            observer.slot_issue(issue);
        }
    }

    /// Load every pending image. Loads finish in any order; each one that
    /// completes re-renders the whole page.
    pub async fn settle_media(&mut self, loader: &dyn AssetLoader) -> Result<Vec<MediaUpdate>, RenderError> {
        let requests = std::mem::take(&mut self.pending_media);
        let mut loads: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| async move {
                let result = loader.load(&request.source).await;
                (request, result)
            })
            .collect();

        let mut updates = vec![];
        while let Some((request, result)) = loads.next().await {
            let still_wanted = self
                .slots
                .get(&request.slot_id)
                .and_then(|slot| self.current.value_for(slot))
                .map_or(false, |value| value == request.source);
            if !still_wanted {
                debug!("dropping stale media {} for {}", request.source, request.slot_id);
                continue;
            }

            let issue = match result {
                Ok(image) => {
                    self.media.insert(request.source.clone(), image.clone());
                    let binder = ContentBinder::new(&self.renderer, self.autofit);
                    binder.attach_media(&mut self.live, &self.slots, &request, image).err()
                }
                Err(e) => Some(SlotIssue::Rejected {
                    slot_id: request.slot_id.clone(),
                    field_name: self
                        .slots
                        .get(&request.slot_id)
                        .map(|s| s.field_name.clone())
                        .unwrap_or_default(),
                    rejection: ContentRejection::MediaLoadFailed {
                        url: request.source.clone(),
                        reason: e.to_string(),
                    },
                }),
            };
            if let Some(issue) = &issue {
                self.notify(issue);
            }

            let display = self.renderer.render(&self.live)?;
            self.frame = Some(display.clone());
            updates.push(MediaUpdate { request, issue, display });
        }
        Ok(updates)
    }

    /// Borrow the page read-only for export. Refused while an edit or a
    /// media load is outstanding.
    pub fn export_scope(&self) -> Result<ExportScope<'_>, ExportError> {
        if !self.is_settled() {
            return Err(ExportError::EditInProgress(self.live.index));
        }
        Ok(ExportScope::new(&self.live, &self.renderer))
    }
}
