//! The modal viewer opened from the file list.

use crate::error::E2eResult;
use crate::page::Page;
use crate::wait::WaitConfig;

const ROOT: &str = "body > .viewer";
const TITLE: &str = "body > .viewer .modal-title";
const MENU_TOGGLE: &str = "body > .viewer .modal-header button.action-item__menutoggle";
const CLOSE: &str = "body > .viewer .modal-header button.header-close";
const NEXT: &str = "body > .viewer button.next";
const PREV: &str = "body > .viewer button.prev";
const LOADING_CLASS: &str = "icon-loading";
const MASK_CLASS: &str = "modal-mask";

/// Element a viewer handler renders for its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    pub fn tag(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Image => "img",
        }
    }

    /// Viewer handler for a MIME type, if the viewer has one.
    pub fn for_mime(mime: &str) -> Option<Self> {
        match mime.split('/').next()? {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "image" => Some(MediaKind::Image),
            _ => None,
        }
    }
}

pub struct Viewer<'a> {
    page: &'a Page,
}

impl<'a> Viewer<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    pub fn media_selector(kind: MediaKind) -> String {
        format!("{ROOT} .modal-container {}", kind.tag())
    }

    pub fn active_media_selector(kind: MediaKind) -> String {
        format!(
            "{ROOT} .modal-container .viewer__file.viewer__file--active {}",
            kind.tag()
        )
    }

    /// Polls until the overlay is attached to the document.
    pub async fn wait_until_mounted(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_exists(ROOT, wait).await.map(|_| ())
    }

    pub async fn expect_open(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_visible(ROOT, wait).await.map(|_| ())
    }

    pub async fn expect_closed(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_absent(ROOT, wait).await
    }

    /// Title, actions menu and close button are all shown.
    pub async fn expect_header(&self, title: &str, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_text_contains(TITLE, title, wait).await?;
        self.page.expect_visible(MENU_TOGGLE, wait).await?;
        self.page.expect_visible(CLOSE, wait).await?;
        Ok(())
    }

    pub async fn expect_media_count(&self, kind: MediaKind, count: usize, wait: WaitConfig) -> E2eResult<()> {
        self.page
            .expect_count(&Self::media_selector(kind), count, wait)
            .await
    }

    /// Asserts the active element's `src` contains `needle`; returns the src.
    pub async fn expect_active_source(&self, kind: MediaKind, needle: &str, wait: WaitConfig) -> E2eResult<String> {
        self.page
            .expect_attribute_contains(&Self::active_media_selector(kind), "src", needle, wait)
            .await
    }

    pub async fn expect_next_visible(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_visible(NEXT, wait).await.map(|_| ())
    }

    pub async fn expect_prev_visible(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_visible(PREV, wait).await.map(|_| ())
    }

    /// Overlay is a settled modal mask without the loading spinner.
    pub async fn expect_loaded(&self, wait: WaitConfig) -> E2eResult<()> {
        self.page.expect_visible(ROOT, wait).await?;
        self.page.expect_class(ROOT, MASK_CLASS, true, wait).await?;
        self.page.expect_class(ROOT, LOADING_CLASS, false, wait).await
    }

    pub async fn next(&self) -> E2eResult<()> {
        self.page.click(NEXT, self.page.wait()).await
    }

    pub async fn prev(&self) -> E2eResult<()> {
        self.page.click(PREV, self.page.wait()).await
    }

    pub async fn close(&self) -> E2eResult<()> {
        self.page.click(CLOSE, self.page.wait()).await
    }
}
