//! Document state: pages, per-page overlays, pagination, and the source
//! PDF buffers everything is anchored to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::{ArrowElement, ElementId, ElementRef, HighlightElement, TextElement, UnderlineElement};
use crate::serialize;

/// Opaque page identifier. String-typed for the same legacy-id reason as
/// [`ElementId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn generate() -> Self {
        Self(format!("page-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Which geometry convention element coordinates are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateSpace {
    /// Canvas pixels against a fixed 612pt-wide layout. Documents saved
    /// before the migration carry no tag at all, so absence means legacy.
    #[default]
    #[serde(rename = "legacy-612")]
    Legacy612,
    /// Native PDF points, top-left origin.
    #[serde(rename = "pdf")]
    Pdf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub name: String,
    pub created_at: String,
    pub page_order: Vec<PageId>,
}

/// Manually entered footer text for one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footer {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub detail: String,
}

impl Footer {
    pub fn is_empty(&self) -> bool {
        self.number.is_empty() && self.detail.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationPosition {
    #[default]
    BottomCenter,
    BottomRight,
    TopRight,
}

fn default_start_at() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub position: PaginationPosition,
    #[serde(default = "default_start_at")]
    pub start_at: i32,
    #[serde(default)]
    pub background_box: bool,
    /// Pre-footer documents stored manual footer text here. Captured on
    /// load, moved into [`Footer`]s, and never written back.
    #[serde(default, rename = "manualNumber", skip_serializing)]
    pub manual_number: BTreeMap<PageId, String>,
    #[serde(default, rename = "manualDetail", skip_serializing)]
    pub manual_detail: BTreeMap<PageId, String>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            enabled: false,
            position: PaginationPosition::default(),
            start_at: default_start_at(),
            background_box: false,
            manual_number: BTreeMap::new(),
            manual_detail: BTreeMap::new(),
        }
    }
}

/// Sparse update for pagination settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationPatch {
    pub enabled: Option<bool>,
    pub position: Option<PaginationPosition>,
    pub start_at: Option<i32>,
    pub background_box: Option<bool>,
}

impl Pagination {
    pub fn apply_patch(&mut self, patch: &PaginationPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(start_at) = patch.start_at {
            self.start_at = start_at;
        }
        if let Some(background_box) = patch.background_box {
            self.background_box = background_box;
        }
    }
}

/// Where a page came from and how the editor displayed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    /// Page width in PDF points.
    pub width: f32,
    /// Page height in PDF points.
    pub height: f32,
    /// Zero-based page index inside its source PDF.
    pub page_index: usize,
    /// Which entry of `original_pdf_sources` the page belongs to.
    #[serde(default)]
    pub source_index: usize,
    /// Canvas-to-viewport affine captured at edit time, if any.
    #[serde(default)]
    pub transform: Option<[f32; 6]>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    #[serde(default)]
    pub texts: Vec<TextElement>,
    #[serde(default)]
    pub highlights: Vec<HighlightElement>,
    #[serde(default)]
    pub underlines: Vec<UnderlineElement>,
    #[serde(default)]
    pub arrows: Vec<ArrowElement>,
    #[serde(default)]
    pub footer: Footer,
}

impl PageData {
    pub fn find_element(&self, id: &ElementId) -> Option<ElementRef<'_>> {
        self.texts
            .iter()
            .find(|el| &el.id == id)
            .map(ElementRef::Text)
            .or_else(|| {
                self.highlights
                    .iter()
                    .find(|el| &el.id == id)
                    .map(ElementRef::Highlight)
            })
            .or_else(|| {
                self.underlines
                    .iter()
                    .find(|el| &el.id == id)
                    .map(ElementRef::Underline)
            })
            .or_else(|| {
                self.arrows
                    .iter()
                    .find(|el| &el.id == id)
                    .map(ElementRef::Arrow)
            })
    }

    pub fn contains_element(&self, id: &ElementId) -> bool {
        self.find_element(id).is_some()
    }
}

fn default_language() -> String {
    "en".to_owned()
}

/// Complete persisted state of one editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    #[serde(default)]
    pub document: Option<DocumentInfo>,
    #[serde(default)]
    pub pages: BTreeMap<PageId, PageData>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub coordinate_space: CoordinateSpace,
    /// Single-source buffer written by older builds. Migrated into
    /// `original_pdf_sources` on load.
    #[serde(default, with = "serialize::base64_opt")]
    pub original_pdf_bytes: Option<Vec<u8>>,
    #[serde(default, with = "serialize::base64_vec")]
    pub original_pdf_sources: Vec<Vec<u8>>,
    #[serde(default)]
    pub page_metrics: BTreeMap<PageId, PageMetrics>,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            document: None,
            pages: BTreeMap::new(),
            pagination: Pagination::default(),
            language: default_language(),
            coordinate_space: CoordinateSpace::default(),
            original_pdf_bytes: None,
            original_pdf_sources: Vec::new(),
            page_metrics: BTreeMap::new(),
        }
    }
}

impl DocumentState {
    pub fn page_order(&self) -> &[PageId] {
        self.document
            .as_ref()
            .map(|doc| doc.page_order.as_slice())
            .unwrap_or(&[])
    }

    /// Locates an element across all pages.
    pub fn find_element(&self, id: &ElementId) -> Option<(&PageId, ElementRef<'_>)> {
        self.pages
            .iter()
            .find_map(|(page_id, page)| page.find_element(id).map(|el| (page_id, el)))
    }
}
