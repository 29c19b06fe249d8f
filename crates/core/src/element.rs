//! Overlay element data model.
//!
//! Elements are a tagged union over four variants (text, highlight,
//! underline, arrow). All geometry is stored in editor canvas space
//! (top-left origin, Y growing downward); the export pipeline re-projects
//! it into page space.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Opaque element identifier, unique within a document.
///
/// Stored as a string so documents saved by older builds (which used ad-hoc
/// timestamp ids) keep their identity on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    /// Rendered identically to `Left` by the exporter.
    Justify,
}

/// How a highlight is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightStyle {
    #[default]
    Fill,
    Border,
    Both,
}

fn default_border_width() -> f32 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub content: String,
    pub font_size: f32,
    pub color: String,
    pub bold: bool,
    #[serde(default)]
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Legacy single color, still the fallback for both fill and border.
    pub color: String,
    pub opacity: f32,
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub fill_opacity: Option<f32>,
    #[serde(default)]
    pub border_color: Option<String>,
    #[serde(default)]
    pub border_opacity: Option<f32>,
    #[serde(default)]
    pub style: HighlightStyle,
    #[serde(default = "default_border_width")]
    pub border_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlineElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
    pub thickness: f32,
    /// Rotation in degrees about the rectangle's left-center anchor.
    #[serde(default)]
    pub angle: f32,
}

macro_rules! impl_rect {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn rect(&self) -> Rect {
                Rect::new(self.x, self.y, self.width, self.height)
            }
        })*
    };
}

impl_rect!(TextElement, HighlightElement, UnderlineElement, ArrowElement);

/// Borrowed view over any element variant, for id-based lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementRef<'a> {
    Text(&'a TextElement),
    Highlight(&'a HighlightElement),
    Underline(&'a UnderlineElement),
    Arrow(&'a ArrowElement),
}

impl ElementRef<'_> {
    pub fn id(&self) -> &ElementId {
        match self {
            ElementRef::Text(el) => &el.id,
            ElementRef::Highlight(el) => &el.id,
            ElementRef::Underline(el) => &el.id,
            ElementRef::Arrow(el) => &el.id,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            ElementRef::Text(el) => el.rect(),
            ElementRef::Highlight(el) => el.rect(),
            ElementRef::Underline(el) => el.rect(),
            ElementRef::Arrow(el) => el.rect(),
        }
    }
}

/// Partial update merged into an element by id.
///
/// Fields that do not apply to the matched variant are ignored, mirroring
/// how the editor UI sends sparse property updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub color: Option<String>,
    // Text
    pub content: Option<String>,
    pub font_size: Option<f32>,
    pub bold: Option<bool>,
    pub text_align: Option<TextAlign>,
    // Highlight
    pub opacity: Option<f32>,
    pub fill_color: Option<String>,
    pub fill_opacity: Option<f32>,
    pub border_color: Option<String>,
    pub border_opacity: Option<f32>,
    pub style: Option<HighlightStyle>,
    pub border_width: Option<f32>,
    // Arrow
    pub thickness: Option<f32>,
    pub angle: Option<f32>,
}

macro_rules! patch_field {
    ($el:expr, $patch:expr, $($field:ident),*) => {
        $(if let Some(value) = &$patch.$field {
            $el.$field = value.clone();
        })*
    };
}

impl TextElement {
    pub fn apply_patch(&mut self, patch: &ElementPatch) {
        patch_field!(self, patch, x, y, width, height, color, content, font_size, bold, text_align);
    }
}

impl HighlightElement {
    pub fn apply_patch(&mut self, patch: &ElementPatch) {
        patch_field!(self, patch, x, y, width, height, color, opacity, style, border_width);
        if patch.fill_color.is_some() {
            self.fill_color = patch.fill_color.clone();
        }
        if patch.fill_opacity.is_some() {
            self.fill_opacity = patch.fill_opacity;
        }
        if patch.border_color.is_some() {
            self.border_color = patch.border_color.clone();
        }
        if patch.border_opacity.is_some() {
            self.border_opacity = patch.border_opacity;
        }
    }
}

impl UnderlineElement {
    pub fn apply_patch(&mut self, patch: &ElementPatch) {
        patch_field!(self, patch, x, y, width, height, color);
    }
}

impl ArrowElement {
    pub fn apply_patch(&mut self, patch: &ElementPatch) {
        patch_field!(self, patch, x, y, width, height, color, thickness, angle);
    }
}
