//! Flattens a document's overlays onto its source PDFs and produces the
//! final output bytes.

use log::warn;
use thiserror::Error;

use pdf_overlay_backend::{
    DocumentHandle, FillStyle, FontHandle, PathOp, PathSeg, PdfBackend, PdfBackendError, RectOp,
    StandardFont, StrokeStyle, TextOp,
};

use crate::document::{CoordinateSpace, DocumentState, PageId, PaginationPosition};
use crate::element::{ArrowElement, HighlightElement, HighlightStyle, TextAlign, TextElement, UnderlineElement};
use crate::geometry::{hex_to_rgb, map_element_rect, rotate_about, MappedRect, Matrix, Rect, Rgb, Size};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no document is open")]
    NoDocument,
    #[error("document has no source pdfs")]
    NoSources,
    #[error(transparent)]
    Backend(#[from] PdfBackendError),
}

const FOOTER_FONT_SIZE: f32 = 12.0;
const FOOTER_MARGIN: f32 = 20.0;
const TEXT_PADDING: f32 = 4.0;

/// Renders every page in reading order and returns the finished PDF.
pub fn export_final_pdf<B: PdfBackend>(
    backend: &mut B,
    state: &DocumentState,
) -> Result<Vec<u8>, ExportError> {
    let document = state.document.as_ref().ok_or(ExportError::NoDocument)?;
    if state.original_pdf_sources.is_empty() {
        return Err(ExportError::NoSources);
    }

    let mut sources = Vec::with_capacity(state.original_pdf_sources.len());
    for bytes in &state.original_pdf_sources {
        sources.push(backend.load(bytes)?);
    }
    let output = backend.create()?;

    let regular = backend.embed_font(output, StandardFont::Helvetica)?;
    // Bold falls back to regular rather than failing the whole export.
    let bold = match backend.embed_font(output, StandardFont::HelveticaBold) {
        Ok(font) => font,
        Err(err) => {
            warn!("bold font unavailable, using regular: {err}");
            regular
        }
    };
    let fonts = Fonts { regular, bold };

    for (order_index, page_id) in document.page_order.iter().enumerate() {
        let (source_index, page_index) = locate_source_page(state, page_id, order_index);
        let source = sources.get(source_index).copied().unwrap_or(sources[0]);
        let page = backend.copy_page(output, source, page_index)?;
        let (page_width, page_height) = backend.page_size(output, page)?;
        let page_size = Size::new(page_width, page_height);

        let canvas = canvas_size_for(state, page_id, page_size);
        let transform = element_transform(state, page_id);

        if let Some(data) = state.pages.get(page_id) {
            for highlight in &data.highlights {
                draw_highlight(backend, output, page, highlight, canvas, page_size, transform)?;
            }
            for underline in &data.underlines {
                draw_underline(backend, output, page, underline, canvas, page_size, transform)?;
            }
            for arrow in &data.arrows {
                draw_arrow(backend, output, page, arrow, canvas, page_size, transform)?;
            }
            for text in &data.texts {
                draw_text(backend, output, page, text, &fonts, canvas, page_size, transform)?;
            }
        }

        let footer_text = footer_text_for(state, page_id, order_index);
        if let Some(text) = footer_text {
            draw_footer(backend, output, page, &text, fonts.regular, page_size, state)?;
        }
    }

    Ok(backend.save(output)?)
}

struct Fonts {
    regular: FontHandle,
    bold: FontHandle,
}

/// Resolves which source page backs a document page. Pages without metrics
/// fall back to their position in the first source.
fn locate_source_page(state: &DocumentState, page_id: &PageId, order_index: usize) -> (usize, usize) {
    match state.page_metrics.get(page_id) {
        Some(metrics) => {
            let source_index = if metrics.source_index < state.original_pdf_sources.len() {
                metrics.source_index
            } else {
                warn!(
                    "page {} references missing source {}, using first",
                    page_id.as_str(),
                    metrics.source_index
                );
                0
            };
            (source_index, metrics.page_index)
        }
        None => (0, order_index),
    }
}

/// The canvas the element coordinates were authored against.
fn canvas_size_for(state: &DocumentState, page_id: &PageId, page: Size) -> Size {
    match state.coordinate_space {
        CoordinateSpace::Legacy612 => {
            let aspect = if page.width > 0.0 { page.height / page.width } else { 1.0 };
            Size::new(612.0, 612.0 * aspect)
        }
        CoordinateSpace::Pdf => match state.page_metrics.get(page_id) {
            Some(m) if m.width > 0.0 && m.height > 0.0 => Size::new(m.width, m.height),
            _ => page,
        },
    }
}

/// Viewport transform applies only once coordinates are in PDF space; in
/// the legacy space elements were never multiplied by it.
fn element_transform(state: &DocumentState, page_id: &PageId) -> Option<Matrix> {
    if state.coordinate_space != CoordinateSpace::Pdf {
        return None;
    }
    state
        .page_metrics
        .get(page_id)
        .and_then(|m| m.transform)
        .map(Matrix::from)
}

fn element_color(hex: &str, context: &str) -> Rgb {
    let rgb = hex_to_rgb(hex);
    if rgb.is_valid() {
        rgb
    } else {
        warn!("unparseable {context} color {hex:?}, using black");
        Rgb::BLACK
    }
}

fn map_rect(rect: Rect, canvas: Size, page: Size, transform: Option<&Matrix>) -> MappedRect {
    map_element_rect(rect, canvas, page, transform)
}

#[allow(clippy::too_many_arguments)]
fn draw_text<B: PdfBackend>(
    backend: &mut B,
    doc: DocumentHandle,
    page: pdf_overlay_backend::PageRef,
    text: &TextElement,
    fonts: &Fonts,
    canvas: Size,
    page_size: Size,
    transform: Option<Matrix>,
) -> Result<(), ExportError> {
    if text.content.is_empty() {
        return Ok(());
    }
    let mapped = map_rect(text.rect(), canvas, page_size, transform.as_ref());
    let font = if text.bold { fonts.bold } else { fonts.regular };
    let size = text.font_size * mapped.scale;
    let padding = TEXT_PADDING * mapped.scale;
    let color = element_color(&text.color, "text");

    let inner_width = mapped.width - 2.0 * padding;
    let mut y = mapped.y + mapped.height - padding - size;
    for line in text.content.lines() {
        let line_width = backend.text_width(font, line, size);
        let x = match text.text_align {
            TextAlign::Left | TextAlign::Justify => mapped.x + padding,
            TextAlign::Center => mapped.x + padding + (inner_width - line_width) / 2.0,
            TextAlign::Right => mapped.x + mapped.width - padding - line_width,
        };
        backend.draw_text(
            doc,
            page,
            &TextOp {
                text: line.to_owned(),
                x,
                y,
                size,
                font,
                color: color.into(),
            },
        )?;
        y -= size * 1.2;
    }
    Ok(())
}

fn draw_highlight<B: PdfBackend>(
    backend: &mut B,
    doc: DocumentHandle,
    page: pdf_overlay_backend::PageRef,
    highlight: &HighlightElement,
    canvas: Size,
    page_size: Size,
    transform: Option<Matrix>,
) -> Result<(), ExportError> {
    let mapped = map_rect(highlight.rect(), canvas, page_size, transform.as_ref());
    let (fill, border) = highlight_styles(highlight, mapped.scale);

    backend.draw_rect(
        doc,
        page,
        &RectOp {
            x: mapped.x,
            y: mapped.y,
            width: mapped.width,
            height: mapped.height,
            fill,
            border,
        },
    )?;
    Ok(())
}

fn draw_underline<B: PdfBackend>(
    backend: &mut B,
    doc: DocumentHandle,
    page: pdf_overlay_backend::PageRef,
    underline: &UnderlineElement,
    canvas: Size,
    page_size: Size,
    transform: Option<Matrix>,
) -> Result<(), ExportError> {
    let mapped = map_rect(underline.rect(), canvas, page_size, transform.as_ref());
    backend.draw_rect(
        doc,
        page,
        &RectOp {
            x: mapped.x,
            y: mapped.y,
            width: mapped.width,
            height: mapped.height.max(0.5),
            fill: Some(FillStyle {
                color: element_color(&underline.color, "underline").into(),
                opacity: 1.0,
            }),
            border: None,
        },
    )?;
    Ok(())
}

/// Paint styles for a highlight. Explicit fill and border settings win;
/// unset ones fall back to the legacy single color and opacity.
fn highlight_styles(
    highlight: &HighlightElement,
    scale: f32,
) -> (Option<FillStyle>, Option<StrokeStyle>) {
    let fill = (highlight.style != HighlightStyle::Border).then(|| {
        let hex = highlight.fill_color.as_deref().unwrap_or(&highlight.color);
        FillStyle {
            color: element_color(hex, "highlight fill").into(),
            opacity: highlight.fill_opacity.unwrap_or(highlight.opacity),
        }
    });
    let border = (highlight.style != HighlightStyle::Fill).then(|| {
        let hex = highlight.border_color.as_deref().unwrap_or(&highlight.color);
        StrokeStyle {
            color: element_color(hex, "highlight border").into(),
            opacity: highlight.border_opacity.unwrap_or(highlight.opacity),
            width: (highlight.border_width * scale).max(1.0),
        }
    });
    (fill, border)
}

/// Arrows render as a stroked shaft plus a filled triangular head, both
/// rotated about the shaft's left-center anchor.
fn draw_arrow<B: PdfBackend>(
    backend: &mut B,
    doc: DocumentHandle,
    page: pdf_overlay_backend::PageRef,
    arrow: &ArrowElement,
    canvas: Size,
    page_size: Size,
    transform: Option<Matrix>,
) -> Result<(), ExportError> {
    let mapped = map_rect(arrow.rect(), canvas, page_size, transform.as_ref());
    let color: (f32, f32, f32) = element_color(&arrow.color, "arrow").into();
    let stroke = (arrow.thickness * mapped.scale).max(1.0);
    let head = (stroke * 3.0)
        .max(mapped.height * 0.35)
        .min(mapped.width / 2.0);

    let cx = mapped.x;
    let cy = mapped.y + mapped.height / 2.0;
    // Angle is given in canvas orientation; page space has Y flipped.
    let angle = -arrow.angle;
    let rotate = |x: f32, y: f32| rotate_about(x, y, cx, cy, angle);

    let shaft_start = rotate(mapped.x, cy);
    let shaft_end = rotate(mapped.x + mapped.width - head, cy);
    backend.draw_path(
        doc,
        page,
        &PathOp {
            segments: vec![
                PathSeg::MoveTo { x: shaft_start.0, y: shaft_start.1 },
                PathSeg::LineTo { x: shaft_end.0, y: shaft_end.1 },
            ],
            fill: None,
            stroke: Some(StrokeStyle {
                color,
                opacity: 1.0,
                width: stroke,
            }),
        },
    )?;

    let tip = rotate(mapped.x + mapped.width, cy);
    let base_top = rotate(mapped.x + mapped.width - head, cy + head / 2.0);
    let base_bottom = rotate(mapped.x + mapped.width - head, cy - head / 2.0);
    backend.draw_path(
        doc,
        page,
        &PathOp {
            segments: vec![
                PathSeg::MoveTo { x: tip.0, y: tip.1 },
                PathSeg::LineTo { x: base_top.0, y: base_top.1 },
                PathSeg::LineTo { x: base_bottom.0, y: base_bottom.1 },
                PathSeg::Close,
            ],
            fill: Some(FillStyle { color, opacity: 1.0 }),
            stroke: None,
        },
    )?;
    Ok(())
}

/// Automatic numbering wins over the page's manual footer when enabled.
fn footer_text_for(state: &DocumentState, page_id: &PageId, order_index: usize) -> Option<String> {
    if state.pagination.enabled {
        let number = state.pagination.start_at + order_index as i32;
        return Some(number.to_string());
    }
    let footer = &state.pages.get(page_id)?.footer;
    if footer.is_empty() {
        return None;
    }
    let text = [footer.number.as_str(), footer.detail.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" - ");
    Some(text)
}

fn draw_footer<B: PdfBackend>(
    backend: &mut B,
    doc: DocumentHandle,
    page: pdf_overlay_backend::PageRef,
    text: &str,
    font: FontHandle,
    page_size: Size,
    state: &DocumentState,
) -> Result<(), ExportError> {
    let width = backend.text_width(font, text, FOOTER_FONT_SIZE);
    let (x, y) = match state.pagination.position {
        PaginationPosition::BottomCenter => ((page_size.width - width) / 2.0, FOOTER_MARGIN),
        PaginationPosition::BottomRight => {
            (page_size.width - width - FOOTER_MARGIN, FOOTER_MARGIN)
        }
        PaginationPosition::TopRight => (
            page_size.width - width - FOOTER_MARGIN,
            page_size.height - FOOTER_MARGIN - FOOTER_FONT_SIZE,
        ),
    };

    if state.pagination.background_box {
        let pad = 5.0;
        backend.draw_rect(
            doc,
            page,
            &RectOp {
                x: x - pad,
                y: y - pad,
                width: width + 2.0 * pad,
                height: FOOTER_FONT_SIZE + 2.0 * pad,
                fill: Some(FillStyle {
                    color: (1.0, 1.0, 1.0),
                    opacity: 1.0,
                }),
                border: None,
            },
        )?;
    }

    backend.draw_text(
        doc,
        page,
        &TextOp {
            text: text.to_owned(),
            x,
            y,
            size: FOOTER_FONT_SIZE,
            font,
            color: (0.0, 0.0, 0.0),
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentInfo, Footer, PageData, PageMetrics, Pagination};
    use std::collections::BTreeMap;

    fn state_without_sources() -> DocumentState {
        DocumentState {
            document: Some(DocumentInfo {
                name: "doc.pdf".to_owned(),
                created_at: "0".to_owned(),
                page_order: vec![PageId::from("page-1")],
            }),
            pages: BTreeMap::from([(PageId::from("page-1"), PageData::default())]),
            ..DocumentState::default()
        }
    }

    #[test]
    fn export_without_document_fails() {
        let mut backend = pdf_overlay_backend::LopdfBackend::new();
        let err = export_final_pdf(&mut backend, &DocumentState::default()).unwrap_err();
        assert!(matches!(err, ExportError::NoDocument));
    }

    #[test]
    fn export_without_sources_fails() {
        let mut backend = pdf_overlay_backend::LopdfBackend::new();
        let err = export_final_pdf(&mut backend, &state_without_sources()).unwrap_err();
        assert!(matches!(err, ExportError::NoSources));
    }

    #[test]
    fn pagination_overrides_manual_footer() {
        let mut state = state_without_sources();
        let page_id = PageId::from("page-1");
        state.pages.get_mut(&page_id).unwrap().footer = Footer {
            number: "iv".to_owned(),
            detail: "Preface".to_owned(),
        };
        assert_eq!(
            footer_text_for(&state, &page_id, 0),
            Some("iv - Preface".to_owned())
        );

        state.pagination = Pagination {
            enabled: true,
            start_at: 5,
            ..Pagination::default()
        };
        assert_eq!(footer_text_for(&state, &page_id, 2), Some("7".to_owned()));
    }

    #[test]
    fn empty_footer_renders_nothing() {
        let state = state_without_sources();
        assert_eq!(footer_text_for(&state, &PageId::from("page-1"), 0), None);
    }

    #[test]
    fn legacy_canvas_follows_page_aspect() {
        let mut state = state_without_sources();
        state.coordinate_space = CoordinateSpace::Legacy612;
        let canvas = canvas_size_for(&state, &PageId::from("page-1"), Size::new(400.0, 800.0));
        assert_eq!(canvas.width, 612.0);
        assert_eq!(canvas.height, 1224.0);
    }

    #[test]
    fn pdf_space_canvas_prefers_recorded_metrics() {
        let mut state = state_without_sources();
        state.coordinate_space = CoordinateSpace::Pdf;
        state.page_metrics.insert(
            PageId::from("page-1"),
            PageMetrics {
                width: 595.0,
                height: 842.0,
                page_index: 0,
                source_index: 0,
                transform: None,
            },
        );
        let canvas = canvas_size_for(&state, &PageId::from("page-1"), Size::new(612.0, 792.0));
        assert_eq!(canvas.width, 595.0);
        assert_eq!(canvas.height, 842.0);
    }

    #[test]
    fn highlight_border_opacity_falls_back_to_element_opacity() {
        use crate::element::{ElementId, HighlightElement};

        // A live highlight whose border settings were never customized.
        let mut highlight = HighlightElement {
            id: ElementId::from("highlight-1"),
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 50.0,
            color: "#ffff00".to_owned(),
            opacity: 0.3,
            fill_color: None,
            fill_opacity: None,
            border_color: None,
            border_opacity: None,
            style: HighlightStyle::Both,
            border_width: 2.0,
        };

        let (fill, border) = highlight_styles(&highlight, 1.0);
        assert_eq!(fill.expect("fill present").opacity, 0.3);
        assert_eq!(border.expect("border present").opacity, 0.3);

        highlight.border_opacity = Some(0.8);
        let (_, border) = highlight_styles(&highlight, 1.0);
        assert_eq!(border.expect("border present").opacity, 0.8);
    }

    #[test]
    fn transform_ignored_outside_pdf_space() {
        let mut state = state_without_sources();
        state.page_metrics.insert(
            PageId::from("page-1"),
            PageMetrics {
                width: 612.0,
                height: 792.0,
                page_index: 0,
                source_index: 0,
                transform: Some([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
            },
        );
        state.coordinate_space = CoordinateSpace::Legacy612;
        assert!(element_transform(&state, &PageId::from("page-1")).is_none());
        state.coordinate_space = CoordinateSpace::Pdf;
        assert!(element_transform(&state, &PageId::from("page-1")).is_some());
    }
}
