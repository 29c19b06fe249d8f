//! Turning raw PDF bytes into editable document state.

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use thiserror::Error;

use pdf_overlay_backend::{probe_page_sizes, PdfBackendError};

use crate::document::{
    CoordinateSpace, DocumentInfo, DocumentState, PageData, PageId, PageMetrics,
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("pdf contains no pages")]
    EmptyDocument,
    #[error(transparent)]
    Backend(#[from] PdfBackendError),
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_owned())
}

fn register_pages(
    state: &mut DocumentState,
    sizes: &[(f32, f32)],
    source_index: usize,
) -> Vec<PageId> {
    let mut page_ids = Vec::with_capacity(sizes.len());
    for (page_index, &(width, height)) in sizes.iter().enumerate() {
        let page_id = PageId::generate();
        state.pages.insert(page_id.clone(), PageData::default());
        state.page_metrics.insert(
            page_id.clone(),
            PageMetrics {
                width,
                height,
                page_index,
                source_index,
                transform: None,
            },
        );
        page_ids.push(page_id);
    }
    page_ids
}

/// Builds a fresh document from a PDF. New documents always start out in
/// PDF point coordinates; only saved sessions can be in the legacy space.
pub fn import_pdf(name: &str, bytes: &[u8]) -> Result<DocumentState, ImportError> {
    let sizes = probe_page_sizes(bytes)?;
    if sizes.is_empty() {
        return Err(ImportError::EmptyDocument);
    }

    let mut state = DocumentState {
        coordinate_space: CoordinateSpace::Pdf,
        original_pdf_sources: vec![bytes.to_vec()],
        ..DocumentState::default()
    };
    let page_order = register_pages(&mut state, &sizes, 0);
    state.document = Some(DocumentInfo {
        name: name.to_owned(),
        created_at: unix_timestamp(),
        page_order,
    });
    info!("imported {name}: {} pages", sizes.len());
    Ok(state)
}

/// Appends every page of another PDF to the end of an open document. The
/// new file becomes an additional source; existing pages are untouched.
pub fn merge_pdf(state: &mut DocumentState, bytes: &[u8]) -> Result<Vec<PageId>, ImportError> {
    let sizes = probe_page_sizes(bytes)?;
    if sizes.is_empty() {
        return Err(ImportError::EmptyDocument);
    }

    let source_index = state.original_pdf_sources.len();
    state.original_pdf_sources.push(bytes.to_vec());
    let page_ids = register_pages(state, &sizes, source_index);
    match &mut state.document {
        Some(doc) => doc.page_order.extend(page_ids.iter().cloned()),
        None => {
            state.document = Some(DocumentInfo {
                name: "merged.pdf".to_owned(),
                created_at: unix_timestamp(),
                page_order: page_ids.clone(),
            });
        }
    }
    info!("merged source {source_index}: {} pages", sizes.len());
    Ok(page_ids)
}

/// Suggested file name for the exported copy of `name`.
pub fn export_file_name(name: &str) -> String {
    let stem = name.strip_suffix(".pdf").unwrap_or(name);
    format!("{stem}-edited.pdf")
}
