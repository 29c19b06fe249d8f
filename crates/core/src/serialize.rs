//! Session persistence: JSON save/restore with schema normalization and
//! the one-time migration from legacy canvas coordinates to PDF points.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::document::{CoordinateSpace, DocumentState, PageId};

/// Width of the fixed editor layout older documents were authored against,
/// in canvas pixels.
pub const LEGACY_CANVAS_WIDTH: f32 = 612.0;

/// Serde adapter storing `Vec<Vec<u8>>` as an array of base64 strings.
pub(crate) mod base64_vec {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(buffers: &[Vec<u8>], ser: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = buffers.iter().map(|b| BASE64.encode(b)).collect();
        encoded.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(de)?;
        encoded
            .iter()
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Serde adapter storing `Option<Vec<u8>>` as an optional base64 string.
pub(crate) mod base64_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(buffer: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        buffer.as_ref().map(|b| BASE64.encode(b)).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(de)? {
            Some(s) => BASE64.decode(s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// On-disk envelope around the document state: the editing context rides
/// along so a restore can land on the same page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedSession {
    #[serde(flatten)]
    state: DocumentState,
    #[serde(default)]
    current_page_id: Option<PageId>,
}

/// State restored from a saved session.
#[derive(Debug, Clone)]
pub struct RestoredState {
    pub state: DocumentState,
    pub current_page: Option<PageId>,
}

pub fn serialize(state: &DocumentState, current_page: Option<&PageId>) -> String {
    let session = SavedSession {
        state: state.clone(),
        current_page_id: current_page.cloned(),
    };
    // DocumentState serialization is infallible: no maps with non-string
    // keys, no non-finite float fields are ever written by the session ops.
    serde_json::to_string_pretty(&session).unwrap_or_else(|err| {
        warn!("failed to serialize session: {err}");
        String::from("{}")
    })
}

/// Parses a saved session. Malformed input yields `None` rather than an
/// error so callers can fall back to a fresh document.
pub fn deserialize(text: &str) -> Option<RestoredState> {
    let mut session: SavedSession = match serde_json::from_str(text) {
        Ok(session) => session,
        Err(err) => {
            warn!("discarding unreadable saved session: {err}");
            return None;
        }
    };
    normalize(&mut session.state);
    migrate_coordinates(&mut session.state);
    Some(RestoredState {
        state: session.state,
        current_page: session.current_page_id,
    })
}

/// Backfills fields that older schema revisions did not have.
fn normalize(state: &mut DocumentState) {
    for page in state.pages.values_mut() {
        for highlight in &mut page.highlights {
            if highlight.fill_color.is_none() {
                highlight.fill_color = Some(highlight.color.clone());
            }
            if highlight.fill_opacity.is_none() {
                highlight.fill_opacity = Some(highlight.opacity);
            }
            if highlight.border_color.is_none() {
                highlight.border_color = Some(highlight.color.clone());
            }
            if highlight.border_opacity.is_none() {
                highlight.border_opacity = Some(1.0);
            }
        }
    }

    // Manual footer text used to live on the pagination settings keyed by
    // page id. Move it onto the pages themselves.
    let manual_number = std::mem::take(&mut state.pagination.manual_number);
    let manual_detail = std::mem::take(&mut state.pagination.manual_detail);
    for (page_id, number) in manual_number {
        if let Some(page) = state.pages.get_mut(&page_id) {
            if page.footer.number.is_empty() {
                page.footer.number = number;
            }
        }
    }
    for (page_id, detail) in manual_detail {
        if let Some(page) = state.pages.get_mut(&page_id) {
            if page.footer.detail.is_empty() {
                page.footer.detail = detail;
            }
        }
    }

    // Single-source documents predate the sources list.
    if state.original_pdf_sources.is_empty() {
        if let Some(bytes) = state.original_pdf_bytes.take() {
            state.original_pdf_sources.push(bytes);
        }
    } else {
        state.original_pdf_bytes = None;
    }
}

/// Rescales legacy canvas-pixel coordinates into PDF points.
///
/// Runs only when the document is still tagged `legacy-612` and every page
/// in the reading order has usable metrics; a partial rescale would leave
/// coordinates in two different spaces, so incomplete metrics skip the
/// migration entirely and leave the tag untouched.
pub fn migrate_coordinates(state: &mut DocumentState) {
    if state.coordinate_space != CoordinateSpace::Legacy612 {
        return;
    }
    let order: Vec<PageId> = state.page_order().to_vec();
    if order.is_empty() {
        return;
    }
    let complete = order.iter().all(|id| {
        state
            .page_metrics
            .get(id)
            .map(|m| m.width > 0.0 && m.height > 0.0)
            .unwrap_or(false)
    });
    if !complete {
        warn!("page metrics incomplete, keeping legacy coordinate space");
        return;
    }

    for page_id in &order {
        let scale = state.page_metrics[page_id].width / LEGACY_CANVAS_WIDTH;
        let Some(page) = state.pages.get_mut(page_id) else {
            continue;
        };
        for el in &mut page.texts {
            el.x *= scale;
            el.y *= scale;
            el.width *= scale;
            el.height *= scale;
            el.font_size *= scale;
        }
        for el in &mut page.highlights {
            el.x *= scale;
            el.y *= scale;
            el.width *= scale;
            el.height *= scale;
            el.border_width *= scale;
        }
        for el in &mut page.underlines {
            el.x *= scale;
            el.y *= scale;
            el.width *= scale;
            el.height *= scale;
        }
        for el in &mut page.arrows {
            el.x *= scale;
            el.y *= scale;
            el.width *= scale;
            el.height *= scale;
            el.thickness *= scale;
        }
    }
    state.coordinate_space = CoordinateSpace::Pdf;
    info!("migrated {} pages to pdf coordinate space", order.len());
}
