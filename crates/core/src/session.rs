//! Editing session: document state plus selection, current page, and a
//! bounded undo history.

use std::collections::VecDeque;

use log::debug;

use crate::document::{DocumentState, PageData, PageId, PaginationPatch};
use crate::element::{
    ArrowElement, ElementId, ElementPatch, HighlightElement, TextElement, UnderlineElement,
};

/// Snapshots retained for undo. Oldest entries are dropped past this.
pub const UNDO_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
struct UndoSnapshot {
    state: DocumentState,
    current_page: Option<PageId>,
}

/// One open document with its transient editing context.
#[derive(Debug, Default)]
pub struct EditorSession {
    state: DocumentState,
    current_page: Option<PageId>,
    selected: Option<ElementId>,
    undo_stack: VecDeque<UndoSnapshot>,
}

impl EditorSession {
    pub fn new(state: DocumentState) -> Self {
        let current_page = state.page_order().first().cloned();
        Self {
            state,
            current_page,
            selected: None,
            undo_stack: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn current_page(&self) -> Option<&PageId> {
        self.current_page.as_ref()
    }

    pub fn selected_element(&self) -> Option<&ElementId> {
        self.selected.as_ref()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Replaces everything, e.g. after restoring a saved session. History
    /// does not survive the swap.
    pub fn load_state(&mut self, state: DocumentState, current_page: Option<PageId>) {
        self.current_page = current_page
            .filter(|id| state.pages.contains_key(id))
            .or_else(|| state.page_order().first().cloned());
        self.state = state;
        self.selected = None;
        self.undo_stack.clear();
    }

    fn push_undo(&mut self) {
        if self.undo_stack.len() == UNDO_CAPACITY {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(UndoSnapshot {
            state: self.state.clone(),
            current_page: self.current_page.clone(),
        });
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.undo_stack.pop_back() else {
            return false;
        };
        self.state = snapshot.state;
        self.current_page = snapshot
            .current_page
            .filter(|id| self.state.pages.contains_key(id))
            .or_else(|| self.state.page_order().first().cloned());
        if let Some(selected) = &self.selected {
            if self.state.find_element(selected).is_none() {
                self.selected = None;
            }
        }
        true
    }

    // ---- passive context changes (no history) ----

    pub fn set_current_page(&mut self, page_id: Option<PageId>) {
        self.current_page = page_id.filter(|id| self.state.pages.contains_key(id));
    }

    pub fn select_element(&mut self, id: Option<ElementId>) {
        self.selected = id.filter(|id| self.state.find_element(id).is_some());
    }

    // ---- element creation ----

    pub fn add_text_element(&mut self, page_id: &PageId, x: f32, y: f32) -> Option<ElementId> {
        self.add_to_page(page_id, |page| {
            let element = TextElement {
                id: ElementId::generate("text"),
                x,
                y,
                width: 200.0,
                height: 40.0,
                content: "New Text".to_owned(),
                font_size: 16.0,
                color: "#000000".to_owned(),
                bold: false,
                text_align: Default::default(),
            };
            let id = element.id.clone();
            page.texts.push(element);
            id
        })
    }

    pub fn add_highlight_element(&mut self, page_id: &PageId) -> Option<ElementId> {
        self.add_to_page(page_id, |page| {
            let element = HighlightElement {
                id: ElementId::generate("highlight"),
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
                style: Default::default(),
                border_width: 2.0,
            };
            let id = element.id.clone();
            page.highlights.push(element);
            id
        })
    }

    pub fn add_underline_element(&mut self, page_id: &PageId) -> Option<ElementId> {
        self.add_to_page(page_id, |page| {
            let element = UnderlineElement {
                id: ElementId::generate("underline"),
                x: 100.0,
                y: 200.0,
                width: 200.0,
                height: 2.0,
                color: "#000000".to_owned(),
            };
            let id = element.id.clone();
            page.underlines.push(element);
            id
        })
    }

    pub fn add_arrow_element(&mut self, page_id: &PageId) -> Option<ElementId> {
        self.add_to_page(page_id, |page| {
            let element = ArrowElement {
                id: ElementId::generate("arrow"),
                x: 100.0,
                y: 150.0,
                width: 150.0,
                height: 20.0,
                color: "#000000".to_owned(),
                thickness: 2.0,
                angle: 0.0,
            };
            let id = element.id.clone();
            page.arrows.push(element);
            id
        })
    }

    fn add_to_page<F>(&mut self, page_id: &PageId, insert: F) -> Option<ElementId>
    where
        F: FnOnce(&mut PageData) -> ElementId,
    {
        if !self.state.pages.contains_key(page_id) {
            debug!("ignoring element insert on unknown page {}", page_id.as_str());
            return None;
        }
        self.push_undo();
        let page = self.state.pages.get_mut(page_id)?;
        let id = insert(page);
        self.selected = Some(id.clone());
        Some(id)
    }

    // ---- element mutation ----

    pub fn update_element(&mut self, id: &ElementId, patch: &ElementPatch) -> bool {
        self.update_elements(std::slice::from_ref(&(id.clone(), patch.clone())))
    }

    /// Applies several patches as one undo step. Ids with no matching
    /// element are skipped; if none match, nothing happens at all.
    pub fn update_elements(&mut self, updates: &[(ElementId, ElementPatch)]) -> bool {
        let any_match = updates
            .iter()
            .any(|(id, _)| self.state.find_element(id).is_some());
        if !any_match {
            return false;
        }
        self.push_undo();
        for (id, patch) in updates {
            for page in self.state.pages.values_mut() {
                if let Some(el) = page.texts.iter_mut().find(|el| &el.id == id) {
                    el.apply_patch(patch);
                } else if let Some(el) = page.highlights.iter_mut().find(|el| &el.id == id) {
                    el.apply_patch(patch);
                } else if let Some(el) = page.underlines.iter_mut().find(|el| &el.id == id) {
                    el.apply_patch(patch);
                } else if let Some(el) = page.arrows.iter_mut().find(|el| &el.id == id) {
                    el.apply_patch(patch);
                }
            }
        }
        true
    }

    pub fn delete_element(&mut self, id: &ElementId) -> bool {
        self.delete_elements(std::slice::from_ref(id))
    }

    pub fn delete_elements(&mut self, ids: &[ElementId]) -> bool {
        let any_match = ids.iter().any(|id| self.state.find_element(id).is_some());
        if !any_match {
            return false;
        }
        self.push_undo();
        for page in self.state.pages.values_mut() {
            page.texts.retain(|el| !ids.contains(&el.id));
            page.highlights.retain(|el| !ids.contains(&el.id));
            page.underlines.retain(|el| !ids.contains(&el.id));
            page.arrows.retain(|el| !ids.contains(&el.id));
        }
        if let Some(selected) = &self.selected {
            if ids.contains(selected) {
                self.selected = None;
            }
        }
        true
    }

    // ---- page operations ----

    /// Deep-copies a page directly after the original. Cloned elements get
    /// fresh ids so they stay independently addressable.
    pub fn duplicate_page(&mut self, page_id: &PageId) -> Option<PageId> {
        let position = self
            .state
            .page_order()
            .iter()
            .position(|id| id == page_id)?;
        let source = self.state.pages.get(page_id)?.clone();
        self.push_undo();

        let mut copy = source;
        for el in &mut copy.texts {
            el.id = ElementId::generate("text");
        }
        for el in &mut copy.highlights {
            el.id = ElementId::generate("highlight");
        }
        for el in &mut copy.underlines {
            el.id = ElementId::generate("underline");
        }
        for el in &mut copy.arrows {
            el.id = ElementId::generate("arrow");
        }

        let new_id = PageId::generate();
        if let Some(metrics) = self.state.page_metrics.get(page_id).cloned() {
            self.state.page_metrics.insert(new_id.clone(), metrics);
        }
        self.state.pages.insert(new_id.clone(), copy);
        if let Some(doc) = &mut self.state.document {
            doc.page_order.insert(position + 1, new_id.clone());
        }
        self.current_page = Some(new_id.clone());
        Some(new_id)
    }

    /// Removes a page. The last remaining page cannot be deleted.
    pub fn delete_page(&mut self, page_id: &PageId) -> bool {
        let order = self.state.page_order();
        if order.len() <= 1 {
            return false;
        }
        let Some(position) = order.iter().position(|id| id == page_id) else {
            return false;
        };
        self.push_undo();

        self.state.pages.remove(page_id);
        self.state.page_metrics.remove(page_id);
        if let Some(doc) = &mut self.state.document {
            doc.page_order.remove(position);
        }

        if self.current_page.as_ref() == Some(page_id) {
            let order = self.state.page_order();
            self.current_page = order
                .get(position)
                .or_else(|| order.get(position.saturating_sub(1)))
                .cloned();
        }
        if let Some(selected) = &self.selected {
            if self.state.find_element(selected).is_none() {
                self.selected = None;
            }
        }
        true
    }

    /// Moves the dragged page to the target page's position in the reading
    /// order. Unknown ids and dropping a page onto itself are no-ops.
    pub fn reorder_pages(&mut self, dragged: &PageId, target: &PageId) -> bool {
        let order = self.state.page_order();
        let Some(from) = order.iter().position(|id| id == dragged) else {
            return false;
        };
        let Some(to) = order.iter().position(|id| id == target) else {
            return false;
        };
        if from == to {
            return false;
        }
        self.push_undo();
        if let Some(doc) = &mut self.state.document {
            let id = doc.page_order.remove(from);
            doc.page_order.insert(to, id);
        }
        true
    }

    // ---- pagination and footers ----

    pub fn set_pagination(&mut self, patch: &PaginationPatch) {
        self.push_undo();
        self.state.pagination.apply_patch(patch);
    }

    pub fn set_footer(&mut self, page_id: &PageId, number: String, detail: String) -> bool {
        if !self.state.pages.contains_key(page_id) {
            return false;
        }
        self.push_undo();
        if let Some(page) = self.state.pages.get_mut(page_id) {
            page.footer.number = number;
            page.footer.detail = detail;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentInfo, PageMetrics};

    fn session_with_pages(n: usize) -> EditorSession {
        let mut state = DocumentState::default();
        let mut order = Vec::new();
        for i in 0..n {
            let id = PageId::from(format!("page-{i}").as_str());
            state.pages.insert(id.clone(), PageData::default());
            state.page_metrics.insert(
                id.clone(),
                PageMetrics {
                    width: 612.0,
                    height: 792.0,
                    page_index: i,
                    source_index: 0,
                    transform: None,
                },
            );
            order.push(id);
        }
        state.document = Some(DocumentInfo {
            name: "doc.pdf".to_owned(),
            created_at: "0".to_owned(),
            page_order: order,
        });
        EditorSession::new(state)
    }

    #[test]
    fn add_text_selects_and_records_undo() {
        let mut session = session_with_pages(1);
        let page = PageId::from("page-0");
        let id = session.add_text_element(&page, 10.0, 20.0).expect("page exists");
        assert_eq!(session.selected_element(), Some(&id));
        assert_eq!(session.undo_depth(), 1);
        assert_eq!(session.state().pages[&page].texts.len(), 1);

        assert!(session.undo());
        assert!(session.state().pages[&page].texts.is_empty());
        assert_eq!(session.selected_element(), None);
    }

    #[test]
    fn add_to_unknown_page_is_a_noop() {
        let mut session = session_with_pages(1);
        assert!(session.add_text_element(&PageId::from("missing"), 0.0, 0.0).is_none());
        assert_eq!(session.undo_depth(), 0);
    }

    #[test]
    fn update_without_any_match_pushes_no_undo() {
        let mut session = session_with_pages(1);
        let page = PageId::from("page-0");
        session.add_text_element(&page, 3.0, 4.0);
        let before = session.state().clone();
        let depth = session.undo_depth();

        let changed = session.update_element(
            &ElementId::from("text-nope"),
            &ElementPatch {
                x: Some(5.0),
                ..ElementPatch::default()
            },
        );
        assert!(!changed);
        assert_eq!(session.undo_depth(), depth);
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn batch_update_is_one_undo_step() {
        let mut session = session_with_pages(1);
        let page = PageId::from("page-0");
        let a = session.add_text_element(&page, 0.0, 0.0).unwrap();
        let b = session.add_text_element(&page, 0.0, 0.0).unwrap();
        let depth = session.undo_depth();

        let patch = ElementPatch {
            bold: Some(true),
            ..ElementPatch::default()
        };
        assert!(session.update_elements(&[(a, patch.clone()), (b, patch)]));
        assert_eq!(session.undo_depth(), depth + 1);
        assert!(session.state().pages[&page].texts.iter().all(|t| t.bold));

        session.undo();
        assert!(session.state().pages[&page].texts.iter().all(|t| !t.bold));
    }

    #[test]
    fn undo_history_is_bounded() {
        let mut session = session_with_pages(1);
        let page = PageId::from("page-0");
        for _ in 0..(UNDO_CAPACITY + 5) {
            session.add_text_element(&page, 0.0, 0.0);
        }
        assert_eq!(session.undo_depth(), UNDO_CAPACITY);
    }

    #[test]
    fn delete_clears_selection() {
        let mut session = session_with_pages(1);
        let page = PageId::from("page-0");
        let id = session.add_highlight_element(&page).unwrap();
        assert!(session.delete_element(&id));
        assert_eq!(session.selected_element(), None);
        assert!(session.state().pages[&page].highlights.is_empty());
    }

    #[test]
    fn duplicate_page_regenerates_element_ids() {
        let mut session = session_with_pages(2);
        let page = PageId::from("page-0");
        let original_id = session.add_text_element(&page, 1.0, 2.0).unwrap();

        let copy = session.duplicate_page(&page).expect("page exists");
        assert_eq!(session.state().page_order()[1], copy);
        let copied_text = &session.state().pages[&copy].texts[0];
        assert_ne!(copied_text.id, original_id);
        assert_eq!(copied_text.x, 1.0);
        assert!(session.state().page_metrics.contains_key(&copy));
    }

    #[test]
    fn last_page_cannot_be_deleted() {
        let mut session = session_with_pages(1);
        assert!(!session.delete_page(&PageId::from("page-0")));
        assert_eq!(session.undo_depth(), 0);
    }

    #[test]
    fn delete_page_moves_current_to_neighbor() {
        let mut session = session_with_pages(3);
        session.set_current_page(Some(PageId::from("page-2")));
        assert!(session.delete_page(&PageId::from("page-2")));
        assert_eq!(session.current_page(), Some(&PageId::from("page-1")));
    }

    #[test]
    fn reorder_to_same_position_is_a_noop() {
        let mut session = session_with_pages(3);
        assert!(!session.reorder_pages(&PageId::from("page-1"), &PageId::from("page-1")));
        assert!(!session.reorder_pages(&PageId::from("page-0"), &PageId::from("missing")));
        assert_eq!(session.undo_depth(), 0);

        assert!(session.reorder_pages(&PageId::from("page-0"), &PageId::from("page-2")));
        let order: Vec<_> = session
            .state()
            .page_order()
            .iter()
            .map(|id| id.as_str().to_owned())
            .collect();
        assert_eq!(order, ["page-1", "page-2", "page-0"]);
    }

    #[test]
    fn undo_after_page_delete_restores_page_and_current() {
        let mut session = session_with_pages(2);
        session.set_current_page(Some(PageId::from("page-1")));
        session.delete_page(&PageId::from("page-1"));
        assert!(session.undo());
        assert_eq!(session.state().page_order().len(), 2);
        assert_eq!(session.current_page(), Some(&PageId::from("page-1")));
    }
}
