//! Core editing model for the PDF overlay editor.
//!
//! The crate owns everything between raw PDF bytes and the final exported
//! file: coordinate mapping ([`geometry`]), the overlay element and page
//! model ([`element`], [`document`]), session editing with undo
//! ([`session`]), JSON persistence and schema migration ([`serialize`]),
//! PDF import ([`loader`]), and the export pipeline ([`export`]). Actual
//! PDF manipulation is delegated to the `pdf-overlay-backend` crate.

pub mod document;
pub mod element;
pub mod export;
pub mod geometry;
pub mod loader;
pub mod serialize;
pub mod session;

pub use document::{
    CoordinateSpace, DocumentInfo, DocumentState, Footer, PageData, PageId, PageMetrics,
    Pagination, PaginationPatch, PaginationPosition,
};
pub use element::{
    ArrowElement, ElementId, ElementPatch, ElementRef, HighlightElement, HighlightStyle,
    TextAlign, TextElement, UnderlineElement,
};
pub use export::{export_final_pdf, ExportError};
pub use loader::{export_file_name, import_pdf, merge_pdf, ImportError};
pub use serialize::{migrate_coordinates, RestoredState};
pub use session::{EditorSession, UNDO_CAPACITY};

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};

    /// Build a one-page PDF with the given media box entirely in memory.
    pub(crate) fn single_page_pdf(width: f32, height: f32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let content = Content {
            operations: vec![Operation::new("BT", vec![]), Operation::new("ET", vec![])],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode should succeed"),
        ));

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ]),
            ),
        ]));

        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page_id)])),
                ("Count", Object::Integer(1)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save should succeed");
        bytes
    }
}
