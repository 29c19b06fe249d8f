//! PDF document capability for the overlay editor.
//!
//! Exposes a handle-based [`PdfBackend`] trait covering exactly what the
//! export pipeline needs: load source documents, create a fresh output
//! document, copy single pages between documents, and draw text, rectangles,
//! and vector paths on top of the copied content. The default implementation
//! is backed by lopdf and never mutates a source document.

use log::warn;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

pub mod fonts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A page inside a document, identified by its zero-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef(usize);

impl PageRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The standard font families the overlay renderer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    fn base_name(self) -> &'static [u8] {
        match self {
            StandardFont::Helvetica => b"Helvetica",
            StandardFont::HelveticaBold => b"Helvetica-Bold",
        }
    }

    fn resource_name(self) -> &'static str {
        // Prefixed so they cannot collide with font names already present
        // in copied page resources.
        match self {
            StandardFont::Helvetica => "OV1",
            StandardFont::HelveticaBold => "OV2",
        }
    }
}

/// An embedded font usable for drawing and width measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontHandle {
    doc: DocumentHandle,
    font: StandardFont,
}

impl FontHandle {
    pub fn font(self) -> StandardFont {
        self.font
    }
}

/// Normalized RGB color, each channel in `[0, 1]`.
pub type Rgb = (f32, f32, f32);

#[derive(Debug, Clone)]
pub struct TextOp {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub font: FontHandle,
    pub color: Rgb,
}

/// Fill component of a rectangle or path.
#[derive(Debug, Clone, Copy)]
pub struct FillStyle {
    pub color: Rgb,
    pub opacity: f32,
}

/// Stroke component of a rectangle or path.
#[derive(Debug, Clone, Copy)]
pub struct StrokeStyle {
    pub color: Rgb,
    pub opacity: f32,
    pub width: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RectOp {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: Option<FillStyle>,
    pub border: Option<StrokeStyle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSeg {
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    Close,
}

#[derive(Debug, Clone)]
pub struct PathOp {
    pub segments: Vec<PathSeg>,
    pub fill: Option<FillStyle>,
    pub stroke: Option<StrokeStyle>,
}

#[derive(Debug, thiserror::Error)]
pub enum PdfBackendError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid document handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("font {0:?} has not been embedded in this document")]
    FontNotEmbedded(StandardFont),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The external PDF document capability.
///
/// All methods operate on handles so implementations can own their document
/// state; `copy_page` reads the source and writes only the destination.
pub trait PdfBackend {
    fn load(&mut self, bytes: &[u8]) -> Result<DocumentHandle, PdfBackendError>;
    fn create(&mut self) -> Result<DocumentHandle, PdfBackendError>;
    fn page_count(&self, doc: DocumentHandle) -> Result<usize, PdfBackendError>;
    /// Copy one page from `src` and append it to `dest`.
    fn copy_page(
        &mut self,
        dest: DocumentHandle,
        src: DocumentHandle,
        page_index: usize,
    ) -> Result<PageRef, PdfBackendError>;
    fn page_size(&self, doc: DocumentHandle, page: PageRef) -> Result<(f32, f32), PdfBackendError>;
    fn embed_font(
        &mut self,
        doc: DocumentHandle,
        font: StandardFont,
    ) -> Result<FontHandle, PdfBackendError>;
    /// Single-line width of `text` at `size` points.
    fn text_width(&self, font: FontHandle, text: &str, size: f32) -> f32;
    fn draw_text(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &TextOp,
    ) -> Result<(), PdfBackendError>;
    fn draw_rect(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &RectOp,
    ) -> Result<(), PdfBackendError>;
    fn draw_path(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &PathOp,
    ) -> Result<(), PdfBackendError>;
    fn save(&mut self, doc: DocumentHandle) -> Result<Vec<u8>, PdfBackendError>;
}

/// Probe the page sizes of a PDF without keeping the document open.
///
/// Returns `(width, height)` in points per page, falling back to US Letter
/// when a page carries no resolvable MediaBox.
pub fn probe_page_sizes(bytes: &[u8]) -> Result<Vec<(f32, f32)>, PdfBackendError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfBackendError::EncryptedUnsupported);
    }

    let doc = Document::load_mem(bytes)?;
    let pages = doc.get_pages();
    let mut sizes = Vec::with_capacity(pages.len());

    for (number, object_id) in pages {
        sizes.push(media_box_size(&doc, object_id).unwrap_or_else(|| {
            warn!("page {number} has no resolvable MediaBox, assuming US Letter");
            (612.0, 792.0)
        }));
    }

    if sizes.is_empty() {
        return Err(PdfBackendError::Backend("document has no pages".to_owned()));
    }

    Ok(sizes)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    if let Object::Reference(id) = obj {
        doc.get_object(*id).unwrap_or(obj)
    } else {
        obj
    }
}

/// Look up a page attribute, walking the Parent chain for inheritable keys.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    loop {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
}

fn media_box_size(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let media_box = inherited(doc, page_id, b"MediaBox")?;
    let media_box = resolve(doc, &media_box);
    let array = media_box.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    Some(((x1 - x0).abs(), (y1 - y0).abs()))
}

#[derive(Debug)]
struct DocumentRecord {
    doc: Document,
    /// Page object ids in display order.
    pages: Vec<ObjectId>,
    /// Root Pages node, when known (always known for created documents).
    pages_root: Option<ObjectId>,
    fonts: HashMap<StandardFont, ObjectId>,
    /// ExtGState objects keyed by (fill alpha, stroke alpha) in thousandths.
    gstates: HashMap<(u16, u16), (String, ObjectId)>,
    next_gstate: u32,
}

#[derive(Debug, Default)]
pub struct LopdfBackend {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfBackendError> {
        self.docs.get(&handle).ok_or(PdfBackendError::InvalidHandle(handle.raw()))
    }

    fn record_mut(
        &mut self,
        handle: DocumentHandle,
    ) -> Result<&mut DocumentRecord, PdfBackendError> {
        self.docs.get_mut(&handle).ok_or(PdfBackendError::InvalidHandle(handle.raw()))
    }

    fn insert(&mut self, record: DocumentRecord) -> DocumentHandle {
        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, record);
        handle
    }

    fn page_object(
        record: &DocumentRecord,
        page: PageRef,
    ) -> Result<ObjectId, PdfBackendError> {
        record.pages.get(page.index()).copied().ok_or(PdfBackendError::PageOutOfRange {
            page: page.index(),
            page_count: record.pages.len(),
        })
    }

    fn ensure_gstate(
        record: &mut DocumentRecord,
        fill_alpha: f32,
        stroke_alpha: f32,
    ) -> (String, ObjectId) {
        let key = (
            (fill_alpha.clamp(0.0, 1.0) * 1000.0).round() as u16,
            (stroke_alpha.clamp(0.0, 1.0) * 1000.0).round() as u16,
        );
        if let Some(entry) = record.gstates.get(&key) {
            return entry.clone();
        }

        record.next_gstate += 1;
        let name = format!("OVGS{}", record.next_gstate);
        let id = record.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"ExtGState".to_vec())),
            ("ca", Object::Real(fill_alpha.clamp(0.0, 1.0))),
            ("CA", Object::Real(stroke_alpha.clamp(0.0, 1.0))),
        ]));
        record.gstates.insert(key, (name.clone(), id));
        (name, id)
    }

    fn append_content(
        doc: &mut Document,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), PdfBackendError> {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|err| PdfBackendError::Backend(format!("content encode failed: {err}")))?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let existing = {
            let page = doc.get_dictionary(page_id)?;
            page.get(b"Contents").ok().cloned()
        };
        let contents = match existing {
            Some(Object::Array(mut streams)) => {
                streams.push(Object::Reference(stream_id));
                Object::Array(streams)
            }
            Some(Object::Reference(first)) => {
                Object::Array(vec![Object::Reference(first), Object::Reference(stream_id)])
            }
            _ => Object::Reference(stream_id),
        };

        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Contents", contents);
        Ok(())
    }

    /// Register `target` under `Resources/<category>/<name>` for a page,
    /// resolving indirect resource dictionaries along the way.
    fn add_resource(
        doc: &mut Document,
        page_id: ObjectId,
        category: &[u8],
        name: &str,
        target: ObjectId,
    ) -> Result<(), PdfBackendError> {
        let (location, mut resources) = {
            let page = doc.get_dictionary(page_id)?;
            match page.get(b"Resources") {
                Ok(Object::Reference(id)) => (Some(*id), doc.get_dictionary(*id)?.clone()),
                Ok(Object::Dictionary(dict)) => (None, dict.clone()),
                _ => (None, Dictionary::new()),
            }
        };

        let mut entries = match resources.get(category) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => {
                doc.get_dictionary(*id).map(|d| d.clone()).unwrap_or_else(|_| Dictionary::new())
            }
            _ => Dictionary::new(),
        };
        entries.set(name, Object::Reference(target));
        resources.set(category.to_vec(), Object::Dictionary(entries));

        match location {
            Some(id) => {
                doc.objects.insert(id, Object::Dictionary(resources));
            }
            None => {
                let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
                page.set("Resources", Object::Dictionary(resources));
            }
        }
        Ok(())
    }

    fn paint_operator(fill: bool, stroke: bool) -> &'static str {
        match (fill, stroke) {
            (true, true) => "B",
            (true, false) => "f",
            _ => "S",
        }
    }

    /// Prelude shared by rect and path drawing: graphics state isolation,
    /// opacity, colors, and line width.
    fn style_operations(
        record: &mut DocumentRecord,
        page_id: ObjectId,
        fill: Option<FillStyle>,
        stroke: Option<StrokeStyle>,
    ) -> Result<Vec<Operation>, PdfBackendError> {
        let mut ops = vec![Operation::new("q", vec![])];

        let fill_alpha = fill.map(|f| f.opacity).unwrap_or(1.0);
        let stroke_alpha = stroke.map(|s| s.opacity).unwrap_or(1.0);
        if fill_alpha < 1.0 || stroke_alpha < 1.0 {
            let (name, id) = Self::ensure_gstate(record, fill_alpha, stroke_alpha);
            Self::add_resource(&mut record.doc, page_id, b"ExtGState", &name, id)?;
            ops.push(Operation::new("gs", vec![Object::Name(name.into_bytes())]));
        }

        if let Some(fill) = fill {
            ops.push(Operation::new(
                "rg",
                vec![
                    Object::Real(fill.color.0),
                    Object::Real(fill.color.1),
                    Object::Real(fill.color.2),
                ],
            ));
        }
        if let Some(stroke) = stroke {
            ops.push(Operation::new(
                "RG",
                vec![
                    Object::Real(stroke.color.0),
                    Object::Real(stroke.color.1),
                    Object::Real(stroke.color.2),
                ],
            ));
            ops.push(Operation::new("w", vec![Object::Real(stroke.width)]));
        }

        Ok(ops)
    }
}

/// Recursively copy the object graph reachable from `src_id` into `dest`,
/// remapping references. The memo map doubles as cycle protection: a new id
/// is reserved before the object's children are visited.
fn deep_copy(
    src: &Document,
    src_id: ObjectId,
    dest: &mut Document,
    map: &mut HashMap<ObjectId, ObjectId>,
) -> Result<ObjectId, PdfBackendError> {
    if let Some(&copied) = map.get(&src_id) {
        return Ok(copied);
    }

    let new_id = dest.new_object_id();
    map.insert(src_id, new_id);

    let object = src.get_object(src_id)?.clone();
    let copied = remap_object(src, object, dest, map)?;
    dest.objects.insert(new_id, copied);
    Ok(new_id)
}

fn remap_object(
    src: &Document,
    object: Object,
    dest: &mut Document,
    map: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, PdfBackendError> {
    match object {
        Object::Reference(id) => Ok(Object::Reference(deep_copy(src, id, dest, map)?)),
        Object::Array(items) => {
            let mut remapped = Vec::with_capacity(items.len());
            for item in items {
                remapped.push(remap_object(src, item, dest, map)?);
            }
            Ok(Object::Array(remapped))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(remap_dictionary(src, dict, dest, map)?)),
        Object::Stream(stream) => {
            let dict = remap_dictionary(src, stream.dict.clone(), dest, map)?;
            let mut copied = Stream::new(dict, stream.content.clone());
            copied.allows_compression = stream.allows_compression;
            Ok(Object::Stream(copied))
        }
        other => Ok(other),
    }
}

fn remap_dictionary(
    src: &Document,
    dict: Dictionary,
    dest: &mut Document,
    map: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, PdfBackendError> {
    let mut remapped = Dictionary::new();
    for (key, value) in dict.iter() {
        remapped.set(key.clone(), remap_object(src, value.clone(), dest, map)?);
    }
    Ok(remapped)
}

/// Copy a single page dictionary (with inherited attributes made explicit)
/// and its reachable objects into the destination record.
fn copy_page_into(
    src: &Document,
    src_page_id: ObjectId,
    dest: &mut DocumentRecord,
) -> Result<PageRef, PdfBackendError> {
    let pages_root = dest.pages_root.ok_or_else(|| {
        PdfBackendError::Backend("destination document has no page tree".to_owned())
    })?;

    let mut page_dict = src.get_dictionary(src_page_id)?.clone();
    for key in [b"MediaBox".as_slice(), b"Resources", b"Rotate", b"CropBox"] {
        if page_dict.get(key).is_err() {
            if let Some(value) = inherited(src, src_page_id, key) {
                page_dict.set(key.to_vec(), value);
            }
        }
    }
    // The parent pointer would drag the whole source page tree along; link
    // annotations can reference pages outside the copied set the same way.
    page_dict.remove(b"Parent");
    page_dict.remove(b"Annots");

    let mut map = HashMap::new();
    let new_page_id = dest.doc.new_object_id();
    map.insert(src_page_id, new_page_id);

    let mut copied = remap_dictionary(src, page_dict, &mut dest.doc, &mut map)?;
    copied.set("Parent", Object::Reference(pages_root));

    // The source content may leave the graphics state unbalanced; bracket it
    // so overlays drawn later start from the default state.
    let push_id = dest.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let pop_id = dest.doc.add_object(Stream::new(Dictionary::new(), b"\nQ".to_vec()));
    let mut streams = match copied.remove(b"Contents") {
        Some(Object::Array(items)) => items,
        Some(reference) => vec![reference],
        None => Vec::new(),
    };
    let mut contents = Vec::with_capacity(streams.len() + 2);
    contents.push(Object::Reference(push_id));
    contents.append(&mut streams);
    contents.push(Object::Reference(pop_id));
    copied.set("Contents", Object::Array(contents));

    dest.doc.objects.insert(new_page_id, Object::Dictionary(copied));

    let root = dest.doc.get_object_mut(pages_root)?.as_dict_mut()?;
    match root.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => kids.push(Object::Reference(new_page_id)),
        _ => {
            return Err(PdfBackendError::Backend("page tree has no Kids array".to_owned()));
        }
    }
    dest.pages.push(new_page_id);
    let count = dest.pages.len() as i64;
    let root = dest.doc.get_object_mut(pages_root)?.as_dict_mut()?;
    root.set("Count", Object::Integer(count));

    Ok(PageRef(dest.pages.len() - 1))
}

fn pages_root_of(doc: &Document) -> Option<ObjectId> {
    let root = doc.trailer.get(b"Root").ok()?;
    let catalog = match root {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        _ => return None,
    };
    match catalog.get(b"Pages").ok()? {
        Object::Reference(id) => Some(*id),
        _ => None,
    }
}

impl PdfBackend for LopdfBackend {
    fn load(&mut self, bytes: &[u8]) -> Result<DocumentHandle, PdfBackendError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfBackendError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(PdfBackendError::Backend("document has no pages".to_owned()));
        }
        let pages_root = pages_root_of(&doc);

        Ok(self.insert(DocumentRecord {
            doc,
            pages,
            pages_root,
            fonts: HashMap::new(),
            gstates: HashMap::new(),
            next_gstate: 0,
        }))
    }

    fn create(&mut self) -> Result<DocumentHandle, PdfBackendError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(Vec::new())),
                ("Count", Object::Integer(0)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Ok(self.insert(DocumentRecord {
            doc,
            pages: Vec::new(),
            pages_root: Some(pages_id),
            fonts: HashMap::new(),
            gstates: HashMap::new(),
            next_gstate: 0,
        }))
    }

    fn page_count(&self, doc: DocumentHandle) -> Result<usize, PdfBackendError> {
        Ok(self.record(doc)?.pages.len())
    }

    fn copy_page(
        &mut self,
        dest: DocumentHandle,
        src: DocumentHandle,
        page_index: usize,
    ) -> Result<PageRef, PdfBackendError> {
        let mut dest_record = self
            .docs
            .remove(&dest)
            .ok_or(PdfBackendError::InvalidHandle(dest.raw()))?;

        let result = (|| {
            let src_record = self.record(src)?;
            let src_page_id = *src_record.pages.get(page_index).ok_or(
                PdfBackendError::PageOutOfRange {
                    page: page_index,
                    page_count: src_record.pages.len(),
                },
            )?;
            copy_page_into(&src_record.doc, src_page_id, &mut dest_record)
        })();

        self.docs.insert(dest, dest_record);
        result
    }

    fn page_size(&self, doc: DocumentHandle, page: PageRef) -> Result<(f32, f32), PdfBackendError> {
        let record = self.record(doc)?;
        let page_id = Self::page_object(record, page)?;
        Ok(media_box_size(&record.doc, page_id).unwrap_or_else(|| {
            warn!("page {} has no resolvable MediaBox, assuming US Letter", page.index());
            (612.0, 792.0)
        }))
    }

    fn embed_font(
        &mut self,
        doc: DocumentHandle,
        font: StandardFont,
    ) -> Result<FontHandle, PdfBackendError> {
        let record = self.record_mut(doc)?;
        if !record.fonts.contains_key(&font) {
            let font_id = record.doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Font".to_vec())),
                ("Subtype", Object::Name(b"Type1".to_vec())),
                ("BaseFont", Object::Name(font.base_name().to_vec())),
                ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
            ]));
            record.fonts.insert(font, font_id);
        }
        Ok(FontHandle { doc, font })
    }

    fn text_width(&self, font: FontHandle, text: &str, size: f32) -> f32 {
        fonts::text_width(font.font, text, size)
    }

    fn draw_text(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &TextOp,
    ) -> Result<(), PdfBackendError> {
        let record = self.record_mut(doc)?;
        let page_id = Self::page_object(record, page)?;
        let font_id = *record
            .fonts
            .get(&op.font.font)
            .ok_or(PdfBackendError::FontNotEmbedded(op.font.font))?;
        let name = op.font.font.resource_name();
        Self::add_resource(&mut record.doc, page_id, b"Font", name, font_id)?;

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(name.as_bytes().to_vec()), Object::Real(op.size)],
            ),
            Operation::new(
                "rg",
                vec![
                    Object::Real(op.color.0),
                    Object::Real(op.color.1),
                    Object::Real(op.color.2),
                ],
            ),
            Operation::new("Td", vec![Object::Real(op.x), Object::Real(op.y)]),
            Operation::new("Tj", vec![Object::string_literal(op.text.as_str())]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];
        Self::append_content(&mut record.doc, page_id, operations)
    }

    fn draw_rect(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &RectOp,
    ) -> Result<(), PdfBackendError> {
        let record = self.record_mut(doc)?;
        let page_id = Self::page_object(record, page)?;

        let mut operations = Self::style_operations(record, page_id, op.fill, op.border)?;
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(op.x),
                Object::Real(op.y),
                Object::Real(op.width),
                Object::Real(op.height),
            ],
        ));
        operations.push(Operation::new(
            Self::paint_operator(op.fill.is_some(), op.border.is_some()),
            vec![],
        ));
        operations.push(Operation::new("Q", vec![]));
        Self::append_content(&mut record.doc, page_id, operations)
    }

    fn draw_path(
        &mut self,
        doc: DocumentHandle,
        page: PageRef,
        op: &PathOp,
    ) -> Result<(), PdfBackendError> {
        let record = self.record_mut(doc)?;
        let page_id = Self::page_object(record, page)?;

        let mut operations = Self::style_operations(record, page_id, op.fill, op.stroke)?;
        for segment in &op.segments {
            operations.push(match *segment {
                PathSeg::MoveTo { x, y } => {
                    Operation::new("m", vec![Object::Real(x), Object::Real(y)])
                }
                PathSeg::LineTo { x, y } => {
                    Operation::new("l", vec![Object::Real(x), Object::Real(y)])
                }
                PathSeg::Close => Operation::new("h", vec![]),
            });
        }
        operations.push(Operation::new(
            Self::paint_operator(op.fill.is_some(), op.stroke.is_some()),
            vec![],
        ));
        operations.push(Operation::new("Q", vec![]));
        Self::append_content(&mut record.doc, page_id, operations)
    }

    fn save(&mut self, doc: DocumentHandle) -> Result<Vec<u8>, PdfBackendError> {
        let record = self.record_mut(doc)?;
        record.doc.compress();
        let mut bytes = Vec::new();
        record.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a one-page PDF with the given media box entirely in memory.
    pub(crate) fn single_page_pdf(width: f32, height: f32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("ET", vec![]),
            ],
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

    #[test]
    fn probe_reads_media_boxes() {
        let bytes = single_page_pdf(200.0, 300.0);
        let sizes = probe_page_sizes(&bytes).expect("probe should succeed");
        assert_eq!(sizes.len(), 1);
        assert!((sizes[0].0 - 200.0).abs() < 0.5);
        assert!((sizes[0].1 - 300.0).abs() < 0.5);
    }

    #[test]
    fn invalid_handle_is_rejected() {
        let backend = LopdfBackend::new();
        let err = backend.page_count(DocumentHandle(42)).expect_err("should fail");
        assert!(matches!(err, PdfBackendError::InvalidHandle(42)));
    }

    #[test]
    fn copy_page_preserves_size_and_source() {
        let mut backend = LopdfBackend::new();
        let src_bytes = single_page_pdf(200.0, 300.0);
        let src = backend.load(&src_bytes).expect("load should succeed");
        let out = backend.create().expect("create should succeed");

        let page = backend.copy_page(out, src, 0).expect("copy should succeed");
        assert_eq!(backend.page_count(out).expect("count"), 1);

        let (width, height) = backend.page_size(out, page).expect("size");
        assert!((width - 200.0).abs() < 0.5);
        assert!((height - 300.0).abs() < 0.5);

        // The source document keeps its single page untouched.
        assert_eq!(backend.page_count(src).expect("count"), 1);
    }

    #[test]
    fn copied_page_content_is_state_isolated() {
        let mut backend = LopdfBackend::new();
        let src = backend.load(&single_page_pdf(200.0, 300.0)).expect("load");
        let dest = backend.create().expect("create");
        backend.copy_page(dest, src, 0).expect("copy");

        let bytes = backend.save(dest).expect("save");
        let doc = Document::load_mem(&bytes).expect("parse");
        let page_id = doc.get_pages().into_values().next().expect("page");
        let content = doc.get_page_content(page_id).expect("content");
        let text = String::from_utf8_lossy(&content);
        let trimmed = text.trim();
        assert!(trimmed.starts_with('q'));
        assert!(trimmed.ends_with('Q'));
    }

    #[test]
    fn copy_page_out_of_range_fails() {
        let mut backend = LopdfBackend::new();
        let src = backend.load(&single_page_pdf(100.0, 100.0)).expect("load");
        let out = backend.create().expect("create");

        let err = backend.copy_page(out, src, 3).expect_err("should fail");
        assert!(matches!(err, PdfBackendError::PageOutOfRange { page: 3, .. }));
        // Destination stays usable after a failed copy.
        assert_eq!(backend.page_count(out).expect("count"), 0);
    }

    #[test]
    fn drawn_output_reloads_cleanly() {
        let mut backend = LopdfBackend::new();
        let src = backend.load(&single_page_pdf(612.0, 792.0)).expect("load");
        let out = backend.create().expect("create");
        let page = backend.copy_page(out, src, 0).expect("copy");

        let font = backend.embed_font(out, StandardFont::Helvetica).expect("embed");
        backend
            .draw_text(
                out,
                page,
                &TextOp {
                    text: "42".to_owned(),
                    x: 100.0,
                    y: 700.0,
                    size: 12.0,
                    font,
                    color: (0.0, 0.0, 0.0),
                },
            )
            .expect("draw text");
        backend
            .draw_rect(
                out,
                page,
                &RectOp {
                    x: 10.0,
                    y: 10.0,
                    width: 50.0,
                    height: 20.0,
                    fill: Some(FillStyle { color: (1.0, 1.0, 0.0), opacity: 0.3 }),
                    border: Some(StrokeStyle { color: (0.0, 0.0, 0.0), opacity: 1.0, width: 2.0 }),
                },
            )
            .expect("draw rect");
        backend
            .draw_path(
                out,
                page,
                &PathOp {
                    segments: vec![
                        PathSeg::MoveTo { x: 0.0, y: 0.0 },
                        PathSeg::LineTo { x: 100.0, y: 100.0 },
                    ],
                    fill: None,
                    stroke: Some(StrokeStyle {
                        color: (0.0, 0.0, 0.0),
                        opacity: 1.0,
                        width: 1.0,
                    }),
                },
            )
            .expect("draw path");

        let bytes = backend.save(out).expect("save");
        let reloaded = Document::load_mem(&bytes).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn encrypted_documents_are_rejected() {
        let err = probe_page_sizes(b"%PDF-1.5 /Encrypt").expect_err("should fail");
        assert!(matches!(err, PdfBackendError::EncryptedUnsupported));
    }
}
