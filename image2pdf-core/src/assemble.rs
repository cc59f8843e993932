//! Document assembly
//!
//! Concatenates page fragments into one document. Each fragment is read back
//! with [`PdfReader`], and every page plus the objects it references is copied
//! under fresh object numbers. The output has a flat page tree whose kids are
//! in fragment order.

use crate::document::{DocumentMetadata, OutputDocument};
use crate::error::{ConvertError, PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::page::PageFragment;
use crate::parser::{ParsedPage, PdfReader};
use crate::writer::PdfWriter;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

const CATALOG_ID: ObjectId = ObjectId::new(1, 0);
const PAGES_ID: ObjectId = ObjectId::new(2, 0);

/// Joins page fragments into an [`OutputDocument`].
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    metadata: DocumentMetadata,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: DocumentMetadata) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Copy every page of every fragment, in order, into a new document.
    pub fn assemble(
        &self,
        fragments: &[PageFragment],
    ) -> std::result::Result<OutputDocument, ConvertError> {
        if fragments.is_empty() {
            return Err(ConvertError::AssembleFailure {
                index: 0,
                source: PdfError::InvalidStructure("no page fragments to assemble".to_string()),
            });
        }

        let mut builder = DocumentBuilder::new();
        for (index, fragment) in fragments.iter().enumerate() {
            builder
                .import_fragment(fragment.as_bytes())
                .map_err(|source| ConvertError::AssembleFailure { index, source })?;
            debug!(index, filename = fragment.filename(), "imported page fragment");
        }

        let page_count = builder.page_count();
        let bytes = builder
            .finish(&self.metadata)
            .map_err(|source| ConvertError::AssembleFailure {
                index: fragments.len() - 1,
                source,
            })?;

        debug!(pages = page_count, bytes = bytes.len(), "assembled document");
        Ok(OutputDocument::new(bytes, page_count))
    }
}

/// Assemble `fragments` with default metadata.
pub fn assemble(fragments: &[PageFragment]) -> std::result::Result<OutputDocument, ConvertError> {
    DocumentAssembler::new().assemble(fragments)
}

/// Copy the page at zero-based `index` out of `document` into a standalone
/// single-page fragment.
pub fn extract_page(document: &[u8], index: usize) -> Result<PageFragment> {
    let reader = PdfReader::new(document)?;
    let page = reader.page(index)?;
    let [llx, lly, urx, ury] = page.media_box();
    let (width, height) = ((urx - llx).abs().round(), (ury - lly).abs().round());

    let mut builder = DocumentBuilder::new();
    builder.import_pages(&reader, vec![page])?;
    let bytes = builder.finish(&DocumentMetadata::empty())?;

    Ok(PageFragment::new(
        format!("page-{}", index + 1),
        width as u32,
        height as u32,
        bytes,
    ))
}

/// Old-to-new object numbers for the fragment currently being imported.
#[derive(Default)]
struct Renumbering {
    mapping: HashMap<ObjectId, ObjectId>,
    /// Objects referenced but not copied yet
    pending: VecDeque<(ObjectId, ObjectId)>,
}

struct DocumentBuilder {
    objects: BTreeMap<u32, Object>,
    kids: Vec<ObjectId>,
    next_object_num: u32,
}

impl DocumentBuilder {
    fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            kids: Vec::new(),
            next_object_num: PAGES_ID.number() + 1,
        }
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn allocate(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_object_num, 0);
        self.next_object_num += 1;
        id
    }

    fn import_fragment(&mut self, bytes: &[u8]) -> Result<()> {
        let reader = PdfReader::new(bytes)?;
        let pages = reader.pages()?;
        if pages.is_empty() {
            return Err(PdfError::InvalidStructure(
                "fragment contains no pages".to_string(),
            ));
        }
        self.import_pages(&reader, pages)
    }

    fn import_pages(&mut self, reader: &PdfReader<'_>, pages: Vec<ParsedPage>) -> Result<()> {
        let mut renumbering = Renumbering::default();

        // References back into the source page tree land on the output root
        if let Some(root) = reader.page_tree_root()? {
            renumbering.mapping.insert(root, PAGES_ID);
        }

        // Pages are rebuilt from their materialized dictionaries, never copied
        // through the pending queue
        let mut new_ids = Vec::with_capacity(pages.len());
        for page in &pages {
            let new_id = self.allocate();
            if let Some(old_id) = page.id {
                renumbering.mapping.insert(old_id, new_id);
            }
            new_ids.push(new_id);
        }

        for (page, new_id) in pages.into_iter().zip(new_ids) {
            let mut dictionary = page.dictionary;
            dictionary.remove("Parent");
            let mut dictionary = self.translate_dictionary(dictionary, &mut renumbering);
            dictionary.set("Parent", PAGES_ID);
            self.objects.insert(new_id.number(), dictionary.into());
            self.kids.push(new_id);
        }

        while let Some((old_id, new_id)) = renumbering.pending.pop_front() {
            let object = reader.get_object(old_id)?;
            let object = self.translate(object, &mut renumbering);
            self.objects.insert(new_id.number(), object);
        }
        Ok(())
    }

    /// Rewrite every reference in `object` to its output id, queueing
    /// objects seen for the first time.
    fn translate(&mut self, object: Object, renumbering: &mut Renumbering) -> Object {
        match object {
            Object::Reference(old_id) => {
                let new_id = match renumbering.mapping.get(&old_id) {
                    Some(new_id) => *new_id,
                    None => {
                        let new_id = self.allocate();
                        renumbering.mapping.insert(old_id, new_id);
                        renumbering.pending.push_back((old_id, new_id));
                        new_id
                    }
                };
                Object::Reference(new_id)
            }
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.translate(item, renumbering))
                    .collect(),
            ),
            Object::Dictionary(dict) => {
                Object::Dictionary(self.translate_dictionary(dict, renumbering))
            }
            Object::Stream(stream) => {
                let (dict, data) = stream.into_parts();
                let dict = self.translate_dictionary(dict, renumbering);
                Object::Stream(Stream::with_dictionary(dict, data))
            }
            direct => direct,
        }
    }

    fn translate_dictionary(&mut self, dict: Dictionary, renumbering: &mut Renumbering) -> Dictionary {
        dict.into_iter()
            .map(|(key, value)| (key, self.translate(value, renumbering)))
            .collect()
    }

    fn finish(mut self, metadata: &DocumentMetadata) -> Result<Vec<u8>> {
        let info = metadata.to_info_dictionary();
        let info_id = if info.is_empty() {
            None
        } else {
            let id = self.allocate();
            self.objects.insert(id.number(), info.into());
            Some(id)
        };

        let mut writer = PdfWriter::new_with_writer(Vec::new());
        writer.write_header()?;

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", PAGES_ID);
        writer.write_object(CATALOG_ID, &catalog.into())?;

        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Count", self.kids.len() as i64);
        pages.set(
            "Kids",
            self.kids.iter().copied().map(Object::from).collect::<Vec<_>>(),
        );
        writer.write_object(PAGES_ID, &pages.into())?;

        for (number, object) in &self.objects {
            writer.write_object(ObjectId::new(*number, 0), object)?;
        }

        writer.finish(CATALOG_ID, info_id)
    }
}
