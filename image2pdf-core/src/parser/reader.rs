//! Random-access PDF reader over an in-memory buffer.

use super::lexer::{is_whitespace, Lexer, Token};
use super::objects::{parse_dictionary_body, parse_object};
use super::{ParseError, ParseResult};
use crate::error::Result;
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};

/// Page attributes a page inherits from its ancestors in the page tree.
pub const INHERITABLE_ATTRIBUTES: [&str; 4] = ["MediaBox", "CropBox", "Resources", "Rotate"];

/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

const MAX_XREF_SECTIONS: usize = 32;
const MAX_REFERENCE_HOPS: usize = 32;
const MAX_PAGE_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy)]
struct XRefEntry {
    offset: usize,
    generation: u16,
}

pub struct PdfReader<'a> {
    data: &'a [u8],
    version: String,
    xref: HashMap<u32, XRefEntry>,
    trailer: Dictionary,
}

impl<'a> PdfReader<'a> {
    /// Parse the header, cross-reference table(s) and trailer of `data`.
    pub fn new(data: &'a [u8]) -> ParseResult<Self> {
        let version = parse_header(data)?;
        let startxref = find_startxref(data)?;

        let mut xref = HashMap::new();
        let mut trailer: Option<Dictionary> = None;
        let mut seen_sections = HashSet::new();
        let mut next_section = Some(startxref);

        // Newest section first; entries already seen take precedence
        while let Some(offset) = next_section {
            if !seen_sections.insert(offset) || seen_sections.len() > MAX_XREF_SECTIONS {
                return Err(ParseError::InvalidXRef);
            }
            let (entries, section_trailer) = parse_xref_section(data, offset)?;
            for (number, entry) in entries {
                xref.entry(number).or_insert(entry);
            }
            next_section = match section_trailer.get_integer("Prev") {
                Some(prev) => Some(usize::try_from(prev).map_err(|_| ParseError::InvalidXRef)?),
                None => None,
            };
            if trailer.is_none() {
                trailer = Some(section_trailer);
            }
        }

        let trailer = trailer.ok_or(ParseError::InvalidXRef)?;
        if !trailer.contains_key("Root") {
            return Err(ParseError::MissingKey("Root".to_string()));
        }

        Ok(Self {
            data,
            version,
            xref,
            trailer,
        })
    }

    /// Header version, e.g. `"1.7"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Number of in-use objects listed in the cross-reference table.
    pub fn object_count(&self) -> usize {
        self.xref.len()
    }

    /// Load an indirect object. Streams come back with a direct `Length`.
    pub fn get_object(&self, id: ObjectId) -> ParseResult<Object> {
        let entry = self
            .xref
            .get(&id.number())
            .filter(|entry| entry.generation == id.generation())
            .ok_or(ParseError::MissingObject(id.number(), id.generation()))?;

        let mut lexer = Lexer::at(self.data, entry.offset);
        let number = lexer.next_token()?;
        let generation = lexer.next_token()?;
        let keyword = lexer.next_token()?;
        if number != Token::Integer(id.number() as i64)
            || generation != Token::Integer(id.generation() as i64)
            || keyword != Token::Obj
        {
            return Err(ParseError::UnexpectedToken {
                expected: format!("{} {} obj", id.number(), id.generation()),
                found: format!("{number:?} {generation:?} {keyword:?}"),
            });
        }

        let object = parse_object(&mut lexer)?;
        match object {
            Object::Dictionary(dict) if lexer.peek_token()? == Token::Stream => {
                lexer.next_token()?;
                self.read_stream_body(&mut lexer, dict)
            }
            other => Ok(other),
        }
    }

    fn read_stream_body(&self, lexer: &mut Lexer<'a>, dict: Dictionary) -> ParseResult<Object> {
        // The keyword is followed by CRLF or LF before the data starts
        let mut start = lexer.position();
        if self.data.get(start) == Some(&b'\r') {
            start += 1;
        }
        if self.data.get(start) == Some(&b'\n') {
            start += 1;
        }

        let length = match dict.get("Length") {
            Some(Object::Integer(len)) => *len,
            Some(Object::Reference(id)) => self
                .get_object(*id)?
                .as_integer()
                .ok_or_else(|| ParseError::StreamDecodeError("Length is not an integer".into()))?,
            _ => return Err(ParseError::MissingKey("Length".to_string())),
        };
        let length = usize::try_from(length)
            .map_err(|_| ParseError::StreamDecodeError(format!("negative length {length}")))?;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ParseError::StreamDecodeError(format!("stream of {length} bytes runs past end of file"))
            })?;

        lexer.set_position(end);
        if lexer.next_token()? != Token::EndStream {
            return Err(ParseError::StreamDecodeError(
                "missing endstream after stream data".to_string(),
            ));
        }

        Ok(Object::Stream(Stream::with_dictionary(
            dict,
            self.data[start..end].to_vec(),
        )))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, object: &Object) -> ParseResult<Object> {
        let mut current = object.clone();
        for _ in 0..MAX_REFERENCE_HOPS {
            match current {
                Object::Reference(id) => current = self.get_object(id)?,
                direct => return Ok(direct),
            }
        }
        Err(ParseError::CircularReference)
    }

    fn resolve_dict(&self, object: &Object, what: &str) -> ParseResult<Dictionary> {
        match self.resolve(object)? {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(stream.into_parts().0),
            other => Err(ParseError::UnexpectedToken {
                expected: format!("{what} dictionary"),
                found: format!("{other:?}"),
            }),
        }
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> ParseResult<Dictionary> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))?;
        self.resolve_dict(root, "catalog")
    }

    /// Reference to the root `Pages` node, when it is an indirect object.
    pub fn page_tree_root(&self) -> ParseResult<Option<ObjectId>> {
        let catalog = self.catalog()?;
        let pages = catalog
            .get("Pages")
            .ok_or_else(|| ParseError::MissingKey("Pages".to_string()))?;
        Ok(pages.as_reference())
    }

    /// All pages in document order, with inherited attributes filled in.
    pub fn pages(&self) -> ParseResult<Vec<ParsedPage>> {
        let catalog = self.catalog()?;
        let root = catalog
            .get("Pages")
            .ok_or_else(|| ParseError::MissingKey("Pages".to_string()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_page_tree(root, &Dictionary::new(), &mut visited, &mut pages, 0)?;
        Ok(pages)
    }

    fn walk_page_tree(
        &self,
        node: &Object,
        inherited: &Dictionary,
        visited: &mut HashSet<ObjectId>,
        pages: &mut Vec<ParsedPage>,
        depth: usize,
    ) -> ParseResult<()> {
        if depth > MAX_PAGE_TREE_DEPTH {
            return Err(ParseError::CircularReference);
        }
        let id = node.as_reference();
        if let Some(id) = id {
            if !visited.insert(id) {
                return Err(ParseError::CircularReference);
            }
        }

        let mut dict = self.resolve_dict(node, "page tree node")?;

        if let Some(kids) = dict.get("Kids") {
            let mut inherited = inherited.clone();
            for key in INHERITABLE_ATTRIBUTES {
                if let Some(value) = dict.get(key) {
                    inherited.set(key, value.clone());
                }
            }
            let kids = match self.resolve(kids)? {
                Object::Array(kids) => kids,
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "Kids array".to_string(),
                        found: format!("{other:?}"),
                    })
                }
            };
            for kid in &kids {
                self.walk_page_tree(kid, &inherited, visited, pages, depth + 1)?;
            }
        } else {
            for key in INHERITABLE_ATTRIBUTES {
                if !dict.contains_key(key) {
                    if let Some(value) = inherited.get(key) {
                        dict.set(key, value.clone());
                    }
                }
            }
            pages.push(ParsedPage {
                id,
                dictionary: dict,
            });
        }
        Ok(())
    }

    pub fn page_count(&self) -> ParseResult<usize> {
        Ok(self.pages()?.len())
    }

    /// Page at a zero-based index.
    pub fn page(&self, index: usize) -> ParseResult<ParsedPage> {
        let mut pages = self.pages()?;
        if index >= pages.len() {
            return Err(ParseError::MissingKey(format!(
                "page {index} (document has {} pages)",
                pages.len()
            )));
        }
        Ok(pages.swap_remove(index))
    }
}

/// A leaf of the page tree.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// Indirect id of the page object, if it has one
    pub id: Option<ObjectId>,
    /// Page dictionary with inherited attributes materialized
    pub dictionary: Dictionary,
}

impl ParsedPage {
    /// `[llx lly urx ury]` of the MediaBox.
    pub fn media_box(&self) -> [f64; 4] {
        let values: Vec<f64> = self
            .dictionary
            .get_array("MediaBox")
            .map(|arr| arr.iter().filter_map(Object::as_real).collect())
            .unwrap_or_default();
        match values.as_slice() {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => DEFAULT_MEDIA_BOX,
        }
    }

    pub fn width(&self) -> f64 {
        let [llx, _, urx, _] = self.media_box();
        (urx - llx).abs()
    }

    pub fn height(&self) -> f64 {
        let [_, lly, _, ury] = self.media_box();
        (ury - lly).abs()
    }

    pub fn rotation(&self) -> i64 {
        self.dictionary.get_integer("Rotate").unwrap_or(0)
    }

    /// Image XObjects listed in the page's resources.
    pub fn images(&self, reader: &PdfReader<'_>) -> ParseResult<Vec<PageImage>> {
        let resources = match self.dictionary.get("Resources") {
            Some(resources) => reader.resolve_dict(resources, "resources")?,
            None => return Ok(Vec::new()),
        };
        let xobjects = match resources.get("XObject") {
            Some(xobjects) => reader.resolve_dict(xobjects, "XObject")?,
            None => return Ok(Vec::new()),
        };

        let mut images = Vec::new();
        for (name, value) in xobjects.iter() {
            let stream = match reader.resolve(value)? {
                Object::Stream(stream) => stream,
                _ => continue,
            };
            let dict = stream.dictionary();
            if dict.get_name("Subtype") != Some("Image") {
                continue;
            }

            let color_space = match dict.get("ColorSpace").map(|cs| reader.resolve(cs)).transpose()? {
                Some(Object::Name(name)) => name,
                Some(Object::Array(items)) => items
                    .first()
                    .and_then(Object::as_name)
                    .unwrap_or("Unknown")
                    .to_string(),
                _ => "Unknown".to_string(),
            };

            images.push(PageImage {
                name: name.clone(),
                width: dimension(dict, "Width"),
                height: dimension(dict, "Height"),
                color_space,
                bits_per_component: dict.get_integer("BitsPerComponent").unwrap_or(8) as u8,
                stream,
            });
        }
        Ok(images)
    }
}

fn dimension(dict: &Dictionary, key: &str) -> u32 {
    dict.get_integer(key)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// An image XObject found on a page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Resource name, e.g. `Im0`
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u8,
    pub stream: Stream,
}

impl PageImage {
    /// Decoded sample data (FlateDecode only).
    pub fn pixels(&self) -> Result<Vec<u8>> {
        self.stream.decoded_data()
    }
}

fn parse_header(data: &[u8]) -> ParseResult<String> {
    let window = &data[..data.len().min(1024)];
    let start = find(window, b"%PDF-").ok_or(ParseError::InvalidHeader)?;
    let version: String = window[start + 5..]
        .iter()
        .take_while(|b| !is_whitespace(**b))
        .map(|b| *b as char)
        .collect();
    if version.is_empty() {
        return Err(ParseError::InvalidHeader);
    }
    Ok(version)
}

fn find_startxref(data: &[u8]) -> ParseResult<usize> {
    let tail_start = data.len().saturating_sub(1024);
    let tail = &data[tail_start..];
    let at = rfind(tail, b"startxref").ok_or(ParseError::InvalidXRef)?;

    let mut lexer = Lexer::at(data, tail_start + at + b"startxref".len());
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as usize)
        }
        _ => Err(ParseError::InvalidXRef),
    }
}

fn parse_xref_section(
    data: &[u8],
    offset: usize,
) -> ParseResult<(Vec<(u32, XRefEntry)>, Dictionary)> {
    let mut lexer = Lexer::at(data, offset);
    match lexer.next_token()? {
        Token::Keyword(word) if word == "xref" => {}
        Token::Integer(_) => {
            return Err(ParseError::UnsupportedXRef(
                "cross-reference streams".to_string(),
            ))
        }
        _ => return Err(ParseError::InvalidXRef),
    }

    let mut entries = Vec::new();
    loop {
        let first = match lexer.next_token()? {
            Token::Keyword(word) if word == "trailer" => break,
            Token::Integer(first) => u32::try_from(first).map_err(|_| ParseError::InvalidXRef)?,
            _ => return Err(ParseError::InvalidXRef),
        };
        let count = match lexer.next_token()? {
            Token::Integer(count) => u32::try_from(count).map_err(|_| ParseError::InvalidXRef)?,
            _ => return Err(ParseError::InvalidXRef),
        };

        for number in first..first.saturating_add(count) {
            let (offset, generation, kind) =
                (lexer.next_token()?, lexer.next_token()?, lexer.next_token()?);
            match (offset, generation, kind) {
                (Token::Integer(offset), Token::Integer(generation), Token::Keyword(kind)) => {
                    if kind == "n" && number != 0 {
                        entries.push((
                            number,
                            XRefEntry {
                                offset: usize::try_from(offset)
                                    .map_err(|_| ParseError::InvalidXRef)?,
                                generation: u16::try_from(generation)
                                    .map_err(|_| ParseError::InvalidXRef)?,
                            },
                        ));
                    } else if kind != "f" && kind != "n" {
                        return Err(ParseError::InvalidXRef);
                    }
                }
                _ => return Err(ParseError::InvalidXRef),
            }
        }
    }

    if lexer.next_token()? != Token::DictStart {
        return Err(ParseError::InvalidXRef);
    }
    let trailer = parse_dictionary_body(&mut lexer)?;
    Ok((entries, trailer))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PdfWriter;

    /// A two-level page tree: root carries the MediaBox, pages inherit it.
    fn build_test_document() -> Vec<u8> {
        let mut writer = PdfWriter::new_with_writer(Vec::new());
        writer.write_header().unwrap();

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", ObjectId::new(2, 0));
        writer.write_object(ObjectId::new(1, 0), &catalog.into()).unwrap();

        let mut root = Dictionary::new();
        root.set("Type", Object::name("Pages"));
        root.set("Kids", vec![Object::from(ObjectId::new(3, 0)), ObjectId::new(4, 0).into()]);
        root.set("Count", 3);
        root.set(
            "MediaBox",
            vec![Object::Integer(0), Object::Integer(0), Object::Integer(300), Object::Integer(400)],
        );
        writer.write_object(ObjectId::new(2, 0), &root.into()).unwrap();

        let mut first = Dictionary::new();
        first.set("Type", Object::name("Page"));
        first.set("Parent", ObjectId::new(2, 0));
        writer.write_object(ObjectId::new(3, 0), &first.into()).unwrap();

        let mut middle = Dictionary::new();
        middle.set("Type", Object::name("Pages"));
        middle.set("Parent", ObjectId::new(2, 0));
        middle.set("Kids", vec![Object::from(ObjectId::new(5, 0)), ObjectId::new(6, 0).into()]);
        middle.set("Count", 2);
        middle.set("Rotate", 90);
        writer.write_object(ObjectId::new(4, 0), &middle.into()).unwrap();

        let mut second = Dictionary::new();
        second.set("Type", Object::name("Page"));
        second.set("Parent", ObjectId::new(4, 0));
        second.set(
            "MediaBox",
            vec![Object::Integer(0), Object::Integer(0), Object::Real(10.5), Object::Integer(20)],
        );
        writer.write_object(ObjectId::new(5, 0), &second.into()).unwrap();

        let mut third = Dictionary::new();
        third.set("Type", Object::name("Page"));
        third.set("Parent", ObjectId::new(4, 0));
        third.set("Contents", ObjectId::new(7, 0));
        writer.write_object(ObjectId::new(6, 0), &third.into()).unwrap();

        let content = Stream::new(b"0 0 m 10 10 l S".to_vec());
        writer.write_object(ObjectId::new(7, 0), &content.into()).unwrap();
        writer.write_object(ObjectId::new(8, 0), &Object::Integer(15)).unwrap();

        writer.finish(ObjectId::new(1, 0), None).unwrap()
    }

    #[test]
    fn test_reader_basics() {
        let data = build_test_document();
        let reader = PdfReader::new(&data).unwrap();
        assert_eq!(reader.version(), "1.7");
        assert_eq!(reader.object_count(), 8);
        assert_eq!(reader.catalog().unwrap().get_name("Type"), Some("Catalog"));
        assert_eq!(reader.page_tree_root().unwrap(), Some(ObjectId::new(2, 0)));
    }

    #[test]
    fn test_pages_in_order_with_inheritance() {
        let data = build_test_document();
        let reader = PdfReader::new(&data).unwrap();
        let pages = reader.pages().unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].id, Some(ObjectId::new(3, 0)));
        assert_eq!(pages[0].width(), 300.0);
        assert_eq!(pages[0].height(), 400.0);
        assert_eq!(pages[0].rotation(), 0);

        assert_eq!(pages[1].width(), 10.5);
        assert_eq!(pages[1].rotation(), 90);

        assert_eq!(pages[2].id, Some(ObjectId::new(6, 0)));
        assert_eq!(pages[2].height(), 400.0);
        assert_eq!(pages[2].rotation(), 90);
    }

    /// Assemble a file by hand so objects can use constructs the writer never emits.
    fn hand_built_pdf(objects: &[(u32, &str)], root: u32) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (number, body) in objects {
            offsets.push((*number, out.len()));
            out.extend_from_slice(format!("{number} 0 obj\r\n{body}\r\nendobj\r\n").as_bytes());
        }
        let xref_at = out.len();
        let size = objects.iter().map(|(n, _)| *n).max().unwrap_or(0) + 1;
        out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
        for number in 1..size {
            match offsets.iter().find(|(n, _)| *n == number) {
                Some((_, offset)) => out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        out.extend_from_slice(
            format!("trailer\n<< /Size {size} /Root {root} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
        );
        out
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let data = hand_built_pdf(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (3, "<< /Length 4 0 R >>\r\nstream\r\n0 0 m 10 10 l S\r\nendstream"),
                (4, "15"),
            ],
            1,
        );
        let reader = PdfReader::new(&data).unwrap();
        assert_eq!(reader.version(), "1.4");
        assert_eq!(reader.page_count().unwrap(), 0);

        let content = reader.get_object(ObjectId::new(3, 0)).unwrap();
        let stream = content.as_stream().unwrap();
        assert_eq!(stream.data(), b"0 0 m 10 10 l S");
        assert_eq!(stream.dictionary().get_integer("Length"), Some(15));
    }

    #[test]
    fn test_stream_length_past_end_of_file() {
        let data = hand_built_pdf(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Length 99999 >>\nstream\nabc\nendstream"),
            ],
            1,
        );
        let reader = PdfReader::new(&data).unwrap();
        assert!(matches!(
            reader.get_object(ObjectId::new(2, 0)),
            Err(ParseError::StreamDecodeError(_))
        ));
    }

    #[test]
    fn test_missing_object() {
        let data = build_test_document();
        let reader = PdfReader::new(&data).unwrap();
        assert!(matches!(
            reader.get_object(ObjectId::new(42, 0)),
            Err(ParseError::MissingObject(42, 0))
        ));
        // wrong generation
        assert!(reader.get_object(ObjectId::new(1, 3)).is_err());
    }

    #[test]
    fn test_page_index_out_of_range() {
        let data = build_test_document();
        let reader = PdfReader::new(&data).unwrap();
        assert!(reader.page(2).is_ok());
        assert!(reader.page(3).is_err());
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            PdfReader::new(b"\x89PNG\r\n\x1a\n"),
            Err(ParseError::InvalidHeader)
        ));
        assert!(matches!(
            PdfReader::new(b"%PDF-1.4\nno xref here"),
            Err(ParseError::InvalidXRef)
        ));
    }

    #[test]
    fn test_truncated_document() {
        let data = build_test_document();
        let truncated = &data[..data.len() / 2];
        assert!(PdfReader::new(truncated).is_err());
    }

    #[test]
    fn test_page_tree_cycle_is_detected() {
        let mut writer = PdfWriter::new_with_writer(Vec::new());
        writer.write_header().unwrap();
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", ObjectId::new(2, 0));
        writer.write_object(ObjectId::new(1, 0), &catalog.into()).unwrap();

        let mut root = Dictionary::new();
        root.set("Type", Object::name("Pages"));
        root.set("Kids", vec![Object::from(ObjectId::new(2, 0))]);
        root.set("Count", 1);
        writer.write_object(ObjectId::new(2, 0), &root.into()).unwrap();
        let data = writer.finish(ObjectId::new(1, 0), None).unwrap();

        let reader = PdfReader::new(&data).unwrap();
        assert!(matches!(reader.pages(), Err(ParseError::CircularReference)));
    }
}
