//! Low-level PDF serialization: header, indirect objects, xref table, trailer.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Write;

/// Version written in the file header.
pub const PDF_VERSION: &str = "1.7";

pub struct PdfWriter<W: Write> {
    writer: W,
    xref_positions: BTreeMap<u32, (u16, u64)>,
    current_position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            xref_positions: BTreeMap::new(),
            current_position: 0,
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.write_bytes(format!("%PDF-{PDF_VERSION}\n").as_bytes())?;
        // Binary comment so transfer tools treat the file as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        Ok(())
    }

    /// Write one indirect object and remember its offset for the xref table.
    pub fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        if id.number() == 0 {
            return Err(PdfError::InvalidStructure(
                "object number 0 is reserved".to_string(),
            ));
        }
        if self.xref_positions.contains_key(&id.number()) {
            return Err(PdfError::InvalidStructure(format!(
                "object {} written twice",
                id.number()
            )));
        }
        self.xref_positions
            .insert(id.number(), (id.generation(), self.current_position));

        let header = format!("{} {} obj\n", id.number(), id.generation());
        self.write_bytes(header.as_bytes())?;
        self.write_object_value(object)?;
        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    /// Write the xref table and trailer, flush, and hand back the sink.
    pub fn finish(mut self, root: ObjectId, info: Option<ObjectId>) -> Result<W> {
        let xref_position = self.current_position;
        self.write_xref()?;

        let max_obj_num = self.xref_positions.keys().next_back().copied().unwrap_or(0);
        let mut trailer = Dictionary::new();
        trailer.set("Size", Object::Integer(max_obj_num as i64 + 1));
        trailer.set("Root", Object::Reference(root));
        if let Some(info) = info {
            trailer.set("Info", Object::Reference(info));
        }

        self.write_bytes(b"trailer\n")?;
        self.write_object_value(&Object::Dictionary(trailer))?;
        self.write_bytes(b"\nstartxref\n")?;
        self.write_bytes(xref_position.to_string().as_bytes())?;
        self.write_bytes(b"\n%%EOF\n")?;

        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_xref(&mut self) -> Result<()> {
        let max_obj_num = self.xref_positions.keys().next_back().copied().unwrap_or(0);

        self.write_bytes(b"xref\n")?;
        self.write_bytes(format!("0 {}\n", max_obj_num + 1).as_bytes())?;
        self.write_bytes(b"0000000000 65535 f \n")?;

        // One subsection from 0 to max; gaps become free entries
        for obj_num in 1..=max_obj_num {
            let entry = match self.xref_positions.get(&obj_num) {
                Some((generation, position)) => format!("{position:010} {generation:05} n \n"),
                None => "0000000000 00000 f \n".to_string(),
            };
            self.write_bytes(entry.as_bytes())?;
        }
        Ok(())
    }

    fn write_object_value(&mut self, object: &Object) -> Result<()> {
        match object {
            Object::Null => self.write_bytes(b"null")?,
            Object::Boolean(b) => self.write_bytes(if *b { b"true" } else { b"false" })?,
            Object::Integer(i) => self.write_bytes(i.to_string().as_bytes())?,
            Object::Real(f) => self.write_bytes(format_real(*f).as_bytes())?,
            Object::String(s) => {
                let escaped = escape_literal_string(s);
                self.write_bytes(&escaped)?;
            }
            Object::Name(n) => {
                let escaped = escape_name(n);
                self.write_bytes(escaped.as_bytes())?;
            }
            Object::Array(arr) => {
                self.write_bytes(b"[")?;
                for (i, obj) in arr.iter().enumerate() {
                    if i > 0 {
                        self.write_bytes(b" ")?;
                    }
                    self.write_object_value(obj)?;
                }
                self.write_bytes(b"]")?;
            }
            Object::Dictionary(dict) => {
                self.write_bytes(b"<<")?;
                for (key, value) in dict.iter() {
                    self.write_bytes(b"\n")?;
                    self.write_bytes(escape_name(key).as_bytes())?;
                    self.write_bytes(b" ")?;
                    self.write_object_value(value)?;
                }
                self.write_bytes(b"\n>>")?;
            }
            Object::Stream(stream) => {
                let mut dict = stream.dictionary().clone();
                dict.set("Length", stream.data().len() as i64);
                self.write_object_value(&Object::Dictionary(dict))?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(stream.data())?;
                self.write_bytes(b"\nendstream")?;
            }
            Object::Reference(id) => self.write_bytes(id.to_string().as_bytes())?,
        }
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

fn escape_literal_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    out.push('/');
    for &b in name.as_bytes() {
        let delimiter = matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        );
        if (0x21..=0x7E).contains(&b) && !delimiter {
            out.push(b as char);
        } else {
            out.push_str(&format!("#{b:02X}"));
        }
    }
    out
}

/// Format a timestamp as a PDF date string (`D:YYYYMMDDHHmmSS+00'00`).
pub fn format_pdf_date(date: DateTime<Utc>) -> String {
    format!("{}+00'00", date.format("D:%Y%m%d%H%M%S"))
}
