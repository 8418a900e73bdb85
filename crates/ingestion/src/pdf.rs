//! PDF text extraction
//!
//! Walks each page's content stream with lopdf and collects the strings shown
//! by the text operators (`Tj`, `TJ`, `'`, `"`), pages in order. Strings are
//! decoded through the encoding of the font selected by `Tf`.

use crate::errors::IngestionError;
use lopdf::content::Content;
use lopdf::Object;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Kerning adjustment (thousandths of an em) treated as a word gap in `TJ`
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Extract the concatenated plain text of every page.
///
/// An unreadable file, or one without any text, is an extraction error.
pub fn extract_text_from_pdf(path: &Path) -> Result<String, IngestionError> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| IngestionError::extraction(path, format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    debug!(path = %path.display(), page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for (page_num, page_id) in pages {
        let content = match doc.get_page_content(page_id) {
            Ok(content) => content,
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to read page content, skipping");
                continue;
            }
        };

        let encodings: FontEncodings = doc
            .get_page_fonts(page_id)
            .into_iter()
            .map(|(name, font)| (name, font.get_font_encoding()))
            .collect();

        match Content::decode(&content) {
            Ok(content) => {
                text.push_str(&text_from_content(&content, &encodings));
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to decode page content, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(IngestionError::extraction(path, "No text content extracted from PDF"));
    }

    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );

    Ok(cleaned)
}

/// Font resource name to encoding name, per page
type FontEncodings<'a> = BTreeMap<Vec<u8>, &'a str>;

fn text_from_content(content: &Content, encodings: &FontEncodings) -> String {
    let mut text = String::new();
    let mut encoding: Option<&str> = None;

    for op in &content.operations {
        match op.operator.as_str() {
            "Tf" => {
                encoding = op
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name).copied());
            }
            "Tj" | "'" => {
                if let Some(s) = op.operands.last().and_then(|o| string_operand(o, encoding)) {
                    text.push_str(&s);
                }
            }
            // aw ac string "
            "\"" => {
                if let Some(s) = op.operands.get(2).and_then(|o| string_operand(o, encoding)) {
                    text.push_str(&s);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::Integer(n) if (-*n as f32) > TJ_SPACE_THRESHOLD => text.push(' '),
                            Object::Real(n) if -*n > TJ_SPACE_THRESHOLD => text.push(' '),
                            other => {
                                if let Some(s) = string_operand(other, encoding) {
                                    text.push_str(&s);
                                }
                            }
                        }
                    }
                }
            }
            // Text positioning ends a line
            "ET" | "T*" | "Td" | "TD" => text.push(' '),
            _ => {}
        }
    }

    text
}

fn string_operand(object: &Object, encoding: Option<&str>) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes, encoding)),
        _ => None,
    }
}

/// Decode a PDF string: UTF-16BE when it carries a byte order mark,
/// otherwise through the font's simple encoding (StandardEncoding when no
/// font is selected).
fn decode_pdf_string(bytes: &[u8], encoding: Option<&str>) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    lopdf::Document::decode_text(encoding, bytes)
}

/// Collapse whitespace runs, drop byte order marks and straighten quotes.
pub fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
