//! Content extraction for fetched documents.
//!
//! Each extractor claims a set of document kinds; the first claimant wins.
//! A kind nothing claims (for example DOCX with DOCX support disabled) is
//! reported as unsupported rather than failing the fetch.

use std::io::Read;

use serde::Serialize;
use tracing::debug;

const SNIFF_WINDOW: usize = 2048;
const BINARY_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
    Unknown,
}

impl DocumentKind {
    /// Classifies by file extension first, then by content sniffing, so a
    /// mislabeled upload still lands on the right extractor.
    pub fn detect(file_name: &str, data: &[u8]) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".pdf") || data.starts_with(b"%PDF") {
            return Self::Pdf;
        }
        if lower.ends_with(".docx") || looks_like_docx(data) {
            return Self::Docx;
        }
        if [".txt", ".md", ".csv", ".json", ".log", ".xml", ".html"]
            .iter()
            .any(|ext| lower.ends_with(ext))
        {
            return Self::Text;
        }
        Self::Unknown
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Text => "text/plain",
            Self::Unknown => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Ok,
    Failed,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub status: ExtractionStatus,
    pub content_type: &'static str,
}

impl Extraction {
    fn ok(text: String, content_type: &'static str) -> Self {
        Self {
            text,
            status: ExtractionStatus::Ok,
            content_type,
        }
    }

    fn failed(content_type: &'static str) -> Self {
        Self {
            text: String::new(),
            status: ExtractionStatus::Failed,
            content_type,
        }
    }

    fn unsupported(content_type: &'static str) -> Self {
        Self {
            text: String::new(),
            status: ExtractionStatus::Unsupported,
            content_type,
        }
    }
}

pub trait Extractor: Send + Sync {
    fn claims(&self, kind: DocumentKind) -> bool;
    fn extract(&self, data: &[u8]) -> Extraction;
}

/// Ordered extractor chain built from the runtime configuration.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn new(enable_docx: bool) -> Self {
        let mut extractors: Vec<Box<dyn Extractor>> =
            vec![Box::new(PdfExtractor), Box::new(PlainTextExtractor), Box::new(BestEffort)];
        if enable_docx {
            extractors.insert(1, Box::new(DocxExtractor));
        }
        Self { extractors }
    }

    pub fn extract(&self, file_name: &str, data: &[u8]) -> Extraction {
        let kind = DocumentKind::detect(file_name, data);
        for extractor in &self.extractors {
            if extractor.claims(kind) {
                return extractor.extract(data);
            }
        }
        debug!(target: "netdocs_core", file_name, "no extractor claims this document kind");
        Extraction::unsupported(kind.content_type())
    }
}

struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn claims(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Pdf
    }

    fn extract(&self, data: &[u8]) -> Extraction {
        let document = match lopdf::Document::load_mem(data) {
            Ok(document) => document,
            Err(error) => {
                debug!(target: "netdocs_core", %error, "pdf parse failed");
                return Extraction::failed(DocumentKind::Pdf.content_type());
            }
        };
        if document.trailer.get(b"Encrypt").is_ok() {
            return Extraction::failed(DocumentKind::Pdf.content_type());
        }
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        match document.extract_text(&pages) {
            Ok(text) => Extraction::ok(
                text.trim_end().to_string(),
                DocumentKind::Pdf.content_type(),
            ),
            Err(error) => {
                debug!(target: "netdocs_core", %error, "pdf text extraction failed");
                Extraction::failed(DocumentKind::Pdf.content_type())
            }
        }
    }
}

struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn claims(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Docx
    }

    fn extract(&self, data: &[u8]) -> Extraction {
        match docx_body_text(data) {
            Ok(text) => Extraction::ok(text, DocumentKind::Docx.content_type()),
            Err(error) => {
                debug!(target: "netdocs_core", %error, "docx extraction failed");
                Extraction::failed(DocumentKind::Docx.content_type())
            }
        }
    }
}

struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn claims(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Text
    }

    fn extract(&self, data: &[u8]) -> Extraction {
        Extraction::ok(decode_text(data), DocumentKind::Text.content_type())
    }
}

/// Last resort for unknown kinds: decode and keep the result only when it
/// looks like text.
struct BestEffort;

impl Extractor for BestEffort {
    fn claims(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Unknown
    }

    fn extract(&self, data: &[u8]) -> Extraction {
        let text = decode_text(data);
        if plausible_text(&text) {
            Extraction::ok(text, DocumentKind::Unknown.content_type())
        } else {
            Extraction::unsupported(DocumentKind::Unknown.content_type())
        }
    }
}

fn looks_like_docx(data: &[u8]) -> bool {
    let cursor = std::io::Cursor::new(data);
    match zip::ZipArchive::new(cursor) {
        Ok(archive) => archive
            .file_names()
            .any(|name| name == "word/document.xml"),
        Err(_) => false,
    }
}

fn docx_body_text(data: &[u8]) -> anyhow::Result<String> {
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;

    let paragraphs: Vec<String> = xml
        .split("</w:p>")
        .map(paragraph_text)
        .filter(|paragraph| !paragraph.is_empty())
        .collect();
    Ok(paragraphs.join("\n"))
}

/// Collects the `<w:t>` run contents of one paragraph fragment.
fn paragraph_text(fragment: &str) -> String {
    let mut out = String::new();
    let mut rest = fragment;
    while let Some(start) = rest.find("<w:t") {
        let after = &rest[start + 4..];
        let body = match after.as_bytes().first().copied() {
            Some(b'>') => &after[1..],
            Some(c) if c.is_ascii_whitespace() => {
                // attributes, e.g. xml:space="preserve"
                match after.find('>') {
                    Some(gt) if after[..gt].ends_with('/') => {
                        rest = &after[gt + 1..];
                        continue;
                    }
                    Some(gt) => &after[gt + 1..],
                    None => break,
                }
            }
            _ => {
                // a different element such as <w:tab/>
                rest = after;
                continue;
            }
        };
        match body.find("</w:t>") {
            Some(end) => {
                out.push_str(&unescape_xml(&body[..end]));
                rest = &body[end + 6..];
            }
            None => break,
        }
    }
    out.trim().to_string()
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// UTF-8, then BOM-tagged UTF-16, then lossy UTF-8.
fn decode_text(data: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(data) {
        return text.to_string();
    }
    if data.len() >= 2 {
        let bom = [data[0], data[1]];
        if bom == [0xFF, 0xFE] || bom == [0xFE, 0xFF] {
            let decode = |pair: &[u8]| -> u16 {
                if bom == [0xFF, 0xFE] {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            };
            let units: Vec<u16> = data[2..].chunks_exact(2).map(decode).collect();
            return String::from_utf16_lossy(&units);
        }
    }
    String::from_utf8_lossy(data).into_owned()
}

/// True when the sniff window is mostly printable characters.
fn plausible_text(text: &str) -> bool {
    let window: Vec<char> = text.chars().take(SNIFF_WINDOW).collect();
    if window.is_empty() {
        return false;
    }
    let suspicious = window
        .iter()
        .filter(|c| (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) || **c == '\u{FFFD}')
        .count();
    (suspicious as f64 / window.len() as f64) <= BINARY_RATIO
}
