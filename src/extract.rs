//! Plain-text extraction for uploaded files.
//!
//! Dispatches on the file extension: PDF via `pdf-extract`, DOCX by reading
//! `word/document.xml` out of the ZIP container, and everything else as
//! (lossy) UTF-8 text. Callers use [`extract_text_from_file`], which never
//! fails: an unreadable file simply has no text.

use std::io::Read;
use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    Io(std::io::Error),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "could not read file: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

/// Kinds of input the extractor distinguishes, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
    /// Unknown extension; read naively as text.
    Other,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "docx" => FileKind::Docx,
            "txt" => FileKind::Text,
            _ => FileKind::Other,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FileKind::Pdf => MIME_PDF,
            FileKind::Docx => MIME_DOCX,
            FileKind::Text => MIME_TEXT,
            FileKind::Other => MIME_OCTET,
        }
    }
}

/// Extract text from a file on disk. Any failure yields an empty string.
pub fn extract_text_from_file(path: &Path) -> String {
    let kind = FileKind::from_name(&path.to_string_lossy());
    let result = std::fs::read(path)
        .map_err(ExtractError::from)
        .and_then(|bytes| extract_text(&bytes, kind));
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "text extraction failed");
            String::new()
        }
    }
}

/// Extract text from in-memory file contents.
pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    match kind {
        FileKind::Pdf => extract_pdf(bytes),
        FileKind::Docx => extract_docx(bytes),
        FileKind::Text | FileKind::Other => Ok(decode_utf8_ignoring_errors(bytes)),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    catch_parser_panic(|| {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    })
}

/// Run a parser, turning a panic on malformed input into [`ExtractError::Pdf`].
fn catch_parser_panic<F>(parse: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError>,
{
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(parse)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ExtractError::Pdf(format!("parser panicked: {}", detail)))
    })
}

/// Decode UTF-8, dropping invalid sequences rather than substituting them.
fn decode_utf8_ignoring_errors(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for piece in bytes.utf8_chunks() {
        out.push_str(piece.valid());
    }
    out
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    paragraphs_from_document_xml(&doc_xml)
}

/// Collect the text of every body-level `<w:p>` paragraph, one paragraph
/// per line. Paragraphs inside tables (`<w:tbl>`) are not collected.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"p" if table_depth == 0 => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" if table_depth == 0 => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                b"p" if table_depth == 0 => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        docx_with_body(&body)
    }

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(FileKind::from_name("report.PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_name("notes.Docx"), FileKind::Docx);
        assert_eq!(FileKind::from_name("a.txt"), FileKind::Text);
        assert_eq!(FileKind::from_name("readme.md"), FileKind::Other);
        assert_eq!(FileKind::from_name("noext"), FileKind::Other);
    }

    #[test]
    fn text_drops_invalid_utf8() {
        let text = extract_text(b"caf\xff\xfee ok", FileKind::Text).unwrap();
        assert_eq!(text, "cafe ok");
    }

    #[test]
    fn docx_paragraphs_joined_by_newline() {
        let bytes = docx_with_paragraphs(&["First paragraph", "Second &amp; last"]);
        let text = extract_text(&bytes, FileKind::Docx).unwrap();
        assert_eq!(text, "First paragraph\nSecond & last");
    }

    #[test]
    fn docx_table_paragraphs_skipped() {
        let body = "<w:p><w:r><w:t>Before</w:t></w:r></w:p>\
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p>\
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Nested</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
            </w:tc></w:tr></w:tbl>\
            <w:p><w:r><w:t>After</w:t></w:r></w:p>";
        let text = extract_text(&docx_with_body(body), FileKind::Docx).unwrap();
        assert_eq!(text, "Before\nAfter");
    }

    #[test]
    fn parser_panic_becomes_pdf_error() {
        let err = catch_parser_panic(|| panic!("bad xref")).unwrap_err();
        match err {
            ExtractError::Pdf(msg) => assert!(msg.contains("bad xref"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(catch_parser_panic(|| Ok("fine".to_string())).unwrap(), "fine");
    }

    #[test]
    fn invalid_docx_is_an_error() {
        let err = extract_text(b"not a zip", FileKind::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        let err = extract_text(b"not a pdf", FileKind::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn file_extraction_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad_pdf = dir.path().join("broken.pdf");
        std::fs::write(&bad_pdf, b"garbage").unwrap();
        assert_eq!(extract_text_from_file(&bad_pdf), "");

        let missing = dir.path().join("missing.txt");
        assert_eq!(extract_text_from_file(&missing), "");

        let unknown = dir.path().join("notes.md");
        std::fs::write(&unknown, "# Heading\nbody").unwrap();
        assert_eq!(extract_text_from_file(&unknown), "# Heading\nbody");
    }
}
