//! Document loading for the regulation corpus (PDF, DOCX, plain text).
//!
//! [`load_document`] dispatches on the file extension through
//! [`DocumentFormat`] and returns one text blob per document. Extraction
//! never panics: parser failures (including panics inside `pdf-extract`)
//! surface as [`LoadError`] so a batch upload can report per-file status.

use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Неподдерживаемый формат файла: {0}")]
    UnsupportedFormat(String),
    #[error("Не удалось прочитать файл: {}", .0.display())]
    UnreadableFile(PathBuf),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// The three supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

type Loader = fn(&Path) -> Result<String, LoadError>;

/// Extension → format table. Extensions are matched case-insensitively.
const FORMATS: [(&str, DocumentFormat); 3] = [
    ("pdf", DocumentFormat::Pdf),
    ("docx", DocumentFormat::Docx),
    ("txt", DocumentFormat::Text),
];

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        FORMATS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, format)| *format)
            .ok_or_else(|| {
                LoadError::UnsupportedFormat(if ext.is_empty() {
                    String::new()
                } else {
                    format!(".{}", ext)
                })
            })
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => MIME_PDF,
            DocumentFormat::Docx => MIME_DOCX,
            DocumentFormat::Text => MIME_TEXT,
        }
    }

    fn loader(self) -> Loader {
        match self {
            DocumentFormat::Pdf => load_pdf,
            DocumentFormat::Docx => load_docx,
            DocumentFormat::Text => load_text,
        }
    }
}

/// Whether `path` has one of the supported extensions.
pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_ok()
}

/// Read a document and return its text.
pub fn load_document(path: &Path) -> Result<String, LoadError> {
    let format = DocumentFormat::from_path(path)?;
    (format.loader())(path)
}

fn load_pdf(path: &Path) -> Result<String, LoadError> {
    // pdf-extract panics on some malformed fonts.
    let pages = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));
    let pages = match pages {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => return Err(LoadError::Pdf(e.to_string())),
        Err(_) => {
            return Err(LoadError::Pdf(format!(
                "parser panicked while reading {}",
                path.display()
            )))
        }
    };

    Ok(join_pages(&pages))
}

/// Trimmed non-blank pages, one per line group.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn load_docx(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|_| LoadError::UnreadableFile(path.to_path_buf()))?;
    extract_docx(&bytes)
}

/// Extract paragraph text from DOCX bytes: one line per non-blank `w:p`.
pub fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| LoadError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    let paragraphs = extract_paragraphs(&doc_xml)?;
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn extract_paragraphs(xml: &[u8]) -> Result<Vec<String>, LoadError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => {
                    if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"tab" {
                    current.push('\t');
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    paragraphs.push(std::mem::take(&mut current));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Encodings tried, in order, for plain-text documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Utf8,
    Windows1251,
    Latin1,
}

const TEXT_ENCODINGS: [TextEncoding; 3] = [
    TextEncoding::Utf8,
    TextEncoding::Windows1251,
    TextEncoding::Latin1,
];

impl TextEncoding {
    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Windows1251 => encoding_rs::WINDOWS_1251
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

fn load_text(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|_| LoadError::UnreadableFile(path.to_path_buf()))?;
    decode_text(&bytes).ok_or_else(|| LoadError::UnreadableFile(path.to_path_buf()))
}

/// Decode plain-text bytes with the first encoding that accepts them.
/// Line endings are normalised to `\n`.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    TEXT_ENCODINGS
        .iter()
        .find_map(|enc| enc.decode(bytes))
        .map(|text| text.replace("\r\n", "\n").replace('\r', "\n"))
}
