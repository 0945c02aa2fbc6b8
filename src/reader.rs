//! File readers: materialize a path as plain UTF-8 text.
//!
//! Extraction is pipeline-layer: the processor hands over a path, this
//! module returns text plus the content kind, or a structured failure.
//! Binary formats (PDF, DOCX) are parsed; markup (HTML, XML) is stripped
//! to visible text; everything else is read as (lossy) UTF-8. Reads run on
//! the blocking pool under a timeout so a wedged file cannot stall the
//! ingest loop.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunker::ContentKind;
use crate::error::{FileErrorKind, RagError, Result};

/// Extensions accepted for ingestion, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "doc", "docx", "csv", "json", "html", "xml",
];

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// A file materialized as text, ready for chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub kind: ContentKind,
}

/// Whether `path` carries a supported extension (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Read and extract `path` within `timeout`.
///
/// Never panics on malformed input: unreadable files, parse failures, and
/// timeouts all come back as [`RagError::FileProcessing`] with the
/// matching kind.
pub async fn load(path: &Path, timeout: Duration) -> Result<LoadedDocument> {
    let ext = extension_of(path).ok_or_else(|| {
        RagError::file(path, FileErrorKind::UnsupportedType, "no file extension")
    })?;
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(RagError::file(
            path,
            FileErrorKind::UnsupportedType,
            format!("extension .{ext}"),
        ));
    }

    let owned: PathBuf = path.to_path_buf();
    let read = tokio::task::spawn_blocking(move || load_blocking(&owned));
    match tokio::time::timeout(timeout, read).await {
        Err(_) => Err(RagError::file(
            path,
            FileErrorKind::ReadTimeout,
            format!("read exceeded {}s", timeout.as_secs()),
        )),
        Ok(Err(join_err)) => Err(RagError::file(
            path,
            FileErrorKind::ParseFailure,
            join_err.to_string(),
        )),
        Ok(Ok(result)) => result,
    }
}

fn load_blocking(path: &Path) -> Result<LoadedDocument> {
    let ext = extension_of(path).unwrap_or_default();
    let kind = ContentKind::from_extension(&ext);

    let text = match ext.as_str() {
        "pdf" => extract_pdf(path)?,
        "docx" => extract_docx(path)?,
        "html" | "xml" => {
            let raw = read_text(path)?;
            strip_markup(&raw).map_err(|e| {
                RagError::file(path, FileErrorKind::ParseFailure, e)
            })?
        }
        // Legacy .doc has no faithful parser here; lossy text keeps the
        // file searchable instead of failing the whole sync.
        _ => read_text(path)?,
    };

    Ok(LoadedDocument { text, kind })
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::file(path, FileErrorKind::Unreadable, e.to_string()))?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::file(path, FileErrorKind::Unreadable, e.to_string()))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RagError::file(path, FileErrorKind::ParseFailure, e.to_string()))
}

fn extract_docx(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::file(path, FileErrorKind::Unreadable, e.to_string()))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| RagError::file(path, FileErrorKind::ParseFailure, e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| {
                RagError::file(
                    path,
                    FileErrorKind::ParseFailure,
                    "word/document.xml not found",
                )
            })?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| RagError::file(path, FileErrorKind::ParseFailure, e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(RagError::file(
                path,
                FileErrorKind::ParseFailure,
                "word/document.xml exceeds size limit",
            ));
        }
    }

    extract_text_elements(&doc_xml, b"t")
        .map_err(|e| RagError::file(path, FileErrorKind::ParseFailure, e))
}

/// Collect the text content of every `<{tag}>` element.
fn extract_text_elements(xml: &[u8], tag: &[u8]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == tag {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Reduce HTML/XML to its visible text, skipping script and style bodies.
fn strip_markup(raw: &str) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(raw.as_bytes());
    reader.config_mut().trim_text(true);
    // HTML in the wild is rarely well-formed; keep going on recoverable errors.
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"script" | b"style") {
                    skip_depth += 1;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"script" | b"style") {
                    skip_depth = skip_depth.saturating_sub(1);
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if skip_depth == 0 => {
                let text = te.unescape().unwrap_or_default();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(trimmed);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => break, // salvage what was collected so far
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn extension_support_is_case_insensitive() {
        assert!(is_supported(Path::new("/a/b/notes.TXT")));
        assert!(is_supported(Path::new("report.PDF")));
        assert!(!is_supported(Path::new("binary.exe")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[tokio::test]
    async fn unsupported_extension_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"not text").unwrap();
        let err = load(&path, timeout()).await.unwrap_err();
        match err {
            RagError::FileProcessing { kind, .. } => {
                assert_eq!(kind, FileErrorKind::UnsupportedType)
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let err = load(Path::new("/no/such/file.txt"), timeout())
            .await
            .unwrap_err();
        match err {
            RagError::FileProcessing { kind, .. } => assert_eq!(kind, FileErrorKind::Unreadable),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn plain_text_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello ingest").unwrap();
        let doc = load(&path, timeout()).await.unwrap();
        assert_eq!(doc.text, "hello ingest");
        assert_eq!(doc.kind, ContentKind::Prose);
    }

    #[tokio::test]
    async fn invalid_pdf_is_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = load(&path, timeout()).await.unwrap_err();
        match err {
            RagError::FileProcessing { kind, .. } => assert_eq!(kind, FileErrorKind::ParseFailure),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn html_markup_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(
            &path,
            "<html><head><style>b{color:red}</style></head><body><p>visible text</p><script>var x=1;</script></body></html>",
        )
        .unwrap();
        let doc = load(&path, timeout()).await.unwrap();
        assert!(doc.text.contains("visible text"));
        assert!(!doc.text.contains("color:red"));
        assert!(!doc.text.contains("var x"));
        assert_eq!(doc.kind, ContentKind::Structured);
    }

    #[tokio::test]
    async fn xml_text_content_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xml");
        std::fs::write(&path, "<root><item>alpha</item><item>beta</item></root>").unwrap();
        let doc = load(&path, timeout()).await.unwrap();
        assert!(doc.text.contains("alpha"));
        assert!(doc.text.contains("beta"));
    }

    #[tokio::test]
    async fn csv_maps_to_tabular() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let doc = load(&path, timeout()).await.unwrap();
        assert_eq!(doc.kind, ContentKind::Tabular);
    }
}
