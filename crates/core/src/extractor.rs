use crate::{DocumentError, DocumentKind};
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const DOCX_BODY: &str = "word/document.xml";

pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, DocumentError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, DocumentError> {
        let document =
            Document::load(path).map_err(|error| DocumentError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let page_text = document
                .extract_text(&[page_no])
                .map_err(|error| DocumentError::PdfParse(error.to_string()))?;
            text.push_str(&page_text);
        }

        Ok(text)
    }
}

#[derive(Default)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, DocumentError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|error| DocumentError::DocxParse(error.to_string()))?;
        let mut body = archive
            .by_name(DOCX_BODY)
            .map_err(|error| DocumentError::DocxParse(format!("{DOCX_BODY}: {error}")))?;

        let mut xml = String::new();
        body.read_to_string(&mut xml)?;
        paragraphs_from_document_xml(&xml).map(|paragraphs| paragraphs.join("\n"))
    }
}

/// Collects the text of every `w:p` paragraph in a WordprocessingML body.
fn paragraphs_from_document_xml(xml: &str) -> Result<Vec<String>, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_run => {
                let text = e
                    .unescape()
                    .map_err(|error| DocumentError::DocxParse(error.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(DocumentError::DocxParse(format!(
                    "xml error at position {}: {error}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

pub fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, DocumentError> {
    match kind {
        DocumentKind::Pdf => LopdfExtractor.extract_text(path),
        DocumentKind::Docx => DocxExtractor.extract_text(path),
    }
}

/// Runs [`extract_text`] on the blocking pool.
pub async fn extract_text_blocking(
    path: PathBuf,
    kind: DocumentKind,
) -> Result<String, DocumentError> {
    tokio::task::spawn_blocking(move || extract_text(&path, kind))
        .await
        .map_err(|error| {
            DocumentError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("extraction task failed: {error}"),
            ))
        })?
}
