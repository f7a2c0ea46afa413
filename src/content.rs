// src/content.rs

use crate::error::ContentError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lopdf::Document;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Result of reading an uploaded invoice file.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Text pulled from a text-bearing document.
    Text(String),
    /// Raw image bytes, base64-encoded.
    Image(ImagePayload),
    /// The file could not be read; carries a human-readable message.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime: &'static str,
    pub base64: String,
}

impl ImagePayload {
    /// `data:` URL form used for vision model requests.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Below this many non-whitespace characters a PDF is probably scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Main entry point: classify `path` by extension and read it.
pub fn extract_content(path: &Path) -> Content {
    match try_extract_content(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Content extraction failed");
            Content::Error(e.to_string())
        }
    }
}

fn try_extract_content(path: &Path) -> Result<Content, ContentError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let bytes = fs::read(path)?;
            extract_text_from_pdf(&bytes).map(Content::Text)
        }
        "png" => encode_image(path, "image/png"),
        "jpg" | "jpeg" => encode_image(path, "image/jpeg"),
        _ => Err(ContentError::UnsupportedFormat),
    }
}

/// Extract text page by page, each page followed by a newline.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> Result<String, ContentError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ContentError::PdfUnreadable(format!("failed to parse PDF: {e}")))?;

    if doc.is_encrypted() {
        return Err(ContentError::PdfEncrypted);
    }

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        let page_text = doc
            .extract_text(&[*page_num])
            .map_err(|e| ContentError::PdfUnreadable(format!("page {page_num}: {e}")))?;
        text.push_str(&page_text);
        text.push('\n');
    }

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        warn!(
            chars = meaningful,
            "Extracted text too short — PDF is probably scanned"
        );
    } else {
        info!(chars = meaningful, "Text extracted successfully");
    }
    Ok(text)
}

fn encode_image(path: &Path, mime: &'static str) -> Result<Content, ContentError> {
    let bytes = fs::read(path)?;
    info!(bytes = bytes.len(), mime, "Encoded image payload");
    Ok(Content::Image(ImagePayload {
        mime,
        base64: STANDARD.encode(bytes),
    }))
}
