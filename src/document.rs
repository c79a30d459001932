use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;

/// The only content type accepted for uploads
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Text extracted from a single PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    /// Whitespace-normalized page text
    pub text: String,
}

/// Decide whether an uploaded part is a PDF.
///
/// An explicit content type wins (parameters such as `charset` are ignored).
/// Without one, the type is guessed from the file name.
pub fn is_pdf(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    match content_type {
        Some(content_type) => content_type
            .split(';')
            .next()
            .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME_TYPE))
            .unwrap_or(false),
        None => file_name
            .map(|name| from_path(name).first_or_octet_stream().essence_str() == PDF_MIME_TYPE)
            .unwrap_or(false),
    }
}

/// Extract the text of every page from in-memory PDF bytes
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<Page>> {
    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .context("Failed to extract text from PDF")?;

    let pages: Vec<Page> = raw_pages
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            let text = normalize_whitespace(&raw);
            if text.is_empty() {
                warn!("Page {} has no extractable text", idx + 1);
            }
            debug!("Page {}: {} characters", idx + 1, text.chars().count());
            Page {
                number: idx + 1,
                text,
            }
        })
        .collect();

    info!("Extracted {} pages from PDF", pages.len());
    Ok(pages)
}

/// Run page extraction on the blocking pool.
///
/// A panic inside the PDF parser is reported as an extraction error.
pub async fn load_pdf(bytes: Vec<u8>) -> Result<Vec<Page>> {
    tokio::task::spawn_blocking(move || extract_pages(&bytes))
        .await
        .map_err(|e| anyhow!("PDF extraction aborted: {}", e))?
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        if newline_count > 0 {
            normalized.push_str(if newline_count >= 2 { "\n\n" } else { "\n" });
            newline_count = 0;
        }

        // Don't add consecutive spaces
        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    normalized.trim().to_string()
}
