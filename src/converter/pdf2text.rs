use std::panic;

use crate::error::{ConversionError, Result};

/// Text pulled out of a PDF together with its page count.
pub struct PdfText {
    pub text: String,
    pub num_pages: Option<usize>,
}

/// Extract the text layer of a PDF.
///
/// `pdf-extract` is tried first; it can fail or panic on unusual files, in
/// which case the per-page extraction of `lopdf` is used instead.
pub fn extract(file_stream: &[u8]) -> Result<PdfText> {
    let document = lopdf::Document::load_mem(file_stream);
    let num_pages = match &document {
        Ok(doc) => Some(doc.get_pages().len()),
        Err(e) => {
            tracing::debug!("lopdf could not load the PDF, page count unknown: {}", e);
            None
        }
    };

    let extract_result = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(file_stream));

    let text = match extract_result {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        Ok(Ok(_)) => {
            tracing::debug!("pdf-extract found no text, trying lopdf");
            extract_with_lopdf(document)?
        }
        Ok(Err(e)) => {
            tracing::warn!("pdf-extract failed, trying lopdf: {}", e);
            extract_with_lopdf(document)?
        }
        Err(_) => {
            tracing::warn!("pdf-extract crashed, trying lopdf");
            extract_with_lopdf(document)?
        }
    };

    Ok(PdfText { text, num_pages })
}

fn extract_with_lopdf(document: lopdf::Result<lopdf::Document>) -> Result<String> {
    let doc = document.map_err(|e| ConversionError::Pdf(format!("failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push_str("\n\n");
            }
            Err(e) => tracing::debug!(page = page_num, "lopdf could not read page: {}", e),
        }
    }
    Ok(text)
}


#[cfg(test)]
mod tests {
    use super::testing::one_page_pdf;
    use super::*;

    #[test]
    fn reads_text_and_page_count() {
        let pdf = extract(&one_page_pdf("Hello docmark world")).unwrap();
        assert_eq!(pdf.num_pages, Some(1));
        assert!(pdf.text.contains("Hello docmark world"), "{:?}", pdf.text);
    }

    #[test]
    fn garbage_is_a_pdf_error() {
        let result = extract(b"%PDF-1.4\nnot really a pdf");
        assert!(matches!(result, Err(ConversionError::Pdf(_))));
    }
}
