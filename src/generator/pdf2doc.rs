use once_cell::sync::Lazy;
use regex::Regex;

use crate::converter::pdf2text;
use crate::document::{DocItem, Document};
use crate::error::{ConversionError, Result};
use crate::generator::ConversionContext;

static HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-\n\s*(\p{Ll})").expect("valid regex"));
static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Split extracted text into paragraphs: blank lines separate blocks,
/// words hyphenated across a line break are joined, and runs of
/// whitespace collapse to one space.
pub fn paragraphs(text: &str) -> Vec<String> {
    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{c}', "\n\n");
    let text = HYPHEN_BREAK.replace_all(&text, "$1$2");
    BLOCK_BREAK
        .split(&text)
        .map(|block| WHITESPACE.replace_all(block.trim(), " ").into_owned())
        .filter(|block| !block.is_empty())
        .collect()
}

pub fn run(file_stream: &[u8], ctx: &mut ConversionContext) -> Result<Document> {
    let pdf = pdf2text::extract(file_stream)?;
    ctx.check_pages(pdf.num_pages)?;

    let mut document = Document::default();
    document.metadata.num_pages = pdf.num_pages;
    for paragraph in paragraphs(&pdf.text) {
        document.push(DocItem::paragraph(paragraph));
    }

    if document.items.is_empty() {
        return Err(ConversionError::NoContent(
            "PDF has no text layer (scanned documents are not supported)".to_string(),
        ));
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::converter::pdf2text::testing::one_page_pdf;

    #[test]
    fn splits_blocks_and_joins_hyphenation() {
        let text = "The quick brown fox jum-\nped over\nthe dog.\n\n\n  Second   block\u{c}Third";
        assert_eq!(
            paragraphs(text),
            vec![
                "The quick brown fox jumped over the dog.".to_string(),
                "Second block".to_string(),
                "Third".to_string(),
            ]
        );
    }

    #[test]
    fn converts_a_text_pdf() {
        let settings = Settings::default();
        let mut ctx = ConversionContext::new(&settings);
        let doc = run(&one_page_pdf("Hello docmark world"), &mut ctx).unwrap();
        assert_eq!(doc.metadata.num_pages, Some(1));
        assert_eq!(doc.export_to_markdown(), "Hello docmark world");
    }

    #[test]
    fn page_limit_rejects_longer_pdfs() {
        let settings = Settings {
            max_num_pages: Some(0),
            ..Default::default()
        };
        let mut ctx = ConversionContext::new(&settings);
        let err = run(&one_page_pdf("too long"), &mut ctx).unwrap_err();
        assert!(matches!(err, ConversionError::TooManyPages { pages: 1, limit: 0 }));
    }

    #[test]
    fn keeps_hyphen_before_capital() {
        assert_eq!(paragraphs("Jean-\nPaul"), vec!["Jean- Paul".to_string()]);
    }
}
