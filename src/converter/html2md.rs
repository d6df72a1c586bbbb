use html2md::parse_html;

use crate::error::{ConversionError, Result};

/// HTML bytes to a markdown string.
pub fn run(bytes: &[u8]) -> Result<String> {
    let html_content = String::from_utf8_lossy(bytes);
    let html_content = html_content.trim_start_matches('\u{feff}');

    let markdown = parse_html(html_content);

    if markdown.trim().is_empty() {
        return Err(ConversionError::NoContent("empty or invalid HTML content".to_string()));
    }

    Ok(markdown)
}
