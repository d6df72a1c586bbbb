use crate::converter::html2md;
use crate::document::Document;
use crate::error::Result;
use crate::generator::md2doc;

/// HTML goes through markdown first, so both inputs share one parser.
pub fn run(bytes: &[u8]) -> Result<Document> {
    let markdown = html2md::run(bytes)?;
    Ok(md2doc::parse(&markdown))
}
