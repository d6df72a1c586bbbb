//! Format-to-intermediate helpers: package access, spreadsheet to CSV,
//! HTML to markdown and the PDF text layer.

pub mod html2md;
pub mod package;
pub mod pdf2text;
pub mod xlsx2csv;
