use std::path::PathBuf;

use thiserror::Error;

use crate::format::InputFormat;

/// Everything that can stop a conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to read file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine file type")]
    UnknownFormat,

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("{0} input is not in the allowed formats")]
    FormatNotAllowed(InputFormat),

    #[error("input is {size} bytes, the limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("document has {pages} pages, the limit is {limit}")]
    TooManyPages { pages: usize, limit: usize },

    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("package part {0} is missing")]
    MissingPart(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no content could be extracted: {0}")]
    NoContent(String),
}

pub type Result<T> = std::result::Result<T, ConversionError>;
