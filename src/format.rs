//! Input format detection.
//!
//! Magic bytes win over the file extension; zip containers are opened and
//! classified by the OOXML part they carry.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Html,
    Markdown,
    Csv,
    Image,
}

impl InputFormat {
    pub const ALL: [Self; 8] = [
        Self::Pdf,
        Self::Docx,
        Self::Pptx,
        Self::Xlsx,
        Self::Html,
        Self::Markdown,
        Self::Csv,
        Self::Image,
    ];

    /// Mime type recorded in the document origin. Images report their own
    /// sniffed type instead.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME,
            Self::Pptx => PPTX_MIME,
            Self::Xlsx => XLSX_MIME,
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
            Self::Csv => "text/csv",
            Self::Image => "image/*",
        }
    }

    /// Detect the format of `bytes`, using `path` only as a hint.
    pub fn detect(path: Option<&Path>, bytes: &[u8]) -> Option<Self> {
        if let Some(kind) = infer::get(bytes) {
            let mime = kind.mime_type();
            tracing::debug!(mime, "sniffed magic bytes");
            match mime {
                "application/pdf" => return Some(Self::Pdf),
                DOCX_MIME => return Some(Self::Docx),
                PPTX_MIME => return Some(Self::Pptx),
                XLSX_MIME => return Some(Self::Xlsx),
                "application/zip" => return detect_ooxml(bytes),
                "text/html" => return Some(Self::Html),
                m if m.starts_with("image/") => return Some(Self::Image),
                _ => {}
            }
        }

        if bytes.starts_with(b"PK\x03\x04") {
            if let Some(format) = detect_ooxml(bytes) {
                return Some(format);
            }
        }

        if let Some(format) = path.and_then(Self::from_extension) {
            return Some(format);
        }

        if looks_like_html(bytes) {
            return Some(Self::Html);
        }

        None
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            "html" | "htm" | "xhtml" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            "csv" | "tsv" => Some(Self::Csv),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tif" | "tiff" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Pptx => "PPTX",
            Self::Xlsx => "XLSX",
            Self::Html => "HTML",
            Self::Markdown => "Markdown",
            Self::Csv => "CSV",
            Self::Image => "image",
        };
        f.write_str(name)
    }
}

fn detect_ooxml(bytes: &[u8]) -> Option<InputFormat> {
    let archive = ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut format = None;
    for name in archive.file_names() {
        match name {
            "word/document.xml" => format = Some(InputFormat::Docx),
            "ppt/presentation.xml" => format = Some(InputFormat::Pptx),
            "xl/workbook.xml" => format = Some(InputFormat::Xlsx),
            _ => continue,
        }
        break;
    }
    format
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(&bytes[..bytes.len().min(1024)]) else {
        return false;
    };
    let head = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
