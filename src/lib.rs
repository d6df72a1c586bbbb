//! Document conversion to markdown.
//!
//! ```rust,no_run
//! use docmark::DocumentConverter;
//!
//! let converter = DocumentConverter::new();
//! let result = converter.convert("report.docx")?;
//! println!("{}", result.document.export_to_markdown());
//! # Ok::<(), docmark::ConversionError>(())
//! ```

pub mod config;
pub mod converter;
pub mod document;
pub mod error;
pub mod format;
pub mod generator;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use config::{ImageMode, Settings};
pub use document::{DocItem, Document, DocumentMetadata, DocumentOrigin, Span, TableData};
pub use error::{ConversionError, Result};
pub use format::InputFormat;

use generator::ConversionContext;

pub struct ConverterFile {
    pub file_path: Option<String>,
    pub file_stream: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Success,
    /// Converted, but with warnings recorded in [`ConversionResult::errors`].
    PartialSuccess,
}

#[derive(Debug, Clone)]
pub struct InputDocument {
    pub file: Option<PathBuf>,
    pub format: InputFormat,
    pub filesize: u64,
}

#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub input: InputDocument,
    pub document: Document,
    pub status: ConversionStatus,
    pub errors: Vec<String>,
    pub latency: Duration,
}

pub struct DocumentConverter {
    settings: Settings,
    allowed_formats: Option<Vec<InputFormat>>,
}

impl Default for DocumentConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConverter {
    /// Converter using the process-wide settings.
    pub fn new() -> Self {
        Self::with_settings(config::get_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            allowed_formats: None,
        }
    }

    /// Reject every detected format not in `formats`.
    pub fn with_allowed_formats(mut self, formats: &[InputFormat]) -> Self {
        self.allowed_formats = Some(formats.to_vec());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn convert(&self, path: impl AsRef<Path>) -> Result<ConversionResult> {
        let path = path.as_ref();
        let file_stream = std::fs::read(path).map_err(|source| ConversionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.convert_file(ConverterFile {
            file_path: Some(path.to_string_lossy().into_owned()),
            file_stream,
        })
    }

    /// Convert each path in turn; a failure does not stop the rest.
    pub fn convert_all<I, P>(&self, paths: I) -> impl Iterator<Item = Result<ConversionResult>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(move |path| self.convert(path))
    }

    // byte_stream -> Document
    pub fn convert_file(&self, file: ConverterFile) -> Result<ConversionResult> {
        let started = Instant::now();
        let path = file.file_path.as_deref().map(Path::new);
        let filesize = file.file_stream.len() as u64;

        if let Some(limit) = self.settings.max_file_size {
            if filesize > limit {
                return Err(ConversionError::FileTooLarge {
                    size: filesize,
                    limit,
                });
            }
        }

        let format = InputFormat::detect(path, &file.file_stream).ok_or_else(|| match path {
            Some(p) => match p.extension() {
                Some(ext) => ConversionError::UnsupportedFormat(ext.to_string_lossy().into_owned()),
                None => ConversionError::UnknownFormat,
            },
            None => ConversionError::UnknownFormat,
        })?;
        tracing::debug!(%format, bytes = filesize, "detected input format");

        if let Some(allowed) = &self.allowed_formats {
            if !allowed.contains(&format) {
                return Err(ConversionError::FormatNotAllowed(format));
            }
        }

        let mut ctx = ConversionContext::new(&self.settings);
        let mut document = match format {
            InputFormat::Docx => generator::docx2doc::run(&file.file_stream, &mut ctx)?,
            InputFormat::Pptx => generator::pptx2doc::run(&file.file_stream, &mut ctx)?,
            InputFormat::Xlsx => generator::xlsx2doc::run(&file.file_stream)?,
            InputFormat::Csv => generator::csv2doc::run(&file.file_stream)?,
            InputFormat::Html => generator::html2doc::run(&file.file_stream)?,
            InputFormat::Markdown => generator::md2doc::run(&file.file_stream)?,
            InputFormat::Image => generator::image2doc::run(&file.file_stream, &mut ctx)?,
            InputFormat::Pdf => generator::pdf2doc::run(&file.file_stream, &mut ctx)?,
        };

        let filename = path
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let mimetype = match format {
            InputFormat::Image => infer::get(&file.file_stream)
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| format.mime_type().to_string()),
            _ => format.mime_type().to_string(),
        };
        document.name = path
            .and_then(|p| p.file_stem())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());
        document.origin = Some(DocumentOrigin { filename, mimetype });
        document.refresh_metadata();

        let status = if ctx.warnings.is_empty() {
            ConversionStatus::Success
        } else {
            ConversionStatus::PartialSuccess
        };

        Ok(ConversionResult {
            input: InputDocument {
                file: path.map(Path::to_path_buf),
                format,
                filesize,
            },
            document,
            status,
            errors: ctx.warnings,
            latency: started.elapsed(),
        })
    }
}

/// Convert the file at `file_path` with the process-wide settings and
/// return its markdown.
pub fn convert_from_path(file_path: &str) -> Result<String> {
    let result = DocumentConverter::new().convert(file_path)?;
    Ok(result.document.export_to_markdown())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn converter() -> DocumentConverter {
        DocumentConverter::with_settings(Settings::default())
    }

    #[test]
    fn converts_markdown_file_with_metadata() {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        write!(file, "# Notes\n\n- a\n- b\n").unwrap();

        let result = converter().convert(file.path()).unwrap();
        assert_eq!(result.input.format, InputFormat::Markdown);
        assert_eq!(result.status, ConversionStatus::Success);
        assert_eq!(result.document.metadata.title.as_deref(), Some("Notes"));
        assert_eq!(result.document.export_to_markdown(), "# Notes\n\n- a\n- b");
        let origin = result.document.origin.unwrap();
        assert!(origin.filename.ends_with(".md"));
        assert_eq!(origin.mimetype, "text/markdown");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = converter().convert("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, ConversionError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.pdf"));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = converter()
            .convert_file(ConverterFile {
                file_path: Some("data.bin".into()),
                file_stream: b"just some words".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedFormat(ext) if ext == "bin"));
    }

    #[test]
    fn allowed_formats_are_enforced() {
        let err = converter()
            .with_allowed_formats(&[InputFormat::Pdf])
            .convert_file(ConverterFile {
                file_path: Some("t.csv".into()),
                file_stream: b"a,b\n1,2\n".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, ConversionError::FormatNotAllowed(InputFormat::Csv)));
    }

    #[test]
    fn every_format_allowed_converts() {
        let result = converter()
            .with_allowed_formats(&InputFormat::ALL)
            .convert_file(ConverterFile {
                file_path: None,
                file_stream: b"<!DOCTYPE html><html><body><p>hi</p></body></html>".to_vec(),
            })
            .unwrap();
        assert_eq!(result.input.format, InputFormat::Html);
        assert_eq!(result.document.name, "document");
        assert_eq!(result.document.export_to_markdown(), "hi");
    }

    #[test]
    fn file_size_limit_is_enforced() {
        let settings = Settings {
            max_file_size: Some(4),
            ..Default::default()
        };
        let err = DocumentConverter::with_settings(settings)
            .convert_file(ConverterFile {
                file_path: Some("t.csv".into()),
                file_stream: b"a,b\n1,2\n".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, ConversionError::FileTooLarge { size: 8, limit: 4 }));
    }

    #[test]
    fn convert_from_path_returns_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "team\tpoints\nred\t3\n").unwrap();

        let markdown = convert_from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(markdown, "| team | points |\n| --- | --- |\n| red | 3 |");
        assert!(convert_from_path("/definitely/not/here.csv").is_err());
    }

    #[test]
    fn convert_all_keeps_going_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("t.csv");
        std::fs::write(&good, "x,y\n1,2\n").unwrap();
        let missing = dir.path().join("missing.csv");

        let converter = converter();
        let results: Vec<_> = converter.convert_all([&missing, &good]).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(
            results[1].as_ref().unwrap().document.export_to_markdown(),
            "| x | y |\n| --- | --- |\n| 1 | 2 |"
        );
    }
}
