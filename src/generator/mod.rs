//! One generator per input format. Each reads the raw bytes and returns a
//! [`Document`](crate::document::Document) in reading order.

pub mod csv2doc;
pub mod docx2doc;
pub mod html2doc;
pub mod image2doc;
pub mod md2doc;
pub mod pdf2doc;
pub mod pptx2doc;
pub mod xlsx2doc;

use crate::config::Settings;
use image2doc::ImageSink;

/// State shared by the generators during one conversion.
pub struct ConversionContext<'a> {
    pub settings: &'a Settings,
    pub images: ImageSink,
    pub warnings: Vec<String>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            images: ImageSink::new(settings),
            warnings: Vec::new(),
        }
    }

    /// Record a problem that did not stop the conversion.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Fail when a paged document exceeds `max_num_pages`. An unknown
    /// page count passes.
    pub fn check_pages(&self, pages: Option<usize>) -> crate::Result<()> {
        match (pages, self.settings.max_num_pages) {
            (Some(pages), Some(limit)) if pages > limit => {
                Err(crate::ConversionError::TooManyPages { pages, limit })
            }
            (None, Some(limit)) => {
                tracing::debug!(limit, "page count unknown, page limit not enforced");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
