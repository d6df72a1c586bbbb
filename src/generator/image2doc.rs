use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;

use crate::config::{ImageMode, Settings};
use crate::converter::package::{Package, Relationship};
use crate::document::{DocItem, Document};
use crate::error::{ConversionError, Result};
use crate::generator::ConversionContext;

/// Turns raw image bytes into picture items according to the configured
/// [`ImageMode`]. Names are `pic-<timestamp>-<n>` so several images from
/// one document never collide.
pub struct ImageSink {
    mode: ImageMode,
    image_dir: PathBuf,
    output_dir: Option<PathBuf>,
    stamp: i64,
    count: usize,
}

impl ImageSink {
    pub fn new(settings: &Settings) -> Self {
        let output_dir = settings.output_path.as_ref().map(|path| {
            match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            }
        });
        Self {
            mode: settings.image_mode(),
            image_dir: settings.image_path.clone(),
            output_dir,
            stamp: chrono::Utc::now().timestamp(),
            count: 0,
        }
    }

    pub fn picture(&mut self, file_stream: &[u8], caption: Option<String>) -> Result<DocItem> {
        if file_stream.is_empty() {
            return Err(ConversionError::NoContent("image stream is empty".to_string()));
        }

        self.count += 1;
        let image_name = format!("pic-{}-{}", self.stamp, self.count);
        let caption = caption.filter(|c| !c.trim().is_empty()).unwrap_or(image_name.clone());

        let (mime_type, extension) = match infer::get(file_stream) {
            Some(kind) => (kind.mime_type(), kind.extension()),
            None => ("image/png", "png"),
        };

        let uri = match self.mode {
            ImageMode::Placeholder => None,
            ImageMode::Embedded => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(file_stream);
                Some(format!("data:{};base64,{}", mime_type, encoded))
            }
            ImageMode::Referenced => {
                let filename = format!("{}.{}", image_name, extension);
                let file_path = self.image_dir.join(&filename);
                fs::create_dir_all(&self.image_dir)?;
                fs::write(&file_path, file_stream)?;
                tracing::debug!(path = %file_path.display(), "saved image");
                Some(self.link_to(&file_path))
            }
        };

        Ok(DocItem::Picture {
            caption: Some(caption),
            uri,
        })
    }

    /// Path of a saved image as seen from the output file, or as saved when
    /// there is no output file.
    fn link_to(&self, file_path: &Path) -> String {
        let relative = self.output_dir.as_ref().and_then(|dir| {
            let cwd = std::env::current_dir().ok()?;
            pathdiff::diff_paths(cwd.join(file_path), cwd.join(dir))
        });
        let path = relative.unwrap_or_else(|| file_path.to_path_buf());
        path.to_string_lossy().replace('\\', "/")
    }
}

/// A standalone image file becomes a document holding one picture.
pub fn run(file_stream: &[u8], ctx: &mut ConversionContext) -> Result<Document> {
    let mut document = Document::default();
    document.push(ctx.images.picture(file_stream, None)?);
    Ok(document)
}

/// Picture for an image referenced by relationship id from inside an
/// OOXML package. A dangling reference is recorded as a warning and
/// rendered as a placeholder.
pub fn from_package(
    package: &mut Package,
    rels: &HashMap<String, Relationship>,
    rel_id: &str,
    ctx: &mut ConversionContext,
) -> Result<DocItem> {
    let data = match rels.get(rel_id) {
        Some(rel) if !rel.external => package.read(&rel.target)?,
        _ => None,
    };
    match data {
        Some(bytes) if !bytes.is_empty() => ctx.images.picture(&bytes, None),
        _ => {
            ctx.warn(format!("embedded image {} not found in package", rel_id));
            Ok(DocItem::Picture {
                caption: None,
                uri: None,
            })
        }
    }
}
