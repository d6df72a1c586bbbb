//! Minimal Open Packaging Conventions access shared by the OOXML readers:
//! part lookup inside the zip container, relationship resolution, and a few
//! quick-xml attribute helpers.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ConversionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub target: String,
    pub external: bool,
}

pub struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    pub fn open(file_stream: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(file_stream))?;
        Ok(Self { archive })
    }

    /// Raw bytes of `name`, or `None` when the package has no such part.
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    pub fn read_required(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read(name)?
            .ok_or_else(|| ConversionError::MissingPart(name.to_string()))
    }

    pub fn read_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.read(name)? {
            Some(data) => Ok(Some(String::from_utf8(data)?)),
            None => Ok(None),
        }
    }

    pub fn part_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Relationships of `part`, keyed by id, with internal targets resolved
    /// to full part names.
    pub fn relationships(&mut self, part: &str) -> Result<HashMap<String, Relationship>> {
        let (dir, file) = split_part(part);
        let rels_name = if dir.is_empty() {
            format!("_rels/{file}.rels")
        } else {
            format!("{dir}/_rels/{file}.rels")
        };
        let Some(xml) = self.read_string(&rels_name)? else {
            return Ok(HashMap::new());
        };

        let mut rels = HashMap::new();
        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                    if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                        let external = attr(&e, b"TargetMode").as_deref() == Some("External");
                        let target = if external { target } else { resolve(dir, &target) };
                        rels.insert(id, Relationship { target, external });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(rels)
    }

    /// `dc:title` from the core properties, when set.
    pub fn core_title(&mut self) -> Result<Option<String>> {
        let Some(xml) = self.read_string("docProps/core.xml")? else {
            return Ok(None);
        };
        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        let mut in_title = false;
        let mut title = String::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"title" => in_title = true,
                Event::Text(t) if in_title => title.push_str(&t.unescape().unwrap_or_default()),
                Event::End(e) if e.local_name().as_ref() == b"title" => break,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        let title = title.trim();
        Ok((!title.is_empty()).then(|| title.to_string()))
    }
}

fn split_part(part: &str) -> (&str, &str) {
    match part.rfind('/') {
        Some(i) => (&part[..i], &part[i + 1..]),
        None => ("", part),
    }
}

/// Resolve a relationship target against the directory of its source part.
pub fn resolve(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Value of the attribute whose full or local name is `key`.
pub fn attr(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key || a.key.local_name().as_ref() == key)
        .map(|a| match a.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

/// OOXML on/off properties: present means on unless `val` says otherwise.
pub fn toggle(element: &BytesStart) -> bool {
    !matches!(attr(element, b"val").as_deref(), Some("0" | "false" | "off" | "none"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_targets() {
        assert_eq!(resolve("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve("ppt/slides", "../media/a.png"), "ppt/media/a.png");
        assert_eq!(resolve("xl", "/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }

    #[test]
    fn reads_relationships() {
        let rels = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="image" Target="media/image1.png"/>
  <Relationship Id="rId2" Type="hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
</Relationships>"#;
        let bytes = testing::package(&[("word/_rels/document.xml.rels", rels)]);
        let mut package = Package::open(&bytes).unwrap();
        let map = package.relationships("word/document.xml").unwrap();
        assert_eq!(map["rId1"].target, "word/media/image1.png");
        assert!(!map["rId1"].external);
        assert_eq!(map["rId2"].target, "https://example.com/?a=1&b=2");
        assert!(map["rId2"].external);
    }

    #[test]
    fn reads_core_title() {
        let core = r#"<cp:coreProperties xmlns:cp="cp" xmlns:dc="dc"><dc:title>Q3 Plan</dc:title></cp:coreProperties>"#;
        let bytes = testing::package(&[("docProps/core.xml", core)]);
        let mut package = Package::open(&bytes).unwrap();
        assert_eq!(package.core_title().unwrap().as_deref(), Some("Q3 Plan"));
    }

    #[test]
    fn missing_parts_are_none() {
        let bytes = testing::package(&[("a.xml", "<a/>")]);
        let mut package = Package::open(&bytes).unwrap();
        assert!(package.read("b.xml").unwrap().is_none());
        assert!(matches!(
            package.read_required("b.xml"),
            Err(ConversionError::MissingPart(_))
        ));
    }
}
