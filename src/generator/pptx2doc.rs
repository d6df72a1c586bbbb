use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::converter::package::{Package, attr};
use crate::document::{DocItem, Document, Span, TableData, push_span};
use crate::error::{ConversionError, Result};
use crate::generator::{ConversionContext, image2doc};

const PRESENTATION_PART: &str = "ppt/presentation.xml";

pub fn run(file_stream: &[u8], ctx: &mut ConversionContext) -> Result<Document> {
    let mut package = Package::open(file_stream)?;

    let slides = slide_parts(&mut package)?;
    ctx.check_pages(Some(slides.len()))?;

    let mut document = Document::default();
    document.metadata.title = package.core_title()?;
    document.metadata.num_pages = Some(slides.len());

    for (index, part) in slides.iter().enumerate() {
        let xml = package
            .read_string(part)?
            .ok_or_else(|| ConversionError::MissingPart(part.clone()))?;
        let rels = package.relationships(part)?;

        document.push(DocItem::SectionHeader {
            level: 2,
            text: format!("Slide {}", index + 1),
        });
        for block in parse_slide(&xml)? {
            match block {
                Block::Item(item) => document.push(item),
                Block::Image(rel_id) => {
                    let picture = image2doc::from_package(&mut package, &rels, &rel_id, ctx)?;
                    document.push(picture);
                }
            }
        }
    }

    Ok(document)
}

/// Slide part names in presentation order. Falls back to the numeric
/// order of `ppt/slides/slideN.xml` when the slide list is unusable.
fn slide_parts(package: &mut Package) -> Result<Vec<String>> {
    if let Some(xml) = package.read_string(PRESENTATION_PART)? {
        let rels = package.relationships(PRESENTATION_PART)?;
        let mut reader = Reader::from_str(&xml);
        let mut buf = Vec::new();
        let mut parts = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                    if let Some(rel) = attr(&e, b"r:id").and_then(|id| rels.get(&id)) {
                        parts.push(rel.target.clone());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        if !parts.is_empty() {
            return Ok(parts);
        }
    }

    let mut numbered: Vec<(usize, String)> = package
        .part_names()
        .into_iter()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name))
        })
        .collect();
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

#[derive(Debug, PartialEq)]
enum Block {
    Item(DocItem),
    Image(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Bullet {
    Inherit,
    Off,
    Char,
    AutoNumber,
}

#[derive(Default)]
struct Shape {
    placeholder: Option<String>,
    paragraphs: Vec<(usize, Bullet, Vec<Span>)>,
}

struct SlideParser {
    blocks: Vec<Block>,
    shapes: Vec<Shape>,
    paragraph: Option<(usize, Bullet, Vec<Span>)>,
    table: Option<TableData>,
    cell: Option<String>,
    in_text: bool,
    bold: bool,
    italic: bool,
}

fn parse_slide(xml: &str) -> Result<Vec<Block>> {
    let mut parser = SlideParser {
        blocks: Vec::new(),
        shapes: Vec::new(),
        paragraph: None,
        table: None,
        cell: None,
        in_text: false,
        bold: false,
        italic: false,
    };

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => parser.open(&e, false),
            Event::Empty(e) => parser.open(&e, true),
            Event::Text(t) if parser.in_text => {
                let text = t.unescape().unwrap_or_default();
                parser.push_text(&text);
            }
            Event::End(e) => parser.close(e.local_name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parser.blocks)
}

impl SlideParser {
    fn push_text(&mut self, text: &str) {
        if let Some(cell) = &mut self.cell {
            cell.push_str(text);
        } else if let Some((_, _, spans)) = &mut self.paragraph {
            push_span(
                spans,
                Span {
                    text: text.to_string(),
                    bold: self.bold,
                    italic: self.italic,
                    ..Default::default()
                },
            );
        }
    }

    fn open(&mut self, e: &BytesStart, empty: bool) {
        match e.local_name().as_ref() {
            b"sp" if !empty => self.shapes.push(Shape::default()),
            b"ph" => {
                if let Some(shape) = self.shapes.last_mut() {
                    // a placeholder without a type is a body placeholder
                    shape.placeholder = Some(attr(e, b"type").unwrap_or_else(|| "body".to_string()));
                }
            }
            b"p" if !empty && self.cell.is_none() => {
                self.paragraph = Some((0, Bullet::Inherit, Vec::new()));
            }
            b"pPr" => {
                if let Some((level, _, _)) = &mut self.paragraph {
                    *level = attr(e, b"lvl").and_then(|l| l.parse().ok()).unwrap_or(0);
                }
            }
            b"buNone" | b"buChar" | b"buAutoNum" => {
                if let Some((_, bullet, _)) = &mut self.paragraph {
                    *bullet = match e.local_name().as_ref() {
                        b"buNone" => Bullet::Off,
                        b"buChar" => Bullet::Char,
                        _ => Bullet::AutoNumber,
                    };
                }
            }
            b"r" if !empty => {
                self.bold = false;
                self.italic = false;
            }
            b"rPr" => {
                self.bold = attr(e, b"b").as_deref() == Some("1");
                self.italic = attr(e, b"i").as_deref() == Some("1");
            }
            b"t" if !empty => self.in_text = true,
            b"br" => self.push_text(" "),
            b"tbl" if !empty => self.table = Some(TableData::default()),
            b"tr" if !empty => {
                if let Some(table) = &mut self.table {
                    table.rows.push(Vec::new());
                }
            }
            b"tc" if !empty => self.cell = Some(String::new()),
            b"tc" => {
                if let Some(row) = self.table.as_mut().and_then(|t| t.rows.last_mut()) {
                    row.push(String::new());
                }
            }
            b"blip" => {
                if let Some(rel_id) = attr(e, b"r:embed") {
                    self.blocks.push(Block::Image(rel_id));
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"t" => self.in_text = false,
            b"p" => {
                if let Some(cell) = &mut self.cell {
                    if !cell.is_empty() && !cell.ends_with(' ') {
                        cell.push(' ');
                    }
                } else if let Some(paragraph) = self.paragraph.take() {
                    if let Some(shape) = self.shapes.last_mut() {
                        shape.paragraphs.push(paragraph);
                    }
                }
            }
            b"sp" => {
                if let Some(shape) = self.shapes.pop() {
                    self.finish_shape(shape);
                }
            }
            b"tc" => {
                if let (Some(cell), Some(table)) = (self.cell.take(), &mut self.table) {
                    if let Some(row) = table.rows.last_mut() {
                        row.push(cell.trim().to_string());
                    }
                }
            }
            b"tbl" => {
                if let Some(table) = self.table.take() {
                    if !table.is_empty() {
                        self.blocks.push(Block::Item(DocItem::Table(table)));
                    }
                }
            }
            _ => {}
        }
    }

    fn finish_shape(&mut self, shape: Shape) {
        let placeholder = shape.placeholder.as_deref();
        let is_title = matches!(placeholder, Some("title" | "ctrTitle"));
        let is_body = matches!(placeholder, Some("body" | "obj"));

        if is_title {
            let text = shape
                .paragraphs
                .iter()
                .flat_map(|(_, _, spans)| spans.iter().map(|s| s.text.trim()))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                self.blocks.push(Block::Item(DocItem::SectionHeader { level: 3, text }));
            }
            return;
        }

        for (level, bullet, spans) in shape.paragraphs {
            if spans.iter().all(|s| s.text.trim().is_empty()) {
                continue;
            }
            let item = match bullet {
                Bullet::Char => DocItem::ListItem {
                    enumerated: false,
                    depth: level,
                    spans,
                },
                Bullet::AutoNumber => DocItem::ListItem {
                    enumerated: true,
                    depth: level,
                    spans,
                },
                Bullet::Inherit if is_body => DocItem::ListItem {
                    enumerated: false,
                    depth: level,
                    spans,
                },
                Bullet::Inherit | Bullet::Off => DocItem::Paragraph { spans },
            };
            self.blocks.push(Block::Item(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::converter::package::testing::package;

    fn slide(inner: &str) -> String {
        format!(
            r#"<p:sld xmlns:a="a" xmlns:p="p" xmlns:r="r"><p:cSld><p:spTree>{inner}</p:spTree></p:cSld></p:sld>"#
        )
    }

    const TITLE_SHAPE: &str = r#"<p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>Roadmap</a:t></a:r></a:p></p:txBody></p:sp>"#;

    #[test]
    fn title_body_and_textbox_shapes() {
        let xml = slide(&format!(
            r#"{TITLE_SHAPE}
<p:sp><p:nvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody>
<a:p><a:r><a:t>Ship v1</a:t></a:r></a:p>
<a:p><a:pPr lvl="1"/><a:r><a:rPr b="1"/><a:t>docs</a:t></a:r></a:p>
<a:p><a:pPr><a:buNone/></a:pPr><a:r><a:t>no bullet</a:t></a:r></a:p>
</p:txBody></p:sp>
<p:sp><p:txBody><a:p><a:pPr><a:buAutoNum type="arabicPeriod"/></a:pPr><a:r><a:t>first</a:t></a:r></a:p><a:p><a:r><a:t>free text</a:t></a:r></a:p></p:txBody></p:sp>"#
        ));
        let blocks = parse_slide(&xml).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Item(DocItem::SectionHeader {
                    level: 3,
                    text: "Roadmap".into()
                }),
                Block::Item(DocItem::ListItem {
                    enumerated: false,
                    depth: 0,
                    spans: vec![Span::plain("Ship v1")]
                }),
                Block::Item(DocItem::ListItem {
                    enumerated: false,
                    depth: 1,
                    spans: vec![Span {
                        text: "docs".into(),
                        bold: true,
                        ..Default::default()
                    }]
                }),
                Block::Item(DocItem::paragraph("no bullet")),
                Block::Item(DocItem::ListItem {
                    enumerated: true,
                    depth: 0,
                    spans: vec![Span::plain("first")]
                }),
                Block::Item(DocItem::paragraph("free text")),
            ]
        );
    }

    #[test]
    fn tables_and_pictures() {
        let xml = slide(
            r#"<p:graphicFrame><a:graphic><a:graphicData><a:tbl>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>Revenue</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>1</a:t></a:r></a:p></a:txBody></a:tc><a:tc/></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:pic><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>"#,
        );
        let blocks = parse_slide(&xml).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Item(DocItem::Table(TableData {
                    rows: vec![
                        vec!["Q".to_string(), "Revenue".to_string()],
                        vec!["1".to_string(), String::new()],
                    ]
                })),
                Block::Image("rId2".into()),
            ]
        );
    }

    #[test]
    fn slides_follow_presentation_order() {
        let presentation = r#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldIdLst><p:sldId id="256" r:id="rId3"/><p:sldId id="257" r:id="rId2"/></p:sldIdLst></p:presentation>"#;
        let rels = r#"<Relationships><Relationship Id="rId2" Target="slides/slide1.xml"/><Relationship Id="rId3" Target="slides/slide2.xml"/></Relationships>"#;
        let first = slide(r#"<p:sp><p:txBody><a:p><a:r><a:t>one</a:t></a:r></a:p></p:txBody></p:sp>"#);
        let second = slide(TITLE_SHAPE);
        let bytes = package(&[
            ("ppt/presentation.xml", presentation),
            ("ppt/_rels/presentation.xml.rels", rels),
            ("ppt/slides/slide1.xml", first.as_str()),
            ("ppt/slides/slide2.xml", second.as_str()),
        ]);

        let settings = Settings::default();
        let mut ctx = ConversionContext::new(&settings);
        let doc = run(&bytes, &mut ctx).unwrap();
        assert_eq!(doc.metadata.num_pages, Some(2));
        assert_eq!(
            doc.export_to_markdown(),
            "## Slide 1\n\n### Roadmap\n\n## Slide 2\n\none"
        );
    }

    #[test]
    fn falls_back_to_numeric_slide_order() {
        let bytes = package(&[
            ("ppt/slides/slide10.xml", slide("").as_str()),
            ("ppt/slides/slide2.xml", slide("").as_str()),
            ("ppt/slides/_rels/slide2.xml.rels", "<Relationships/>"),
        ]);
        let mut package = Package::open(&bytes).unwrap();
        assert_eq!(
            slide_parts(&mut package).unwrap(),
            vec!["ppt/slides/slide2.xml", "ppt/slides/slide10.xml"]
        );
    }

    #[test]
    fn page_limit_applies_to_slides() {
        let bytes = package(&[
            ("ppt/slides/slide1.xml", slide("").as_str()),
            ("ppt/slides/slide2.xml", slide("").as_str()),
        ]);
        let settings = Settings {
            max_num_pages: Some(1),
            ..Default::default()
        };
        let mut ctx = ConversionContext::new(&settings);
        assert!(matches!(
            run(&bytes, &mut ctx),
            Err(ConversionError::TooManyPages { pages: 2, limit: 1 })
        ));
    }
}
