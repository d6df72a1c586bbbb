use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::converter::package::{Package, Relationship, attr, toggle};
use crate::document::{DocItem, Document, Span, TableData, push_span, spans_text};
use crate::error::{ConversionError, Result};
use crate::generator::{ConversionContext, image2doc};

const DOCUMENT_PART: &str = "word/document.xml";

pub fn run(file_stream: &[u8], ctx: &mut ConversionContext) -> Result<Document> {
    let mut package = Package::open(file_stream)?;

    let xml = package
        .read_string(DOCUMENT_PART)?
        .ok_or_else(|| ConversionError::MissingPart(DOCUMENT_PART.to_string()))?;
    let rels = package.relationships(DOCUMENT_PART)?;
    let styles = match package.read_string("word/styles.xml")? {
        Some(xml) => parse_styles(&xml)?,
        None => HashMap::new(),
    };
    let numbering = match package.read_string("word/numbering.xml")? {
        Some(xml) => Numbering::parse(&xml)?,
        None => Numbering::default(),
    };

    let blocks = parse_body(&xml, &styles, &numbering, &rels)?;

    let mut document = Document::default();
    document.metadata.title = package.core_title()?;
    for block in blocks {
        match block {
            Block::Item(item) => document.push(item),
            Block::Image(rel_id) => {
                let picture = image2doc::from_package(&mut package, &rels, &rel_id, ctx)?;
                document.push(picture);
            }
        }
    }
    Ok(document)
}

/// Body content in reading order; images are resolved once parsing is done.
#[derive(Debug, PartialEq)]
enum Block {
    Item(DocItem),
    Image(String),
}

#[derive(Debug, PartialEq)]
enum ParagraphRole {
    Title,
    Header(usize),
    List { enumerated: bool, depth: usize },
}

/// Heading or list role implied by a paragraph style name.
fn role_for_style(style_name: &str) -> Option<ParagraphRole> {
    let compact: String = style_name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let number = || {
        compact
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<usize>()
            .ok()
    };

    if compact == "title" {
        return Some(ParagraphRole::Title);
    }
    if compact.contains("subtitle") {
        return Some(ParagraphRole::Header(2));
    }
    if compact.starts_with("heading") {
        return Some(ParagraphRole::Header(number().unwrap_or(1).clamp(1, 6)));
    }
    if compact.starts_with("listbullet") || compact.starts_with("listnumber") {
        return Some(ParagraphRole::List {
            enumerated: compact.starts_with("listnumber"),
            depth: number().unwrap_or(1).saturating_sub(1),
        });
    }
    None
}

/// Style id to display name.
fn parse_styles(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut styles = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"style" => {
                current = attr(&e, b"styleId");
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"name" => {
                if let (Some(id), Some(name)) = (current.take(), attr(&e, b"val")) {
                    styles.insert(id, name);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"style" => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(styles)
}

/// Number formats per `(numId, ilvl)`, resolved through abstract numbering.
#[derive(Debug, Default)]
struct Numbering {
    formats: HashMap<(String, usize), String>,
}

impl Numbering {
    fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut abstract_formats: HashMap<String, HashMap<usize, String>> = HashMap::new();
        let mut nums: Vec<(String, String)> = Vec::new();
        let mut abstract_id: Option<String> = None;
        let mut level: Option<usize> = None;
        let mut num_id: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = attr(&e, b"abstractNumId"),
                    b"lvl" => level = attr(&e, b"ilvl").and_then(|l| l.parse().ok()),
                    b"numFmt" => {
                        if let (Some(id), Some(lvl), Some(fmt)) =
                            (&abstract_id, level, attr(&e, b"val"))
                        {
                            abstract_formats.entry(id.clone()).or_default().insert(lvl, fmt);
                        }
                    }
                    b"num" => num_id = attr(&e, b"numId"),
                    b"abstractNumId" => {
                        if let (Some(num), Some(target)) = (num_id.take(), attr(&e, b"val")) {
                            nums.push((num, target));
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = None,
                    b"lvl" => level = None,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let mut formats = HashMap::new();
        for (num, target) in nums {
            if let Some(levels) = abstract_formats.get(&target) {
                for (lvl, fmt) in levels {
                    formats.insert((num.clone(), *lvl), fmt.clone());
                }
            }
        }
        Ok(Self { formats })
    }

    /// Anything but an explicit bullet format counts as numbered; unknown
    /// definitions default to bullets.
    fn is_enumerated(&self, num_id: &str, level: usize) -> bool {
        self.formats
            .get(&(num_id.to_string(), level))
            .is_some_and(|fmt| fmt != "bullet" && fmt != "none")
    }
}

#[derive(Default)]
struct Paragraph {
    style: Option<String>,
    num_id: Option<String>,
    level: usize,
    spans: Vec<Span>,
    images: Vec<String>,
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    cell: Option<String>,
    images: Vec<String>,
}

struct BodyParser<'a> {
    styles: &'a HashMap<String, String>,
    numbering: &'a Numbering,
    rels: &'a HashMap<String, Relationship>,
    blocks: Vec<Block>,
    paragraph: Option<Paragraph>,
    // paragraphs suspended by a text box opened inside them
    outer: Vec<Paragraph>,
    tables: Vec<TableBuilder>,
    fallback: usize,
    bold: bool,
    italic: bool,
    in_run: bool,
    in_text: bool,
    link: Option<String>,
}

fn parse_body(
    xml: &str,
    styles: &HashMap<String, String>,
    numbering: &Numbering,
    rels: &HashMap<String, Relationship>,
) -> Result<Vec<Block>> {
    let mut parser = BodyParser {
        styles,
        numbering,
        rels,
        blocks: Vec::new(),
        paragraph: None,
        outer: Vec::new(),
        tables: Vec::new(),
        fallback: 0,
        bold: false,
        italic: false,
        in_run: false,
        in_text: false,
        link: None,
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

impl BodyParser<'_> {
    fn push_text(&mut self, text: &str) {
        let span = Span {
            text: text.to_string(),
            bold: self.bold,
            italic: self.italic,
            code: false,
            link: self.link.clone(),
        };
        if let Some(paragraph) = &mut self.paragraph {
            push_span(&mut paragraph.spans, span);
        }
    }

    fn open(&mut self, e: &BytesStart, empty: bool) {
        let name = e.local_name();
        // mc:Fallback repeats the mc:Choice content in legacy markup
        if name.as_ref() == b"Fallback" && !empty {
            self.fallback += 1;
        }
        if self.fallback > 0 {
            return;
        }

        match name.as_ref() {
            b"p" if !empty => {
                if let Some(current) = self.paragraph.take() {
                    self.outer.push(current);
                }
                self.paragraph = Some(Paragraph::default());
            }
            b"pStyle" => {
                if let Some(paragraph) = &mut self.paragraph {
                    paragraph.style = attr(e, b"val");
                }
            }
            b"numId" => {
                if let Some(paragraph) = &mut self.paragraph {
                    paragraph.num_id = attr(e, b"val");
                }
            }
            b"ilvl" => {
                if let Some(paragraph) = &mut self.paragraph {
                    paragraph.level = attr(e, b"val").and_then(|v| v.parse().ok()).unwrap_or(0);
                }
            }
            b"r" if !empty => {
                self.in_run = true;
                self.bold = false;
                self.italic = false;
            }
            b"b" if self.in_run => self.bold = toggle(e),
            b"i" if self.in_run => self.italic = toggle(e),
            b"t" if !empty && self.in_run => self.in_text = true,
            b"tab" | b"br" | b"cr" if self.in_run => self.push_text(" "),
            b"hyperlink" if !empty => {
                self.link = attr(e, b"r:id")
                    .and_then(|id| self.rels.get(&id))
                    .filter(|rel| rel.external)
                    .map(|rel| rel.target.clone());
            }
            b"blip" | b"imagedata" => {
                let rel_id = attr(e, b"r:embed").or_else(|| attr(e, b"r:id"));
                if let (Some(rel_id), Some(paragraph)) = (rel_id, &mut self.paragraph) {
                    paragraph.images.push(rel_id);
                }
            }
            b"tbl" if !empty => self.tables.push(TableBuilder::default()),
            b"tr" if !empty => {
                if let Some(table) = self.tables.last_mut() {
                    table.rows.push(Vec::new());
                }
            }
            b"tc" if !empty => {
                if let Some(table) = self.tables.last_mut() {
                    table.cell = Some(String::new());
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        if self.fallback > 0 {
            if name == b"Fallback" {
                self.fallback -= 1;
            }
            return;
        }

        match name {
            b"t" => self.in_text = false,
            b"r" => {
                self.in_run = false;
                self.bold = false;
                self.italic = false;
            }
            b"hyperlink" => self.link = None,
            b"p" => {
                let Some(paragraph) = self.paragraph.take() else {
                    return;
                };
                match self.outer.pop() {
                    Some(mut outer) => {
                        if !outer.spans.is_empty() && !paragraph.spans.is_empty() {
                            push_span(&mut outer.spans, Span::plain(" "));
                        }
                        for span in paragraph.spans {
                            push_span(&mut outer.spans, span);
                        }
                        outer.images.extend(paragraph.images);
                        self.paragraph = Some(outer);
                    }
                    None => self.finish_paragraph(paragraph),
                }
            }
            b"tc" => {
                if let Some(table) = self.tables.last_mut() {
                    if let (Some(cell), Some(row)) = (table.cell.take(), table.rows.last_mut()) {
                        row.push(cell.trim().to_string());
                    }
                }
            }
            b"tbl" => {
                if let Some(table) = self.tables.pop() {
                    self.finish_table(table);
                }
            }
            _ => {}
        }
    }

    fn finish_paragraph(&mut self, paragraph: Paragraph) {
        let text = spans_text(&paragraph.spans);

        // paragraphs inside a cell only contribute their text
        if let Some(table) = self.tables.last_mut() {
            if let Some(cell) = &mut table.cell {
                let text = text.trim();
                if !text.is_empty() {
                    if !cell.is_empty() {
                        cell.push(' ');
                    }
                    cell.push_str(text);
                }
                table.images.extend(paragraph.images);
                return;
            }
        }

        if !text.trim().is_empty() {
            let style_role = paragraph
                .style
                .as_ref()
                .and_then(|id| role_for_style(self.styles.get(id).unwrap_or(id)));
            let list_role = paragraph
                .num_id
                .as_deref()
                .filter(|id| *id != "0")
                .map(|id| ParagraphRole::List {
                    enumerated: self.numbering.is_enumerated(id, paragraph.level),
                    depth: paragraph.level,
                });

            let item = match (style_role, list_role) {
                (Some(ParagraphRole::Title), _) => DocItem::Title {
                    text: text.trim().to_string(),
                },
                (Some(ParagraphRole::Header(level)), _) => DocItem::SectionHeader {
                    level,
                    text: text.trim().to_string(),
                },
                (_, Some(ParagraphRole::List { enumerated, depth }))
                | (Some(ParagraphRole::List { enumerated, depth }), None) => DocItem::ListItem {
                    enumerated,
                    depth,
                    spans: paragraph.spans,
                },
                _ => DocItem::Paragraph {
                    spans: paragraph.spans,
                },
            };
            self.blocks.push(Block::Item(item));
        }

        self.blocks
            .extend(paragraph.images.into_iter().map(Block::Image));
    }

    fn finish_table(&mut self, table: TableBuilder) {
        let data = TableData { rows: table.rows };

        // a nested table is flattened into the enclosing cell
        if let Some(outer) = self.tables.last_mut() {
            if let Some(cell) = &mut outer.cell {
                let text = data
                    .rows
                    .iter()
                    .flatten()
                    .filter(|c| !c.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ");
                if !cell.is_empty() && !text.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(&text);
                outer.images.extend(table.images);
                return;
            }
        }

        if !data.is_empty() {
            self.blocks.push(Block::Item(DocItem::Table(data)));
        }
        self.blocks.extend(table.images.into_iter().map(Block::Image));
    }
}
