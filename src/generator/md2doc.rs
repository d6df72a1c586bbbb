use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::document::{DocItem, Document, Span, TableData, push_span, spans_text};
use crate::error::Result;

#[derive(Default)]
struct Builder {
    document: Document,
    spans: Vec<Span>,
    bold: usize,
    italic: usize,
    link: Option<String>,
    heading: Option<usize>,
    /// `true` for each open ordered list, innermost last.
    lists: Vec<bool>,
    code: Option<(Option<String>, String)>,
    table: Option<TableData>,
    cell: Option<String>,
    image: Option<(String, String)>,
}

impl Builder {
    fn text(&mut self, text: &str, code: bool) {
        if let Some((_, alt)) = &mut self.image {
            alt.push_str(text);
        } else if let Some((_, body)) = &mut self.code {
            body.push_str(text);
        } else if let Some(cell) = &mut self.cell {
            cell.push_str(text);
        } else {
            push_span(
                &mut self.spans,
                Span {
                    text: text.to_string(),
                    bold: self.bold > 0,
                    italic: self.italic > 0,
                    code,
                    link: self.link.clone(),
                },
            );
        }
    }

    /// Emit pending inline content as a list item when inside a list, as a
    /// paragraph otherwise.
    fn flush_inline(&mut self) {
        let spans = std::mem::take(&mut self.spans);
        if spans_text(&spans).trim().is_empty() {
            return;
        }
        let item = match self.lists.last() {
            Some(enumerated) => DocItem::ListItem {
                enumerated: *enumerated,
                depth: self.lists.len() - 1,
                spans,
            },
            None => DocItem::Paragraph { spans },
        };
        self.document.push(item);
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_inline();
                self.heading = Some(level as usize);
            }
            Tag::List(start) => {
                // a nested list closes the text of its parent item
                self.flush_inline();
                self.lists.push(start.is_some());
            }
            Tag::CodeBlock(kind) => {
                self.flush_inline();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::Table(_) => {
                self.flush_inline();
                self.table = Some(TableData::default());
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = &mut self.table {
                    table.rows.push(Vec::new());
                }
            }
            Tag::TableCell => self.cell = Some(String::new()),
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            Tag::Image { dest_url, .. } => self.image = Some((dest_url.to_string(), String::new())),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Item => self.flush_inline(),
            TagEnd::Heading(_) => {
                let spans = std::mem::take(&mut self.spans);
                let text = spans_text(&spans).trim().to_string();
                if let Some(level) = self.heading.take() {
                    if !text.is_empty() {
                        self.document.push(DocItem::SectionHeader { level, text });
                    }
                }
            }
            TagEnd::List(_) => {
                self.flush_inline();
                self.lists.pop();
            }
            TagEnd::CodeBlock => {
                if let Some((language, text)) = self.code.take() {
                    self.document.push(DocItem::Code { language, text });
                }
            }
            TagEnd::TableCell => {
                if let (Some(cell), Some(table)) = (self.cell.take(), &mut self.table) {
                    if let Some(row) = table.rows.last_mut() {
                        row.push(cell.trim().to_string());
                    }
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    if !table.is_empty() {
                        self.document.push(DocItem::Table(table));
                    }
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Link => self.link = None,
            TagEnd::Image => {
                let Some((uri, alt)) = self.image.take() else {
                    return;
                };
                if self.cell.is_some() || self.heading.is_some() {
                    self.text(&alt, false);
                    return;
                }
                self.flush_inline();
                let caption = Some(alt.trim().to_string()).filter(|a| !a.is_empty());
                self.document.push(DocItem::Picture {
                    caption,
                    uri: Some(uri),
                });
            }
            _ => {}
        }
    }
}

/// Parse markdown text into a document.
pub fn parse(markdown: &str) -> Document {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = Builder::default();
    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(tag) => builder.start(tag),
            Event::End(tag) => builder.end(tag),
            Event::Text(text) => builder.text(&text, false),
            Event::Code(code) => builder.text(&code, true),
            Event::SoftBreak | Event::HardBreak => builder.text(" ", false),
            _ => {}
        }
    }
    builder.flush_inline();
    builder.document
}

pub fn run(bytes: &[u8]) -> Result<Document> {
    let markdown = String::from_utf8(bytes.to_vec())?;
    Ok(parse(markdown.trim_start_matches('\u{feff}')))
}
