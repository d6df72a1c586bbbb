//! Format-neutral document model and its renderings.
//!
//! Generators fill a [`Document`] with [`DocItem`]s in reading order; the
//! exporters turn it into markdown, plain text or JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<DocumentOrigin>,
    pub metadata: DocumentMetadata,
    pub items: Vec<DocItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOrigin {
    pub filename: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub num_pages: Option<usize>,
    pub num_characters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocItem {
    Title {
        text: String,
    },
    SectionHeader {
        level: usize,
        text: String,
    },
    Paragraph {
        spans: Vec<Span>,
    },
    ListItem {
        enumerated: bool,
        depth: usize,
        spans: Vec<Span>,
    },
    Table(TableData),
    Picture {
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Code {
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text: String,
    },
}

/// A run of inline text sharing one formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Rows of cell text; the first row is the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub rows: Vec<Vec<String>>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn same_format(&self, other: &Span) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.code == other.code
            && self.link == other.link
    }
}

/// Append `span`, merging it into the last span when the formatting matches.
pub fn push_span(spans: &mut Vec<Span>, span: Span) {
    if span.text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.same_format(&span) => last.text.push_str(&span.text),
        _ => spans.push(span),
    }
}

pub fn spans_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

impl TableData {
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(|c| c.trim().is_empty()))
    }
}

impl DocItem {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph {
            spans: vec![Span::plain(text)],
        }
    }

    /// Plain text carried by this item, without any markup.
    pub fn text(&self) -> String {
        match self {
            Self::Title { text } | Self::SectionHeader { text, .. } => text.clone(),
            Self::Paragraph { spans } | Self::ListItem { spans, .. } => spans_text(spans),
            Self::Table(table) => table
                .rows
                .iter()
                .map(|row| row.join("\t"))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Picture { caption, .. } => caption.clone().unwrap_or_default(),
            Self::Code { text, .. } => text.clone(),
        }
    }
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, item: DocItem) {
        self.items.push(item);
    }

    /// The first title, or failing that the first top-level header.
    pub fn title(&self) -> Option<String> {
        self.items
            .iter()
            .find_map(|item| match item {
                DocItem::Title { text } => Some(text.clone()),
                _ => None,
            })
            .or_else(|| {
                self.items.iter().find_map(|item| match item {
                    DocItem::SectionHeader { level: 1, text } => Some(text.clone()),
                    _ => None,
                })
            })
    }

    pub fn num_characters(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !matches!(item, DocItem::Picture { .. }))
            .map(|item| item.text().chars().count())
            .sum()
    }

    /// Fill the derived metadata fields from the current items.
    pub fn refresh_metadata(&mut self) {
        if self.metadata.title.is_none() {
            self.metadata.title = self.title();
        }
        self.metadata.num_characters = self.num_characters();
    }

    pub fn export_to_markdown(&self) -> String {
        render(&self.items, Style::Markdown)
    }

    pub fn export_to_text(&self) -> String {
        render(&self.items, Style::Text)
    }

    pub fn export_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Style {
    Markdown,
    Text,
}

fn render(items: &[DocItem], style: Style) -> String {
    let mut out = String::new();
    let mut counters: Vec<usize> = Vec::new();
    let mut prev_was_list = false;

    for item in items {
        let block = match item {
            DocItem::ListItem {
                enumerated,
                depth,
                spans,
            } => {
                counters.truncate(depth + 1);
                counters.resize(depth + 1, 0);
                let marker = if *enumerated {
                    counters[*depth] += 1;
                    format!("{}.", counters[*depth])
                } else {
                    "-".to_string()
                };
                let body = match style {
                    Style::Markdown => render_spans(spans),
                    Style::Text => spans_text(spans).trim().to_string(),
                };
                if body.is_empty() {
                    continue;
                }
                if !out.is_empty() {
                    out.push_str(if prev_was_list { "\n" } else { "\n\n" });
                }
                out.push_str(&"    ".repeat(*depth));
                out.push_str(&marker);
                out.push(' ');
                out.push_str(&body);
                prev_was_list = true;
                continue;
            }
            _ => render_block(item, style),
        };

        counters.clear();
        prev_was_list = false;
        let Some(block) = block else { continue };
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&block);
    }

    out.trim().to_string()
}

fn render_block(item: &DocItem, style: Style) -> Option<String> {
    let block = match (item, style) {
        (DocItem::Title { text }, Style::Markdown) => format!("# {}", escape(text.trim())),
        (DocItem::SectionHeader { level, text }, Style::Markdown) => {
            format!("{} {}", "#".repeat((*level).clamp(1, 6)), escape(text.trim()))
        }
        (DocItem::Paragraph { spans }, Style::Markdown) => render_spans(spans),
        (DocItem::Table(table), Style::Markdown) => render_table(table),
        (DocItem::Picture { caption, uri }, Style::Markdown) => match uri {
            Some(uri) => format!("![{}]({})", caption.as_deref().unwrap_or("Image"), uri),
            None => "<!-- image -->".to_string(),
        },
        (DocItem::Code { language, text }, Style::Markdown) => {
            let fence = "`".repeat(longest_backtick_run(text).max(2) + 1);
            format!(
                "{fence}{}\n{}\n{fence}",
                language.as_deref().unwrap_or(""),
                text.trim_end_matches('\n')
            )
        }
        (DocItem::Picture { .. }, Style::Text) => return None,
        (DocItem::Code { text, .. }, Style::Text) => text.trim_end_matches('\n').to_string(),
        (_, Style::Text) => item.text().trim().to_string(),
        (DocItem::ListItem { spans, .. }, Style::Markdown) => render_spans(spans),
    };
    if block.is_empty() { None } else { Some(block) }
}

fn render_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        let text = span.text.replace('\n', " ");
        let core = text.trim();
        if core.is_empty() {
            out.push_str(&text);
            continue;
        }
        let lead = &text[..text.len() - text.trim_start().len()];
        let trail = &text[text.trim_end().len()..];

        let mut marked = if span.code {
            code_span(core)
        } else {
            escape(core)
        };
        if span.italic {
            marked = format!("*{marked}*");
        }
        if span.bold {
            marked = format!("**{marked}**");
        }
        if let Some(link) = &span.link {
            marked = format!("[{marked}]({link})");
        }

        out.push_str(lead);
        out.push_str(&marked);
        out.push_str(trail);
    }

    let out = out.trim();
    // a leading hash would turn the block into a heading
    if out.starts_with('#') {
        format!("\\{out}")
    } else {
        out.to_string()
    }
}

/// Backslash-escape characters that markdown would read as inline markup.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}

fn code_span(text: &str) -> String {
    let fence = "`".repeat(longest_backtick_run(text) + 1);
    let pad = if text.starts_with('`') || text.ends_with('`') { " " } else { "" };
    format!("{fence}{pad}{text}{pad}{fence}")
}

fn render_table(table: &TableData) -> String {
    let columns = table.column_count();
    if columns == 0 || table.is_empty() {
        return String::new();
    }

    let row_line = |row: &[String]| {
        let mut line = String::from("|");
        for i in 0..columns {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            let cell = cell.replace('|', "\\|").replace(['\r', '\n'], " ");
            line.push(' ');
            line.push_str(cell.trim());
            line.push_str(" |");
        }
        line
    };

    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(row_line(&table.rows[0]));
    lines.push(format!("|{}", " --- |".repeat(columns)));
    for row in table.rows.iter().skip(1) {
        lines.push(row_line(row));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(enumerated: bool, depth: usize, text: &str) -> DocItem {
        DocItem::ListItem {
            enumerated,
            depth,
            spans: vec![Span::plain(text)],
        }
    }

    #[test]
    fn merges_spans_with_matching_format() {
        let mut spans = Vec::new();
        push_span(&mut spans, Span::plain("Hello "));
        push_span(&mut spans, Span::plain("world"));
        push_span(
            &mut spans,
            Span {
                text: "!".into(),
                bold: true,
                ..Default::default()
            },
        );
        push_span(&mut spans, Span::plain(""));
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Hello world");
    }

    #[test]
    fn markdown_headers_paragraphs_and_spans() {
        let mut doc = Document::new("t");
        doc.push(DocItem::Title {
            text: "Report".into(),
        });
        doc.push(DocItem::SectionHeader {
            level: 2,
            text: "Intro".into(),
        });
        doc.push(DocItem::Paragraph {
            spans: vec![
                Span::plain("This is "),
                Span {
                    text: "bold ".into(),
                    bold: true,
                    ..Default::default()
                },
                Span {
                    text: "link".into(),
                    link: Some("https://example.com".into()),
                    ..Default::default()
                },
            ],
        });
        assert_eq!(
            doc.export_to_markdown(),
            "# Report\n\n## Intro\n\nThis is **bold** [link](https://example.com)"
        );
    }

    #[test]
    fn literal_markup_characters_are_escaped() {
        let mut doc = Document::new("t");
        doc.push(DocItem::SectionHeader {
            level: 2,
            text: "snake_case".into(),
        });
        doc.push(DocItem::paragraph("# not a heading"));
        doc.push(DocItem::Paragraph {
            spans: vec![
                Span::plain("*draft* see [1] "),
                Span {
                    text: "a`b".into(),
                    code: true,
                    ..Default::default()
                },
            ],
        });
        assert_eq!(
            doc.export_to_markdown(),
            "## snake\\_case\n\n\\# not a heading\n\n\\*draft\\* see \\[1\\] ``a`b``"
        );
    }

    #[test]
    fn code_blocks_are_fenced_past_inner_backticks() {
        let mut doc = Document::new("t");
        doc.push(DocItem::Code {
            language: Some("rust".into()),
            text: "fn main() {}\n".into(),
        });
        doc.push(DocItem::Code {
            language: None,
            text: "```\nx\n```".into(),
        });
        assert_eq!(
            doc.export_to_markdown(),
            "```rust\nfn main() {}\n```\n\n````\n```\nx\n```\n````"
        );
    }

    #[test]
    fn lists_are_numbered_per_depth_and_restart() {
        let mut doc = Document::new("t");
        doc.push(list(true, 0, "one"));
        doc.push(list(false, 1, "nested"));
        doc.push(list(true, 0, "two"));
        doc.push(DocItem::paragraph("break"));
        doc.push(list(true, 0, "again"));
        assert_eq!(
            doc.export_to_markdown(),
            "1. one\n    - nested\n2. two\n\nbreak\n\n1. again"
        );
    }

    #[test]
    fn tables_are_padded_and_escaped() {
        let mut doc = Document::new("t");
        doc.push(DocItem::Table(TableData {
            rows: vec![
                vec!["a".into(), "b".into()],
                vec!["x|y".into()],
                vec!["1".into(), "2".into(), "3".into()],
            ],
        }));
        assert_eq!(
            doc.export_to_markdown(),
            "| a | b |  |\n| --- | --- | --- |\n| x\\|y |  |  |\n| 1 | 2 | 3 |"
        );
    }

    #[test]
    fn pictures_without_uri_render_placeholder() {
        let mut doc = Document::new("t");
        doc.push(DocItem::Picture {
            caption: None,
            uri: None,
        });
        doc.push(DocItem::Picture {
            caption: Some("cat".into()),
            uri: Some("cat.png".into()),
        });
        assert_eq!(doc.export_to_markdown(), "<!-- image -->\n\n![cat](cat.png)");
        assert_eq!(doc.export_to_text(), "");
    }

    #[test]
    fn text_export_drops_markup() {
        let mut doc = Document::new("t");
        doc.push(DocItem::SectionHeader {
            level: 3,
            text: "Head".into(),
        });
        doc.push(list(false, 0, "item"));
        doc.push(DocItem::Code {
            language: Some("rust".into()),
            text: "fn main() {}\n".into(),
        });
        assert_eq!(doc.export_to_text(), "Head\n\n- item\n\nfn main() {}");
    }

    #[test]
    fn metadata_counts_characters_and_finds_title() {
        let mut doc = Document::new("t");
        doc.push(DocItem::SectionHeader {
            level: 1,
            text: "Top".into(),
        });
        doc.push(DocItem::paragraph("abc"));
        doc.refresh_metadata();
        assert_eq!(doc.metadata.title.as_deref(), Some("Top"));
        assert_eq!(doc.metadata.num_characters, 6);
    }

    #[test]
    fn json_export_tags_items() {
        let mut doc = Document::new("t");
        doc.push(DocItem::paragraph("x"));
        let json = doc.export_to_json().unwrap();
        assert!(json.contains("\"type\": \"paragraph\""));
    }
}
