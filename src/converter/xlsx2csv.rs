use quick_xml::Reader;
use quick_xml::events::Event;

use crate::converter::package::{Package, attr};
use crate::error::{ConversionError, Result};

/// Configuration for xlsx to csv conversion
pub struct Xlsx2CsvConfig {
    /// Delimiter for CSV output (default: comma)
    pub delimiter: u8,
    /// Drop trailing rows that have no values at all
    pub trim_empty_rows: bool,
}

impl Default for Xlsx2CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            trim_empty_rows: true,
        }
    }
}

/// Result of xlsx to csv conversion
pub struct Xlsx2CsvResult {
    /// Sheet names in workbook order
    pub sheet_names: Vec<String>,
    /// CSV content for each sheet
    pub csv_data: Vec<String>,
}

/// Convert xlsx byte data to one CSV string per sheet.
pub fn xlsx_to_csv(data: &[u8], config: Option<Xlsx2CsvConfig>) -> Result<Xlsx2CsvResult> {
    let config = config.unwrap_or_default();
    let mut package = Package::open(data)?;

    let workbook = package.read_string("xl/workbook.xml")?
        .ok_or_else(|| ConversionError::MissingPart("xl/workbook.xml".to_string()))?;
    let rels = package.relationships("xl/workbook.xml")?;
    let shared = match package.read_string("xl/sharedStrings.xml")? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheet_names = Vec::new();
    let mut csv_data = Vec::new();
    for (name, rel_id) in workbook_sheets(&workbook)? {
        let Some(rel) = rels.get(&rel_id) else {
            tracing::warn!(sheet = %name, "sheet has no relationship target");
            continue;
        };
        let xml = package.read_string(&rel.target)?
            .ok_or_else(|| ConversionError::MissingPart(rel.target.clone()))?;
        let rows = worksheet_rows(&xml, &shared)?;
        csv_data.push(rows_to_csv_string(&rows, &config)?);
        sheet_names.push(name);
    }

    if sheet_names.is_empty() {
        return Err(ConversionError::NoContent("no sheets found in xlsx file".to_string()));
    }

    Ok(Xlsx2CsvResult {
        sheet_names,
        csv_data,
    })
}

/// `(name, relationship id)` for each sheet, in workbook order.
fn workbook_sheets(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(id)) = (attr(&e, b"name"), attr(&e, b"r:id")) {
                    sheets.push((name, id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the text in another script
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape().unwrap_or_default()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Widest sheet Excel allows, column `XFD`.
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column index of a cell reference such as `AB12`, or `None`
/// when the reference has no letters or lies beyond `XFD`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }
    let index = letters.bytes().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add((b.to_ascii_uppercase() - b'A' + 1) as usize)
    })?;
    (index <= MAX_COLUMNS).then(|| index - 1)
}

fn worksheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type: Option<String> = None;
    let mut cell_col = 0usize;
    let mut value = String::new();
    let mut capture = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_type = attr(&e, b"t");
                    cell_col = attr(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(row.len());
                    value.clear();
                }
                b"v" | b"t" => capture = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => rows.push(Vec::new()),
            Event::Text(t) if capture => value.push_str(&t.unescape().unwrap_or_default()),
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let text = match cell_type.as_deref() {
                        Some("s") => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        Some("b") => match value.trim() {
                            "1" => "TRUE".to_string(),
                            _ => "FALSE".to_string(),
                        },
                        _ => value.clone(),
                    };
                    if row.len() <= cell_col {
                        row.resize(cell_col + 1, String::new());
                    }
                    row[cell_col] = text;
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn rows_to_csv_string(rows: &[Vec<String>], config: &Xlsx2CsvConfig) -> Result<String> {
    let mut end = rows.len();
    if config.trim_empty_rows {
        while end > 0 && rows[end - 1].iter().all(|c| c.trim().is_empty()) {
            end -= 1;
        }
    }
    let columns = rows[..end].iter().map(Vec::len).max().unwrap_or(0);

    let mut output = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(config.delimiter)
            .flexible(true)
            .from_writer(&mut output);

        for row in &rows[..end] {
            let mut record = row.clone();
            record.resize(columns, String::new());
            writer.write_record(&record)?;
        }

        writer.flush()?;
    } // writer is dropped here, releasing the borrow on output

    Ok(String::from_utf8(output)?)
}
