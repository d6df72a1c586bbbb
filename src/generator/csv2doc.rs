use csv::ReaderBuilder;
use std::io::Cursor;

use crate::document::{DocItem, Document, TableData};
use crate::error::{ConversionError, Result};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the delimiter that occurs most often on the first line.
pub fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or(&[]);
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, first_line.iter().filter(|b| **b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Parse CSV into table rows; the header record becomes the first row.
pub fn table_from_csv(bytes: &[u8], delimiter: u8) -> Result<TableData> {
    let cursor = Cursor::new(bytes);
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(cursor);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    Ok(TableData { rows })
}

pub fn run(bytes: &[u8]) -> Result<Document> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let table = table_from_csv(bytes, sniff_delimiter(bytes))?;

    if table.is_empty() {
        return Err(ConversionError::NoContent("empty or invalid CSV data".to_string()));
    }

    let mut document = Document::default();
    document.push(DocItem::Table(table));
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter(b"a\tb\n"), b'\t');
        assert_eq!(sniff_delimiter(b"a,b|c,d\n"), b',');
        assert_eq!(sniff_delimiter(b"single\n"), b',');
    }

    #[test]
    fn builds_one_table_with_ragged_rows() {
        let doc = run(b"\xEF\xBB\xBFname, age\nada, 36\nlinus\n").unwrap();
        assert_eq!(
            doc.items,
            vec![DocItem::Table(TableData {
                rows: vec![
                    vec!["name".to_string(), "age".to_string()],
                    vec!["ada".to_string(), "36".to_string()],
                    vec!["linus".to_string()],
                ],
            })]
        );
        assert_eq!(
            doc.export_to_markdown(),
            "| name | age |\n| --- | --- |\n| ada | 36 |\n| linus |  |"
        );
    }

    #[test]
    fn empty_csv_is_rejected() {
        assert!(matches!(run(b""), Err(ConversionError::NoContent(_))));
    }
}
