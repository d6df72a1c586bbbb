use crate::converter::xlsx2csv;
use crate::document::{DocItem, Document};
use crate::error::Result;
use crate::generator::csv2doc;

/// Every sheet becomes a header followed by its table; empty sheets are
/// skipped.
pub fn run(file_stream: &[u8]) -> Result<Document> {
    let config = xlsx2csv::Xlsx2CsvConfig::default();
    let delimiter = config.delimiter;
    let csvs = xlsx2csv::xlsx_to_csv(file_stream, Some(config))?;

    let mut document = Document::default();
    for (name, csv) in csvs.sheet_names.iter().zip(csvs.csv_data.iter()) {
        let table = csv2doc::table_from_csv(csv.as_bytes(), delimiter)?;
        if table.is_empty() {
            tracing::debug!(sheet = %name, "skipping empty sheet");
            continue;
        }
        document.push(DocItem::SectionHeader {
            level: 2,
            text: name.clone(),
        });
        document.push(DocItem::Table(table));
    }

    Ok(document)
}
