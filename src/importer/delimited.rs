use super::format::{decode_text, Dialect};
use super::Table;
use crate::error::{BudgeryError, Result};

pub fn extract(content: &[u8], dialect: Dialect) -> Result<Table> {
    let text = decode_text(content)
        .ok_or_else(|| BudgeryError::UnsupportedFormat("content is not UTF-8 text".into()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .from_reader(text.as_bytes());

    let mut table = Table::new(rdr.headers()?.iter().map(str::to_string));
    for result in rdr.records() {
        let record = result?;
        table.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}
