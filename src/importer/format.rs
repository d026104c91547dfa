use crate::error::{BudgeryError, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &str = "\u{feff}";

const DELIMITERS: &[u8] = b",\t;|";
/// Lines inspected when sniffing the dialect.
const SAMPLE_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Delimited(Dialect),
    Spreadsheet,
}

/// Decodes delimited text: UTF-8, BOM stripped, no NUL bytes.
pub fn decode_text(content: &[u8]) -> Option<&str> {
    if content.contains(&0) {
        return None;
    }
    let text = std::str::from_utf8(content).ok()?;
    Some(text.strip_prefix(UTF8_BOM).unwrap_or(text))
}

/// Sniffs the container by content. The file name plays no part.
pub fn detect(content: &[u8]) -> Result<Format> {
    if content.starts_with(ZIP_MAGIC) || content.starts_with(OLE2_MAGIC) {
        return Ok(Format::Spreadsheet);
    }
    let text = decode_text(content)
        .ok_or_else(|| BudgeryError::UnsupportedFormat("content is not UTF-8 text".into()))?;
    let dialect = sniff_dialect(text)
        .ok_or_else(|| BudgeryError::UnsupportedFormat("no delimited columns found".into()))?;
    tracing::debug!(
        delimiter = %(dialect.delimiter as char),
        quote = %(dialect.quote as char),
        "sniffed delimited text"
    );
    Ok(Format::Delimited(dialect))
}

fn sniff_dialect(text: &str) -> Option<Dialect> {
    let sample: String = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    if sample.is_empty() {
        return None;
    }
    let quote = sniff_quote(&sample);

    // (consistent across the sample, column count of the first line)
    let mut best: Option<(bool, usize, u8)> = None;
    for &delimiter in DELIMITERS {
        let counts = field_counts(&sample, delimiter, quote);
        let Some(&first) = counts.first() else { continue };
        if first < 2 {
            continue;
        }
        let consistent = counts.iter().all(|&c| c == first);
        let candidate = (consistent, first, delimiter);
        if best.map_or(true, |(bc, bn, _)| (consistent, first) > (bc, bn)) {
            best = Some(candidate);
        }
    }
    best.map(|(_, _, delimiter)| Dialect { delimiter, quote })
}

fn field_counts(sample: &str, delimiter: u8, quote: u8) -> Vec<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quote(quote)
        .from_reader(sample.as_bytes());
    rdr.records()
        .map_while(|r| r.ok())
        .map(|r| r.len())
        .collect()
}

/// Single quotes only count as a quote character when double quotes never
/// appear and some field is wrapped in them.
fn sniff_quote(sample: &str) -> u8 {
    if sample.contains('"') {
        return b'"';
    }
    let wrapped = sample.lines().any(|line| {
        DELIMITERS.iter().any(|&d| {
            line.split(d as char).any(|field| {
                let field = field.trim();
                field.len() >= 2 && field.starts_with('\'') && field.ends_with('\'')
            })
        })
    });
    if wrapped {
        b'\''
    } else {
        b'"'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_workbooks_by_magic() {
        assert_eq!(detect(b"PK\x03\x04rest-of-zip").unwrap(), Format::Spreadsheet);
        let mut ole = OLE2_MAGIC.to_vec();
        ole.extend_from_slice(b"legacy");
        assert_eq!(detect(&ole).unwrap(), Format::Spreadsheet);
    }

    #[test]
    fn test_detects_comma_csv_with_quoted_commas() {
        let text = b"Date, Time, Amount\n2023-01-12,18:42:07,\"1,000.00\"\n";
        assert_eq!(
            detect(text).unwrap(),
            Format::Delimited(Dialect { delimiter: b',', quote: b'"' })
        );
    }

    #[test]
    fn test_prefers_consistent_delimiter() {
        let text = b"a;b;c\n1,5;2;3\n4;5,5;6\n";
        let Format::Delimited(dialect) = detect(text).unwrap() else {
            panic!("expected delimited text");
        };
        assert_eq!(dialect.delimiter, b';');
    }

    #[test]
    fn test_detects_tabs_and_single_quotes() {
        let text = b"Date\tDescription\n01/02/2023\t'COFFEE SHOP'\n";
        let Format::Delimited(dialect) = detect(text).unwrap() else {
            panic!("expected delimited text");
        };
        assert_eq!(dialect, Dialect { delimiter: b'\t', quote: b'\'' });
    }

    #[test]
    fn test_strips_bom() {
        let text = "\u{feff}Date,Amount\n".as_bytes();
        assert_eq!(decode_text(text), Some("Date,Amount\n"));
        assert!(matches!(detect(text).unwrap(), Format::Delimited(_)));
    }

    #[test]
    fn test_rejects_binary_and_single_column_text() {
        for content in [
            &b"\x00\x01\x02\x03"[..],
            &b"\xff\xfe\x00D\x00a"[..],
            &b"just some prose without columns\nsecond line\n"[..],
            &b""[..],
        ] {
            assert!(matches!(detect(content), Err(BudgeryError::UnsupportedFormat(_))));
        }
    }
}
