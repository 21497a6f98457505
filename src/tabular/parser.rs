use super::{CellValue, ParsedTable, TabularError};

/// Separators the sniffer considers, in preference order.
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// How many lines of the file the sniffer looks at.
const SNIFF_SAMPLE_LINES: usize = 20;

enum SourceFormat {
    Delimited,
    Spreadsheet,
}

/// Parse raw file bytes into a table, using the declared content type and
/// the filename suffix as format hints. Both the ingestion worker and the
/// statistics endpoints call this with the same hints, so the schema either
/// one derives is reproducible from the stored bytes alone.
pub fn parse(
    bytes: &[u8],
    declared_type: Option<&str>,
    filename: &str,
) -> Result<ParsedTable, TabularError> {
    match detect_format(declared_type, filename)? {
        SourceFormat::Spreadsheet => parse_spreadsheet(bytes),
        SourceFormat::Delimited => parse_delimited(bytes),
    }
}

fn detect_format(
    declared_type: Option<&str>,
    filename: &str,
) -> Result<SourceFormat, TabularError> {
    let declared = declared_type.unwrap_or("").to_ascii_lowercase();
    let name = filename.to_ascii_lowercase();

    if declared.contains("excel")
        || declared.contains("spreadsheetml")
        || name.ends_with(".xlsx")
        || name.ends_with(".xls")
    {
        return Ok(SourceFormat::Spreadsheet);
    }
    if declared.contains("csv")
        || declared.starts_with("text/")
        || name.ends_with(".csv")
        || name.ends_with(".tsv")
        || name.ends_with(".txt")
    {
        return Ok(SourceFormat::Delimited);
    }
    Err(TabularError::UnsupportedFormat(format!(
        "'{}' ({})",
        filename,
        if declared.is_empty() {
            "no declared type"
        } else {
            &declared
        }
    )))
}

/// Decode bytes to text: UTF-8 with BOM stripping first, WINDOWS-1252 as
/// the fallback. The fallback maps every byte, so decoding never fails.
fn decode_text(bytes: &[u8]) -> String {
    let stripped = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    match std::str::from_utf8(stripped) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(stripped);
            decoded.into_owned()
        }
    }
}

/// Detect the field separator from a sample of the first lines. A candidate
/// qualifies when it appears in every sampled line the same number of
/// times; the single qualifier with the highest count wins. No qualifier,
/// or two tied qualifiers, means the sample is ambiguous and sniffing
/// fails.
fn sniff_delimiter(text: &str) -> Option<u8> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_SAMPLE_LINES)
        .collect();
    if lines.is_empty() {
        return None;
    }

    let mut best: Option<(u8, usize)> = None;
    let mut ambiguous = false;
    for &candidate in &DELIMITER_CANDIDATES {
        let first = lines[0].bytes().filter(|&b| b == candidate).count();
        if first == 0 {
            continue;
        }
        let consistent = lines
            .iter()
            .all(|l| l.bytes().filter(|&b| b == candidate).count() == first);
        if !consistent {
            continue;
        }
        match best {
            Some((_, count)) if first > count => {
                best = Some((candidate, first));
                ambiguous = false;
            }
            Some((_, count)) if first == count => ambiguous = true,
            None => best = Some((candidate, first)),
            _ => {}
        }
    }

    if ambiguous { None } else { best.map(|(c, _)| c) }
}

/// Heuristic used when sniffing fails: whichever of `;` and `,` occurs more
/// often in the first line wins, comma on a tie or when neither appears.
fn fallback_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

fn read_delimited(text: &str, delimiter: u8) -> Result<ParsedTable, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|_| TabularError::Malformed)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|_| TabularError::Malformed)?;
        rows.push(record.iter().map(CellValue::from_field).collect());
    }

    Ok(ParsedTable::new(headers, rows))
}

fn parse_delimited(bytes: &[u8]) -> Result<ParsedTable, TabularError> {
    let text = decode_text(bytes);
    if text.trim().is_empty() {
        return Err(TabularError::Empty);
    }

    let delimiter = sniff_delimiter(&text).unwrap_or_else(|| fallback_delimiter(&text));
    let mut tried = vec![delimiter];
    let mut table = read_delimited(&text, delimiter).ok();

    // A single resulting column usually means the guess was wrong and the
    // real separator is sitting inside the header text.
    if let Some(current) = &table {
        if current.column_count() == 1 {
            let header = &current.headers()[0];
            let alternate = DELIMITER_CANDIDATES
                .iter()
                .copied()
                .find(|&c| c != delimiter && header.contains(c as char));
            if let Some(alternate) = alternate {
                tried.push(alternate);
                if let Ok(reparsed) = read_delimited(&text, alternate) {
                    if reparsed.column_count() > 1 {
                        table = Some(reparsed);
                    }
                }
            }
        }
    }

    // Last resort: one retry with whichever of ','/';' has not been tried.
    if table.as_ref().map(|t| t.column_count() == 0).unwrap_or(true) {
        if let Some(untried) = [b',', b';'].into_iter().find(|c| !tried.contains(c)) {
            table = read_delimited(&text, untried)
                .ok()
                .filter(|t| t.column_count() > 0);
        }
    }

    let table = table
        .filter(|t| t.column_count() > 0)
        .ok_or(TabularError::Malformed)?;
    if table.row_count() == 0 {
        return Err(TabularError::Empty);
    }
    Ok(table)
}

#[cfg(feature = "xlsx")]
fn parse_spreadsheet(bytes: &[u8]) -> Result<ParsedTable, TabularError> {
    use calamine::Reader;

    let cursor = std::io::Cursor::new(bytes);
    let mut workbook =
        calamine::open_workbook_auto_from_rs(cursor).map_err(|_| TabularError::Malformed)?;
    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => Ok(sheet_to_table(&range)),
        Some(Err(_)) => Err(TabularError::Malformed),
        None => Ok(ParsedTable::empty()),
    }
}

#[cfg(not(feature = "xlsx"))]
fn parse_spreadsheet(_bytes: &[u8]) -> Result<ParsedTable, TabularError> {
    Err(TabularError::MissingDependency(
        "built without the xlsx feature".to_string(),
    ))
}

#[cfg(feature = "xlsx")]
fn sheet_cell(cell: &calamine::DataType) -> CellValue {
    use calamine::DataType;

    match cell {
        DataType::Empty => CellValue::Missing,
        DataType::Float(f) => CellValue::Number(*f),
        DataType::Int(i) => CellValue::Number(*i as f64),
        DataType::Bool(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
        DataType::DateTime(serial) => CellValue::Number(*serial),
        DataType::Error(_) => CellValue::Missing,
        DataType::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                CellValue::Missing
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
        other => {
            let rendered = other.to_string();
            let trimmed = rendered.trim();
            if trimmed.is_empty() {
                CellValue::Missing
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
    }
}

/// First row is the header, the rest is data. Trailing columns with an
/// empty header cell and no data beneath are dropped; a sheet whose first
/// row is entirely empty gets synthesized Column_N headers.
#[cfg(feature = "xlsx")]
fn sheet_to_table(range: &calamine::Range<calamine::DataType>) -> ParsedTable {
    if range.is_empty() {
        return ParsedTable::empty();
    }

    let mut sheet_rows = range.rows();
    let header_cells: Vec<CellValue> = match sheet_rows.next() {
        Some(row) => row.iter().map(sheet_cell).collect(),
        None => return ParsedTable::empty(),
    };
    let data: Vec<Vec<CellValue>> = sheet_rows
        .map(|row| row.iter().map(sheet_cell).collect())
        .collect();

    let mut width = range.width();
    while width > 0 {
        let idx = width - 1;
        let header_empty = header_cells
            .get(idx)
            .map(CellValue::is_missing)
            .unwrap_or(true);
        let column_empty = data
            .iter()
            .all(|row| row.get(idx).map(CellValue::is_missing).unwrap_or(true));
        if header_empty && column_empty {
            width -= 1;
        } else {
            break;
        }
    }
    if width == 0 {
        return ParsedTable::empty();
    }

    let mut headers: Vec<String> = header_cells
        .iter()
        .take(width)
        .map(|c| c.to_string().trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        headers = (1..=width).map(|i| format!("Column_{}", i)).collect();
    }

    let rows: Vec<Vec<CellValue>> = data
        .into_iter()
        .map(|row| row.into_iter().take(width).collect())
        .collect();
    ParsedTable::new(headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_single_consistent_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c\nd,e,f"), Some(b','));
        assert_eq!(sniff_delimiter("a;b;c\nd;e;f"), Some(b';'));
        assert_eq!(sniff_delimiter("a\tb\nc\td"), Some(b'\t'));
    }

    #[test]
    fn sniff_fails_on_ambiguous_sample() {
        // ',' and ';' are both perfectly consistent, so neither wins.
        assert_eq!(sniff_delimiter("a,b;c\nd,e;f"), None);
        assert_eq!(sniff_delimiter(""), None);
        assert_eq!(sniff_delimiter("plainword\nanother"), None);
    }

    #[test]
    fn sniff_skips_inconsistent_candidates() {
        // ';' count varies between lines, '|' stays at one.
        assert_eq!(sniff_delimiter("a;b|c\nd;e;f|g"), Some(b'|'));
    }

    #[test]
    fn fallback_prefers_majority_and_comma_on_tie() {
        assert_eq!(fallback_delimiter("a;b;c,d"), b';');
        assert_eq!(fallback_delimiter("a,b,c;d"), b',');
        assert_eq!(fallback_delimiter("a,b;c"), b',');
        assert_eq!(fallback_delimiter("no delimiters here"), b',');
    }

    #[test]
    fn decodes_latin1_when_utf8_fails() {
        let text = decode_text(b"caf\xe9;1");
        assert_eq!(text, "café;1");
    }

    #[test]
    fn strips_utf8_bom() {
        let text = decode_text(b"\xef\xbb\xbfname,age");
        assert_eq!(text, "name,age");
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let err = parse(b"\x00\x01", Some("application/octet-stream"), "blob.bin").unwrap_err();
        assert!(matches!(err, TabularError::UnsupportedFormat(_)));
    }

    #[test]
    fn header_only_input_is_empty() {
        let err = parse(b"name,age", Some("text/csv"), "data.csv").unwrap_err();
        assert_eq!(err, TabularError::Empty);
        let err = parse(b"   \n", Some("text/csv"), "data.csv").unwrap_err();
        assert_eq!(err, TabularError::Empty);
    }

    #[test]
    fn single_column_header_triggers_reparse() {
        // Pipe counts are inconsistent, so sniffing fails; the heuristic
        // picks ',' and the one-column result exposes the real separator.
        let table = parse(b"a|b\nc|d|e", Some("text/csv"), "data.csv").unwrap();
        assert_eq!(table.headers(), ["a", "b"]);
        assert_eq!(table.column_count(), 2);
    }

    #[cfg(feature = "xlsx")]
    mod sheet {
        use super::super::*;
        use calamine::{DataType, Range};

        #[test]
        fn empty_sheet_yields_empty_table() {
            let range: Range<DataType> = Range::empty();
            let table = sheet_to_table(&range);
            assert_eq!(table.row_count(), 0);
            assert_eq!(table.column_count(), 0);
            assert!(table.headers().is_empty());
        }

        #[test]
        fn trailing_empty_columns_are_dropped() {
            let mut range: Range<DataType> = Range::new((0, 0), (1, 2));
            range.set_value((0, 0), DataType::String("name".into()));
            range.set_value((0, 1), DataType::String("age".into()));
            range.set_value((1, 0), DataType::String("Ada".into()));
            range.set_value((1, 1), DataType::Int(30));
            // column 2 stays entirely empty
            let table = sheet_to_table(&range);
            assert_eq!(table.headers(), ["name", "age"]);
            assert_eq!(table.column_count(), 2);
            assert_eq!(table.row_count(), 1);
        }

        #[test]
        fn unnamed_column_with_data_is_kept() {
            let mut range: Range<DataType> = Range::new((0, 0), (1, 1));
            range.set_value((0, 0), DataType::String("name".into()));
            range.set_value((1, 0), DataType::String("Ada".into()));
            range.set_value((1, 1), DataType::Int(30));
            let table = sheet_to_table(&range);
            assert_eq!(table.headers(), ["name", ""]);
            assert_eq!(table.column_count(), 2);
        }

        #[test]
        fn all_empty_header_row_synthesizes_names() {
            let mut range: Range<DataType> = Range::new((0, 0), (1, 1));
            range.set_value((1, 0), DataType::Int(1));
            range.set_value((1, 1), DataType::Int(2));
            let table = sheet_to_table(&range);
            assert_eq!(table.headers(), ["Column_1", "Column_2"]);
            assert_eq!(table.row_count(), 1);
        }
    }
}
