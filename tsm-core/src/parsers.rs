//! Parsers for TSM AuctionDB snapshot lines.
//!
//! A dump line embeds one realm's snapshot as a Lua table:
//! ```text
//! select(2, ...).LoadData("AUCTIONDB_MARKET_DATA","Thunderhorn",[[return {downloadTime=1700000000,
//!     fields={"itemString","marketValue"},data={{123,4500},{456,6000}}}]]) --<Thunderhorn>
//! ```
//! `{}` serves as both the row collection and each row, and row values are
//! bare scalars. Nested tables inside a row are not supported.

use crate::error::{Result, TsmError};
use crate::file_utils::find_realm_line;
use crate::models::{Scalar, Snapshot};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref DOWNLOAD_TIME_RE: Regex = Regex::new(r"downloadTime\s*=\s*(\d*)").unwrap();
    // Keys must not be the tail of a longer name (`metadata=`), but may follow
    // a digit: dumps can run `downloadTime=1700000000fields={...}` together.
    static ref FIELDS_RE: Regex = Regex::new(r"(?:^|[^A-Za-z_])fields\s*=\s*\{([^}]*)\}").unwrap();
    static ref DATA_RE: Regex = Regex::new(r"(?:^|[^A-Za-z_])data\s*=\s*\{").unwrap();
    static ref ROW_SEPARATOR_RE: Regex = Regex::new(r"\]\s*,\s*\[").unwrap();
}

/// Locate the line for `realm` in a dump file and parse its snapshot.
pub fn parse_snapshot_file(path: &Path, realm: &str) -> Result<Snapshot> {
    let line = find_realm_line(path, realm)?;
    tracing::debug!("Found {} line ({} bytes) in {:?}", realm, line.len(), path);

    let snapshot = parse_snapshot_line(&line)?;
    tracing::info!(
        "Parsed snapshot for {}: {} fields, {} rows, downloaded at {}",
        realm,
        snapshot.fields.len(),
        snapshot.data.len(),
        snapshot.download_time
    );
    Ok(snapshot)
}

/// Parse one raw dump line into a validated snapshot.
pub fn parse_snapshot_line(line: &str) -> Result<Snapshot> {
    let download_time = extract_download_time(line)?;
    let fields = extract_fields(line)?;
    let block = extract_data_block(line)?;
    let rows = materialize_rows(&to_array_syntax(block))?;

    Snapshot::new(download_time, fields, rows)
}

/// Extract the digits following `downloadTime=`.
pub fn extract_download_time(line: &str) -> Result<u64> {
    let caps = DOWNLOAD_TIME_RE.captures(line).ok_or_else(|| {
        TsmError::MalformedTimestamp("downloadTime marker not found".to_string())
    })?;
    let digits = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    if digits.is_empty() {
        return Err(TsmError::MalformedTimestamp(
            "downloadTime is not followed by digits".to_string(),
        ));
    }

    let time: u64 = digits
        .parse()
        .map_err(|_| TsmError::MalformedTimestamp(format!("invalid time: {}", digits)))?;
    if time == 0 {
        return Err(TsmError::MalformedTimestamp(
            "download time must be a positive integer".to_string(),
        ));
    }
    Ok(time)
}

/// Extract the field names from `fields={"a","b",...}`, quotes stripped.
pub fn extract_fields(line: &str) -> Result<Vec<String>> {
    let caps = FIELDS_RE
        .captures(line)
        .ok_or_else(|| TsmError::MalformedSnapshot("fields marker not found".to_string()))?;
    let list = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    if list.is_empty() {
        return Err(TsmError::MalformedSnapshot("field list is empty".to_string()));
    }

    Ok(list
        .trim_end_matches(',')
        .split(',')
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect())
}

/// Return the balanced `{...}` block that follows `data=`, braces included.
///
/// The enclosing table's closing brace is never part of the result.
pub fn extract_data_block(line: &str) -> Result<&str> {
    let marker = DATA_RE
        .find(line)
        .ok_or_else(|| TsmError::MalformedSnapshot("data marker not found".to_string()))?;

    // The match ends just past the opening brace.
    let start = marker.end() - 1;
    let mut depth = 0usize;
    for (offset, byte) in line.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&line[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(TsmError::MalformedSnapshot("unbalanced braces in data block".to_string()))
}

/// Convert Lua table braces into array brackets.
///
/// This is a blind character substitution: it assumes no scalar value contains a brace.
pub fn to_array_syntax(block: &str) -> String {
    block.replace('{', "[").replace('}', "]")
}

/// Split converted array text (`[[a,b],[c,d]]`) into rows of raw column values.
///
/// Values are trimmed and keep whether they were quoted; nothing is re-typed.
pub fn materialize_rows(array_text: &str) -> Result<Vec<Vec<Scalar>>> {
    let inner = strip_brackets(array_text.trim())
        .ok_or_else(|| TsmError::MalformedSnapshot("data block is not an array".to_string()))?
        .trim()
        .trim_end_matches(',')
        .trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let rows_text = strip_brackets(inner).ok_or_else(|| {
        TsmError::MalformedSnapshot("data rows must be wrapped in braces".to_string())
    })?;

    ROW_SEPARATOR_RE
        .split(rows_text)
        .enumerate()
        .map(|(index, chunk)| parse_row(index, chunk))
        .collect()
}

fn strip_brackets(text: &str) -> Option<&str> {
    text.strip_prefix('[')?.strip_suffix(']')
}

fn parse_row(index: usize, chunk: &str) -> Result<Vec<Scalar>> {
    if chunk.contains(['[', ']']) {
        return Err(TsmError::MalformedSnapshot(format!(
            "row {} contains a nested table",
            index
        )));
    }

    let chunk = chunk.trim();
    if chunk.is_empty() {
        return Ok(Vec::new());
    }

    Ok(chunk
        .strip_suffix(',')
        .unwrap_or(chunk)
        .split(',')
        .map(Scalar::from_token)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXAMPLE_LINE: &str = r#"downloadTime=1700000000fields={"itemString","marketValue"}data={{123,4500},{456,6000}}"#;

    const APPDATA_LINE: &str = r#"select(2, ...).LoadData("AUCTIONDB_MARKET_DATA","Thunderhorn",[[return {downloadTime=1700000000,fields={"itemString","marketValue","minBuyout","historical","numAuctions"},data={{2589,4500,4200,4700,12},{2592,6000,5900,6100,3},{"i:3820",150,99,160,40}}}]]) --<AUCTIONDB_MARKET_DATA,Thunderhorn,1700000000>"#;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_example_line() {
        let snapshot = parse_snapshot_line(EXAMPLE_LINE).unwrap();
        assert_eq!(snapshot.download_time, 1700000000);
        assert_eq!(snapshot.fields, strings(&["itemString", "marketValue"]));
        assert_eq!(
            snapshot.data,
            vec![strings(&["123", "4500"]), strings(&["456", "6000"])]
        );

        let json = serde_json::to_string(&snapshot.to_document().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"downloadTime":1700000000,"fields":["itemString","marketValue"],"data":[[123,4500],[456,6000]]}"#
        );
    }

    #[test]
    fn test_parse_appdata_line() {
        let snapshot = parse_snapshot_line(APPDATA_LINE).unwrap();
        assert_eq!(snapshot.fields.len(), 5);
        assert_eq!(snapshot.data.len(), 3);
        for row in &snapshot.data {
            assert_eq!(row.len(), snapshot.fields.len());
        }
        assert_eq!(snapshot.data[2][0], Scalar::Quoted("i:3820".to_string()));
        assert_eq!(snapshot.data[1][0], Scalar::Bare("2592".to_string()));
        assert_eq!(snapshot.data[2][4], "40");
    }

    #[test]
    fn test_extract_data_block_excludes_enclosing_brace() {
        let block = extract_data_block(APPDATA_LINE).unwrap();
        assert!(block.starts_with("{{2589"));
        assert!(block.ends_with("40}}"));
    }

    #[test]
    fn test_to_array_syntax() {
        assert_eq!(to_array_syntax("{{1,2},{3,4}}"), "[[1,2],[3,4]]");
    }

    #[test]
    fn test_materialize_single_row() {
        let rows = materialize_rows("[[123,4500]]").unwrap();
        assert_eq!(rows, vec![strings(&["123", "4500"])]);
    }

    #[test]
    fn test_materialize_empty_block() {
        assert!(materialize_rows("[]").unwrap().is_empty());
    }

    #[test]
    fn test_materialize_tolerates_whitespace_and_trailing_commas() {
        let rows = materialize_rows("[ [1, 2,] , [3, 4], ]").unwrap();
        assert_eq!(rows, vec![strings(&["1", "2"]), strings(&["3", "4"])]);
    }

    #[test]
    fn test_materialize_rejects_nested_tables() {
        let result = materialize_rows("[[1,[2,3]],[4,5]]");
        assert!(matches!(result, Err(TsmError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_single_row_line() {
        let line = r#"downloadTime=5,fields={"itemString","marketValue"},data={{7,8}}}"#;
        let snapshot = parse_snapshot_line(line).unwrap();
        assert_eq!(snapshot.data, vec![strings(&["7", "8"])]);
    }

    #[test]
    fn test_missing_fields_marker() {
        let line = "downloadTime=1700000000 data={{1,2}}";
        let result = parse_snapshot_line(line);
        assert!(matches!(result, Err(TsmError::MalformedSnapshot(ref m)) if m.contains("fields")));
    }

    #[test]
    fn test_missing_data_marker() {
        let line = r#"downloadTime=1700000000 fields={"itemString"}"#;
        let result = parse_snapshot_line(line);
        assert!(matches!(result, Err(TsmError::MalformedSnapshot(ref m)) if m.contains("data")));
    }

    #[test]
    fn test_unbalanced_data_block() {
        let line = r#"downloadTime=1 fields={"itemString"} data={{1},{2}"#;
        assert!(matches!(
            parse_snapshot_line(line),
            Err(TsmError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_missing_download_time() {
        let line = r#"fields={"itemString"} data={{1}}"#;
        assert!(matches!(
            parse_snapshot_line(line),
            Err(TsmError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_non_numeric_download_time() {
        assert!(matches!(
            extract_download_time("downloadTime=abc"),
            Err(TsmError::MalformedTimestamp(_))
        ));
        assert!(matches!(
            extract_download_time("downloadTime=99999999999999999999999"),
            Err(TsmError::MalformedTimestamp(_))
        ));
        assert!(matches!(
            extract_download_time("downloadTime=0"),
            Err(TsmError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_row_width_mismatch() {
        let line = r#"downloadTime=1 fields={"itemString","marketValue"} data={{1,2},{3}}"#;
        assert!(matches!(
            parse_snapshot_line(line),
            Err(TsmError::MalformedSnapshot(ref m)) if m.contains("row 1")
        ));
    }

    #[test]
    fn test_markers_ignore_longer_keys() {
        let line = r#"metadata={{9,9}},subfields={"x"},downloadTime=1700000000,fields={"itemString","marketValue"},data={{1,2}}"#;
        let snapshot = parse_snapshot_line(line).unwrap();
        assert_eq!(snapshot.fields, strings(&["itemString", "marketValue"]));
        assert_eq!(snapshot.data, vec![strings(&["1", "2"])]);

        let only_metadata = r#"downloadTime=1 fields={"itemString"} metadata={{1}}"#;
        assert!(matches!(
            parse_snapshot_line(only_metadata),
            Err(TsmError::MalformedSnapshot(ref m)) if m.contains("data")
        ));
    }

    #[test]
    fn test_materialize_keeps_quoting() {
        let rows = materialize_rows(r#"[["0123",1e3]]"#).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                Scalar::Quoted("0123".to_string()),
                Scalar::Bare("1e3".to_string())
            ]]
        );
    }

    #[test]
    fn test_extract_fields_strips_quotes() {
        let fields = extract_fields(r#"fields={ "itemString" , "minBuyout" }"#).unwrap();
        assert_eq!(fields, strings(&["itemString", "minBuyout"]));
        assert!(extract_fields("fields={}").is_err());
    }

    #[test]
    fn test_parse_snapshot_file_picks_realm() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"LoadData("AUCTIONDB_MARKET_DATA","Silvermoon",[[return {{downloadTime=1600000000,fields={{"itemString"}},data={{{{1}}}}}}]])"#
        )
        .unwrap();
        writeln!(file, "{}", APPDATA_LINE).unwrap();

        let snapshot = parse_snapshot_file(file.path(), "thunderhorn").unwrap();
        assert_eq!(snapshot.download_time, 1700000000);

        let snapshot = parse_snapshot_file(file.path(), "SilverMoon").unwrap();
        assert_eq!(snapshot.download_time, 1600000000);
        assert_eq!(snapshot.data, vec![strings(&["1"])]);
    }
}
