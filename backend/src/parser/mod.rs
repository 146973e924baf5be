//! CSV parsing and text decoding.
//!
//! Turns raw CSV text into rows of untyped string values; typing happens later in
//! [`crate::validation`]. The tokenizer is deliberately limited:
//!
//! - one leading and one trailing quote are stripped per line,
//! - values are split on commas, a quote touching a comma is dropped with it,
//! - rows shorter than the header are padded with the `"null"` sentinel.
//!
//! There is no RFC-4180 escaping: a comma inside quotes still splits the value.

use serde_json::{Map, Value};

/// Placeholder for missing CSV values, turned into a real null during validation.
pub const NULL_SENTINEL: &str = "null";

/// A row before type conversion: field name to raw JSON value.
pub type RawRow = Map<String, Value>;

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the specified encoding.
///
/// Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decode bytes with auto-detected encoding. Valid UTF-8 is used as-is.
pub fn decode_bytes_auto(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_content(bytes, &detect_encoding(bytes)),
    }
}

/// Parse CSV text into raw rows keyed by header name.
///
/// # Example
/// ```
/// use chartdata::parse_csv;
///
/// let rows = parse_csv("a,b\n1,3\n2,4\n");
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0]["a"], "1");
/// assert_eq!(rows[1]["b"], "4");
/// ```
pub fn parse_csv(text: &str) -> Vec<RawRow> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let Some((header_line, data_lines)) = lines.split_first() else {
        return Vec::new();
    };

    let headers = tokenize_line(header_line);

    data_lines
        .iter()
        .map(|line| {
            let mut values = tokenize_line(line).into_iter();
            headers
                .iter()
                .map(|header| {
                    let value = values.next().unwrap_or_else(|| NULL_SENTINEL.to_string());
                    (header.clone(), Value::String(value))
                })
                .collect()
        })
        .collect()
}

/// Split one line into values.
fn tokenize_line(line: &str) -> Vec<String> {
    let line = line.strip_prefix('"').unwrap_or(line);
    let line = line.strip_suffix('"').unwrap_or(line);

    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ',' {
            current.push(c);
            continue;
        }
        if current.ends_with('"') {
            current.pop();
        }
        values.push(std::mem::take(&mut current));
        if chars.peek() == Some(&'"') {
            chars.next();
        }
    }
    values.push(current);

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let rows = parse_csv("a,b\n1,3\n2,4\n");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0]["b"], "3");
        assert_eq!(rows[1]["a"], "2");
        assert_eq!(rows[1]["b"], "4");
    }

    #[test]
    fn test_header_order_kept() {
        let rows = parse_csv("z,a,m\n1,2,3");
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_quoted_values() {
        let rows = parse_csv("\"name\",\"value\"\n\"Alice\",\"Hello World\"");

        assert_eq!(rows[0]["name"], "Alice");
        assert_eq!(rows[0]["value"], "Hello World");
    }

    #[test]
    fn test_partially_quoted_values() {
        let rows = parse_csv("a,b,c\n\"x\",y,\"z\"");

        assert_eq!(rows[0]["a"], "x");
        assert_eq!(rows[0]["b"], "y");
        assert_eq!(rows[0]["c"], "z");
    }

    #[test]
    fn test_embedded_comma_still_splits() {
        let rows = parse_csv("a,b\n\"x,y\",z");

        assert_eq!(rows[0]["a"], "x");
        assert_eq!(rows[0]["b"], "y");
    }

    #[test]
    fn test_short_rows_padded_with_sentinel() {
        let rows = parse_csv("a,b,c\n1");

        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0]["b"], NULL_SENTINEL);
        assert_eq!(rows[0]["c"], NULL_SENTINEL);
    }

    #[test]
    fn test_empty_values_kept() {
        let rows = parse_csv("a,b,c\n1,,3");

        assert_eq!(rows[0]["b"], "");
        assert_eq!(rows[0]["c"], "3");
    }

    #[test]
    fn test_extra_columns_ignored() {
        let rows = parse_csv("a,b\n1,2,3,4");

        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["b"], "2");
    }

    #[test]
    fn test_crlf_line_endings() {
        let rows = parse_csv("a,b\r\n1,2\r\n");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["b"], "2");
    }

    #[test]
    fn test_only_trailing_blank_line_dropped() {
        let rows = parse_csv("a,b\n1,2\n\n3,4\n");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1]["a"], "");
        assert_eq!(rows[1]["b"], NULL_SENTINEL);
    }

    #[test]
    fn test_row_count_matches_data_lines() {
        let headers = ["h1", "h2", "h3", "h4"];
        for r in 0..6 {
            let mut text = headers.join(",");
            for i in 0..r {
                text.push_str(&format!("\n{},x,{}", i, i * 2));
            }
            let rows = parse_csv(&text);
            assert_eq!(rows.len(), r);
            for row in &rows {
                assert_eq!(row.len(), headers.len());
                assert!(headers.iter().all(|h| row.contains_key(*h)));
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("a,b\n").is_empty());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_latin1_currency_sign() {
        assert_eq!(decode_content(&[0xA4], "iso-8859-1"), "¤");
    }

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(decode_bytes_auto("né,à".as_bytes()), "né,à");
    }
}
