//! ClickHouse `TabSeparated` encoding.
//!
//! Rows are separated by `\n` and fields by `\t`; both characters, the
//! backslash and a few control characters are escaped inside string fields.

use crate::core::{Fingerprint, GatewayError, LabelDescriptorRow, Result, SampleRow};
use std::fmt::Write;

/// Appends `field` to `out` with TabSeparated escaping.
pub fn escape_into(out: &mut String, field: &str) {
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            _ => out.push(c),
        }
    }
}

/// Reverses [`escape_into`], also accepting `\'` and unknown escapes as
/// the escaped character itself.
pub fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Encodes sample rows as `fingerprint, timestamp_ms, value, string`.
pub fn encode_samples(rows: &[SampleRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 64);
    for row in rows {
        // Writing into a String cannot fail
        let _ = write!(out, "{}\t{}\t{}\t", row.fingerprint, row.timestamp_ms, row.value);
        escape_into(&mut out, &row.line);
        out.push('\n');
    }
    out
}

/// Encodes label descriptor rows as `date, fingerprint, labels`.
pub fn encode_label_descriptors(rows: &[LabelDescriptorRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 64);
    for row in rows {
        let _ = write!(out, "{}\t{}\t", row.date.format("%Y-%m-%d"), row.fingerprint);
        escape_into(&mut out, &row.labels_json);
        out.push('\n');
    }
    out
}

/// Decodes `fingerprint, timestamp_ms, value, string` rows.
pub fn decode_samples(body: &str) -> Result<Vec<SampleRow>> {
    body.lines()
        .filter(|line| !line.is_empty())
        .map(decode_sample)
        .collect()
}

fn decode_sample(line: &str) -> Result<SampleRow> {
    let mut fields = line.splitn(4, '\t');
    let (Some(fp), Some(ts), Some(value), Some(text)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(GatewayError::MalformedRow(format!(
            "expected 4 tab-separated fields in '{}'",
            line
        )));
    };

    let fingerprint: Fingerprint = fp
        .parse()
        .map_err(|_| GatewayError::MalformedRow(format!("bad fingerprint '{}'", fp)))?;
    let timestamp_ms = ts
        .parse::<i64>()
        .map_err(|_| GatewayError::MalformedRow(format!("bad timestamp_ms '{}'", ts)))?;
    let value = value
        .parse::<f64>()
        .map_err(|_| GatewayError::MalformedRow(format!("bad value '{}'", value)))?;

    Ok(SampleRow::new(fingerprint, timestamp_ms, value, unescape(text)))
}
