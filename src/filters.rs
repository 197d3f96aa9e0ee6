//! Date template filters.
//!
//! Registered on the engine at startup; templates use them as
//! `{{ post.date | long_date }}` and friends. Dates arrive as strings in
//! the handful of shapes the evaluator and data files produce, so every
//! filter funnels through one tolerant parser.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

/// Register all built-in filters on a tera instance.
pub fn register(tera: &mut Tera) {
    tera.register_filter("long_date", long_date);
    tera.register_filter("date_to_xml_string", date_to_xml_string);
    tera.register_filter("archive_date", archive_date);
    tera.register_filter("month_number_to_written_month", month_number_to_written_month);
    tera.register_filter("year", year);
}

/// Parse a date value in any of the shapes the pipeline produces.
///
/// Accepted: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, ISO-8601 with `T`
/// separator, with or without fractional seconds or a `-00:00` suffix.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().replace(' ', "T");
    let value = value.trim_end_matches("-00:00");

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn date_arg(value: &Value) -> tera::Result<NaiveDateTime> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("expected a date string"))?;
    parse_date(text).ok_or_else(|| tera::Error::msg(format!("unparsable date: {text}")))
}

/// `2024-01-15` → `January 15, 2024`
fn long_date(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(
        date_arg(value)?.format("%B %d, %Y").to_string(),
    ))
}

/// `2024-01-15 08:30:00` → `2024-01-15T08:30:00`
fn date_to_xml_string(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(
        date_arg(value)?.format("%Y-%m-%dT%H:%M:%S").to_string(),
    ))
}

/// `2024-01-15` → `2024/01`
fn archive_date(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(date_arg(value)?.format("%Y/%m").to_string()))
}

/// `1` → `January`
fn month_number_to_written_month(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let month = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|m| (1..=12).contains(m))
    .ok_or_else(|| tera::Error::msg("expected a month number 1-12"))?;

    #[allow(clippy::cast_possible_truncation)]
    let date = NaiveDate::from_ymd_opt(2000, month as u32, 1)
        .ok_or_else(|| tera::Error::msg("invalid month"))?;
    Ok(Value::from(date.format("%B").to_string()))
}

/// `2024-01-15` → `2024`
fn year(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(date_arg(value)?.format("%Y").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> HashMap<String, Value> {
        HashMap::new()
    }

    #[test]
    fn test_parse_date_shapes() {
        assert!(parse_date("2024-01-15").is_some());
        assert!(parse_date("2024-01-15 08:30:00").is_some());
        assert!(parse_date("2024-01-15T08:30:00.123456").is_some());
        assert!(parse_date("2024-01-15T08:30:00-00:00").is_some());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_long_date() {
        let out = long_date(&Value::from("2024-01-15"), &no_args()).unwrap();
        assert_eq!(out, "January 15, 2024");
    }

    #[test]
    fn test_date_to_xml_string() {
        let out = date_to_xml_string(&Value::from("2024-01-15 08:30:00"), &no_args()).unwrap();
        assert_eq!(out, "2024-01-15T08:30:00");
    }

    #[test]
    fn test_archive_date() {
        let out = archive_date(&Value::from("2024-01-15"), &no_args()).unwrap();
        assert_eq!(out, "2024/01");
    }

    #[test]
    fn test_month_number_to_written_month() {
        let out = month_number_to_written_month(&Value::from(1), &no_args()).unwrap();
        assert_eq!(out, "January");
        let out = month_number_to_written_month(&Value::from("12"), &no_args()).unwrap();
        assert_eq!(out, "December");
        assert!(month_number_to_written_month(&Value::from(13), &no_args()).is_err());
    }

    #[test]
    fn test_year() {
        let out = year(&Value::from("2024-01-15 08:30:00"), &no_args()).unwrap();
        assert_eq!(out, "2024");
    }
}
