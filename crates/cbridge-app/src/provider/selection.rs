//! Selection strings.
//!
//! Callers address records with a single SQL-like equality, for example
//! `"name = ?"` with one argument, or `"uuid = host-1"` inline. The column
//! must be a declared field of the target source and the value is converted
//! to that field's type. Compound conditions are rejected.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use cbridge_core::prelude::*;

use super::{FieldType, MatchFilter};

static COMPOUND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:AND|OR)\b|[()]").expect("Compound selection regex is valid")
});

const PLACEHOLDER: &str = "?";

/// Parse `selection` with `args` into at most one filter.
///
/// A blank selection, or one without `=`, selects everything. Numeric
/// values that do not parse become `null` and match nothing.
pub fn parse_selection(
    selection: Option<&str>,
    args: &[String],
    fields: &[(&str, FieldType)],
) -> Result<Vec<MatchFilter>> {
    let selection = match selection.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(Vec::new()),
    };

    if COMPOUND_PATTERN.is_match(selection) || args.len() > 1 {
        return Err(Error::invalid_selection(format!(
            "only one condition is supported: {selection}"
        )));
    }

    let Some((column, expected)) = selection.split_once('=') else {
        return Ok(Vec::new());
    };
    let column = column.trim();
    let expected = expected.trim();

    let field_type = fields
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, ty)| *ty)
        .ok_or_else(|| Error::invalid_selection(format!("{column} not supported")))?;

    let raw = if expected == PLACEHOLDER {
        args.first().map(String::as_str)
    } else {
        Some(unquote(expected))
    };

    Ok(vec![MatchFilter::new(column, typed_value(raw, field_type))])
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(s)
}

fn typed_value(raw: Option<&str>, field_type: FieldType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match field_type {
        FieldType::Int => raw.parse::<i32>().map_or(Value::Null, Value::from),
        FieldType::Long => raw.parse::<i64>().map_or(Value::Null, Value::from),
        FieldType::Float => raw.parse::<f32>().map_or(Value::Null, |f| Value::from(f64::from(f))),
        FieldType::Bool => Value::Bool(raw.eq_ignore_ascii_case("true")),
        FieldType::String | FieldType::Any => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[(&str, FieldType)] = &[
        ("uuid", FieldType::String),
        ("running_game_id", FieldType::Int),
        ("paired", FieldType::Bool),
        ("value", FieldType::Any),
    ];

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_blank_selection_selects_everything() {
        assert!(parse_selection(None, &[], FIELDS).unwrap().is_empty());
        assert!(parse_selection(Some("   "), &[], FIELDS).unwrap().is_empty());
        assert!(parse_selection(Some("uuid"), &[], FIELDS).unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_takes_argument() {
        let filters = parse_selection(Some("uuid = ?"), &args(&["host-1"]), FIELDS).unwrap();
        assert_eq!(filters, vec![MatchFilter::new("uuid", "host-1")]);
    }

    #[test]
    fn test_inline_value() {
        let filters = parse_selection(Some("uuid='host-2'"), &[], FIELDS).unwrap();
        assert_eq!(filters, vec![MatchFilter::new("uuid", "host-2")]);
    }

    #[test]
    fn test_values_follow_field_type() {
        let int = parse_selection(Some("running_game_id = ?"), &args(&["42"]), FIELDS).unwrap();
        assert_eq!(int[0].value, json!(42));

        let bad_int = parse_selection(Some("running_game_id = abc"), &[], FIELDS).unwrap();
        assert_eq!(bad_int[0].value, Value::Null);

        let flag = parse_selection(Some("paired = TRUE"), &[], FIELDS).unwrap();
        assert_eq!(flag[0].value, json!(true));

        let any = parse_selection(Some("value = 30"), &[], FIELDS).unwrap();
        assert_eq!(any[0].value, json!("30"));
    }

    #[test]
    fn test_missing_argument_is_null() {
        let filters = parse_selection(Some("uuid = ?"), &[], FIELDS).unwrap();
        assert_eq!(filters[0].value, Value::Null);
    }

    #[test]
    fn test_compound_conditions_rejected() {
        for selection in [
            "uuid = ? AND paired = ?",
            "uuid = ? or paired = 1",
            "(uuid = ?)",
        ] {
            let err = parse_selection(Some(selection), &[], FIELDS).unwrap_err();
            assert!(matches!(err, Error::InvalidSelection { .. }), "{selection}");
        }

        let err = parse_selection(Some("uuid = ?"), &args(&["a", "b"]), FIELDS).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection { .. }));
    }

    #[test]
    fn test_field_names_containing_keywords_are_fine() {
        let fields: &[(&str, FieldType)] = &[("brand_order", FieldType::String)];
        let filters = parse_selection(Some("brand_order = x"), &[], fields).unwrap();
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_selection(Some("password = ?"), &args(&["x"]), FIELDS).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection { .. }));
    }
}
