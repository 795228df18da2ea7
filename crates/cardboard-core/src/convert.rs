//! Conversions for the loosely-typed values the remote service sends.
//!
//! Both the XML and JSON APIs encode numbers and flags as strings, with
//! `"N/A"`, `"Not Ranked"` or an empty string standing in for "no value".
//! Every parser goes through these helpers so the fallback rules live in
//! one place:
//!
//! | helper         | absent / empty | non-numeric      | notes                          |
//! |----------------|----------------|------------------|--------------------------------|
//! | [`to_int`]     | `None`         | `None`           | `"7.0"` → `7` (truncating)     |
//! | [`to_float`]   | `None`         | `None`           |                                |
//! | [`to_bool`]    | `None`         | `None`           | `1/true/yes`, `0/false/no`     |
//! | [`flag`]       | `false`        | `false`          | status attributes, `"1"` only  |
//! | [`rating`]     | `None`         | `None`           | `"N/A"` and `0` mean unrated   |
//! | [`rank`]       | `None`         | `None`           | `"Not Ranked"` → `None`        |

/// Parse an integer, accepting float notation.
pub fn to_int(value: Option<&str>) -> Option<i64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = text.parse::<i64>() {
        return Some(parsed);
    }
    text.parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .map(|parsed| parsed.trunc() as i64)
}

/// Parse a float.
pub fn to_float(value: Option<&str>) -> Option<f64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}

/// Parse a boolean-ish value; anything unrecognised is `None`.
pub fn to_bool(value: Option<&str>) -> Option<bool> {
    let text = value?.trim().to_ascii_lowercase();
    match text.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Collection status attributes: only `"1"` is set.
pub fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|text| text.trim() == "1")
}

/// A user or community rating. The remote sends `"N/A"` or `0` for unrated.
pub fn rating_value(value: Option<&str>) -> Option<f64> {
    to_float(value).filter(|parsed| *parsed > 0.0)
}

/// A ranking position. `"Not Ranked"` and non-positive values are `None`.
pub fn rank_value(value: Option<&str>) -> Option<i64> {
    let text = value?.trim();
    if !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    to_int(Some(text)).filter(|parsed| *parsed > 0)
}
