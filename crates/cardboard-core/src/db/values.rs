//! Conversions between model fields and libSQL values.

use libsql::{Row, Value};

use crate::error::{Error, Result};

pub(crate) fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

pub(crate) fn integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

pub(crate) fn real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

pub(crate) fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub(crate) fn optional_flag(value: Option<bool>) -> Value {
    value.map_or(Value::Null, flag)
}

pub(crate) fn string_list(values: &[String]) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(values)?))
}

pub(crate) fn json(value: &serde_json::Value) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(value)?))
}

/// `?1, ?2, ... ?n` starting after `offset` already-bound parameters.
pub(crate) fn placeholders(offset: usize, count: usize) -> String {
    (offset + 1..=offset + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads a row's columns in `SELECT` order.
pub(crate) struct RowReader<'r> {
    row: &'r Row,
    index: i32,
}

impl<'r> RowReader<'r> {
    pub(crate) const fn new(row: &'r Row) -> Self {
        Self { row, index: 0 }
    }

    fn next_value(&mut self) -> Result<(i32, Value)> {
        let index = self.index;
        self.index += 1;
        Ok((index, self.row.get_value(index)?))
    }

    pub(crate) fn opt_int(&mut self) -> Result<Option<i64>> {
        match self.next_value()? {
            (_, Value::Null) => Ok(None),
            (_, Value::Integer(value)) => Ok(Some(value)),
            #[allow(clippy::cast_possible_truncation)]
            (_, Value::Real(value)) => Ok(Some(value as i64)),
            (index, other) => Err(unexpected(index, "integer", &other)),
        }
    }

    pub(crate) fn int(&mut self) -> Result<i64> {
        let index = self.index;
        self.opt_int()?
            .ok_or_else(|| Error::Database(format!("column {index} is NULL, expected integer")))
    }

    pub(crate) fn opt_real(&mut self) -> Result<Option<f64>> {
        match self.next_value()? {
            (_, Value::Null) => Ok(None),
            (_, Value::Real(value)) => Ok(Some(value)),
            #[allow(clippy::cast_precision_loss)]
            (_, Value::Integer(value)) => Ok(Some(value as f64)),
            (index, other) => Err(unexpected(index, "real", &other)),
        }
    }

    pub(crate) fn opt_text(&mut self) -> Result<Option<String>> {
        match self.next_value()? {
            (_, Value::Null) => Ok(None),
            (_, Value::Text(value)) => Ok(Some(value)),
            (_, Value::Integer(value)) => Ok(Some(value.to_string())),
            (index, other) => Err(unexpected(index, "text", &other)),
        }
    }

    pub(crate) fn text(&mut self) -> Result<String> {
        let index = self.index;
        self.opt_text()?
            .ok_or_else(|| Error::Database(format!("column {index} is NULL, expected text")))
    }

    pub(crate) fn flag(&mut self) -> Result<bool> {
        Ok(self.opt_int()?.is_some_and(|value| value != 0))
    }

    pub(crate) fn opt_flag(&mut self) -> Result<Option<bool>> {
        Ok(self.opt_int()?.map(|value| value != 0))
    }

    pub(crate) fn string_list(&mut self) -> Result<Vec<String>> {
        match self.opt_text()? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn json(&mut self) -> Result<serde_json::Value> {
        match self.opt_text()? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(serde_json::Value::Null),
        }
    }
}

fn unexpected(index: i32, expected: &str, found: &Value) -> Error {
    Error::Database(format!("column {index}: expected {expected}, found {found:?}"))
}
