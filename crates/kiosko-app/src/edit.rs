// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use time::Date;
use time::macros::format_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditKind {
    Text,
    Number,
    Boolean,
    Date,
    Json,
}

/// A cell value tagged with the editor that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum EditValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(Date),
    Json(Value),
}

impl EditValue {
    pub const fn kind(&self) -> EditKind {
        match self {
            Self::Text(_) => EditKind::Text,
            Self::Number(_) => EditKind::Number,
            Self::Boolean(_) => EditKind::Boolean,
            Self::Date(_) => EditKind::Date,
            Self::Json(_) => EditKind::Json,
        }
    }

    /// Infers the editor from the JSON runtime type.
    pub fn infer(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Text(String::new()),
            Some(Value::String(text)) => Self::Text(text.clone()),
            Some(Value::Number(number)) => Self::Number(number.as_f64().unwrap_or(0.0)),
            Some(Value::Bool(flag)) => Self::Boolean(*flag),
            Some(other) => Self::Json(other.clone()),
        }
    }

    /// Builds the original value for a declared editor, falling back to
    /// inference when the stored value does not fit the declared kind.
    pub fn from_json(kind: EditKind, value: Option<&Value>) -> Self {
        let declared = match (kind, value) {
            (EditKind::Text, Some(Value::String(text))) => Some(Self::Text(text.clone())),
            (EditKind::Text, None | Some(Value::Null)) => Some(Self::Text(String::new())),
            (EditKind::Number, Some(Value::Number(number))) => number.as_f64().map(Self::Number),
            (EditKind::Number, Some(Value::String(text))) => {
                text.trim().parse::<f64>().ok().map(Self::Number)
            }
            (EditKind::Number, None | Some(Value::Null)) => Some(Self::Number(0.0)),
            (EditKind::Boolean, Some(Value::Bool(flag))) => Some(Self::Boolean(*flag)),
            (EditKind::Boolean, None | Some(Value::Null)) => Some(Self::Boolean(false)),
            (EditKind::Date, Some(Value::String(text))) => parse_iso_date(text).map(Self::Date),
            (EditKind::Json, Some(value)) => Some(Self::Json(value.clone())),
            _ => None,
        };
        declared.unwrap_or_else(|| Self::infer(value))
    }

    /// JSON body representation sent back to the server.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(number) if is_integral(*number) => Value::from(*number as i64),
            Self::Number(number) => {
                serde_json::Number::from_f64(*number).map_or(Value::Null, Value::Number)
            }
            Self::Boolean(flag) => Value::Bool(*flag),
            Self::Date(date) => Value::String(format_iso_date(*date)),
            Self::Json(value) => value.clone(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(number) => Some(number.round() as i64),
            _ => None,
        }
    }
}

pub fn format_value(value: &EditValue) -> String {
    match value {
        EditValue::Text(text) => text.clone(),
        EditValue::Number(number) => format_number(*number),
        EditValue::Boolean(flag) => flag.to_string(),
        EditValue::Date(date) => format_iso_date(*date),
        EditValue::Json(value) => value.to_string(),
    }
}

/// Coerces raw editor input into the original's type.
///
/// Returns `None` only for dates that do not parse; the caller keeps the
/// original value in that case. Numbers never fail: blank or invalid input
/// collapses to zero.
pub fn parse_value(input: &str, original: &EditValue) -> Option<EditValue> {
    match original {
        EditValue::Date(_) => parse_iso_date(input).map(EditValue::Date),
        EditValue::Number(_) => Some(EditValue::Number(
            input
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .unwrap_or(0.0),
        )),
        EditValue::Boolean(_) => Some(EditValue::Boolean(input.to_lowercase() == "true")),
        EditValue::Json(_) => Some(
            serde_json::from_str(input)
                .map(EditValue::Json)
                .unwrap_or_else(|_| EditValue::Text(input.to_owned())),
        ),
        EditValue::Text(_) => Some(EditValue::Text(input.to_owned())),
    }
}

pub fn parse_iso_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    let day = trimmed.split_once('T').map_or(trimmed, |(day, _)| day);
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

pub fn format_iso_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

pub fn format_number(value: f64) -> String {
    if is_integral(value) {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15
}

/// Live editor state for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    original: EditValue,
    draft: String,
    pristine: bool,
}

impl EditSession {
    pub fn begin(original: EditValue) -> Self {
        let draft = format_value(&original);
        Self {
            original,
            draft,
            pristine: true,
        }
    }

    pub fn original(&self) -> &EditValue {
        &self.original
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// The first keystroke replaces the seeded text, like a select-all on focus.
    pub fn insert_char(&mut self, ch: char) {
        if self.pristine {
            self.draft.clear();
            self.pristine = false;
        }
        self.draft.push(ch);
    }

    pub fn backspace(&mut self) {
        self.pristine = false;
        self.draft.pop();
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.pristine = false;
        self.draft = draft.into();
    }

    /// Coerces the draft; yields a value only when it differs from the original.
    pub fn commit(self) -> Option<EditValue> {
        let parsed = parse_value(&self.draft, &self.original)?;
        if parsed == self.original {
            return None;
        }
        Some(parsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub row_key: String,
    pub column_id: String,
}

impl CellKey {
    pub fn new(row_key: impl Into<String>, column_id: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            column_id: column_id.into(),
        }
    }
}

/// Edit sessions keyed by row and column, kept beside the rows they edit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditSessions {
    sessions: BTreeMap<CellKey, EditSession>,
}

impl EditSessions {
    pub fn begin(&mut self, key: CellKey, original: EditValue) -> &mut EditSession {
        match self.sessions.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(EditSession::begin(original));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(EditSession::begin(original)),
        }
    }

    pub fn get(&self, key: &CellKey) -> Option<&EditSession> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &CellKey) -> Option<&mut EditSession> {
        self.sessions.get_mut(key)
    }

    pub fn is_editing(&self, key: &CellKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn commit(&mut self, key: &CellKey) -> Option<EditValue> {
        self.sessions.remove(key)?.commit()
    }

    pub fn cancel(&mut self, key: &CellKey) -> bool {
        self.sessions.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active(&self) -> Option<(&CellKey, &EditSession)> {
        self.sessions.iter().next()
    }
}
