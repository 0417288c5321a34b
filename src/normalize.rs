// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Result normalization: validating and coercing captured stdout into a
//! structured payload.
//!
//! The expected output shape is declared up front as a tagged variant of
//! [`OutputSchema`] rather than discovered by inspecting the data, so the
//! normalizer's behavior is exhaustively enumerable. Normalization never
//! retries a command and never changes an attempt's outcome; a mismatch is
//! reported as a typed [`ValidationError`] and recorded alongside the
//! already-completed result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::executor::ExecutionAttempt;

/// Expected structure of a command's stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputSchema {
    /// No structure imposed; stdout is kept as-is (trailing newline trimmed).
    #[default]
    Raw,

    /// One `key<separator>value` pair per line, e.g. `VERSION=1.2.3`.
    /// Keys must be unique; surrounding whitespace is trimmed.
    KeyValue {
        #[serde(default = "default_separator")]
        separator: char,
    },

    /// Whitespace-separated columns, one record per line. When
    /// `has_header` is set, the first non-blank line must repeat the
    /// declared column names.
    Table {
        columns: Vec<String>,
        #[serde(default)]
        has_header: bool,
    },
}

fn default_separator() -> char {
    '='
}

/// Validated, schema-conformant command output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// The command produced no output. Not an error under any schema.
    Empty,
    Raw(String),
    KeyValue(BTreeMap<String, String>),
    /// One map per row, keyed by the schema's column names.
    Table(Vec<BTreeMap<String, String>>),
}

/// Validate a completed attempt's stdout against `schema`.
///
/// Empty stdout yields [`Payload::Empty`] for every schema; only output
/// that is present but malformed produces a [`ValidationError`].
pub fn normalize(
    attempt: &ExecutionAttempt,
    schema: &OutputSchema,
) -> Result<Payload, ValidationError> {
    let text = attempt.stdout.trim_end_matches(['\n', '\r']);
    if text.trim().is_empty() {
        return Ok(Payload::Empty);
    }

    match schema {
        OutputSchema::Raw => Ok(Payload::Raw(text.to_string())),
        OutputSchema::KeyValue { separator } => normalize_key_value(text, *separator),
        OutputSchema::Table {
            columns,
            has_header,
        } => normalize_table(text, columns, *has_header),
    }
}

fn normalize_key_value(text: &str, separator: char) -> Result<Payload, ValidationError> {
    let mut map = BTreeMap::new();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let Some((key, value)) = line.split_once(separator) else {
            return Err(ValidationError::MalformedKeyValue {
                line: line_no,
                separator,
                content: line.to_string(),
            });
        };

        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(ValidationError::MalformedKeyValue {
                line: line_no,
                separator,
                content: line.to_string(),
            });
        }
        if map.contains_key(&key) {
            return Err(ValidationError::DuplicateKey { line: line_no, key });
        }
        map.insert(key, value.trim().to_string());
    }

    Ok(Payload::KeyValue(map))
}

fn normalize_table(
    text: &str,
    columns: &[String],
    has_header: bool,
) -> Result<Payload, ValidationError> {
    let mut rows = Vec::new();
    let mut header_seen = false;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();

        if has_header && !header_seen {
            header_seen = true;
            if fields != columns.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(ValidationError::HeaderMismatch {
                    expected: columns.to_vec(),
                    found: fields.iter().map(|s| s.to_string()).collect(),
                });
            }
            continue;
        }

        if fields.len() != columns.len() {
            return Err(ValidationError::ColumnCountMismatch {
                line: line_no,
                expected: columns.len(),
                found: fields.len(),
            });
        }

        rows.push(
            columns
                .iter()
                .cloned()
                .zip(fields.iter().map(|s| s.to_string()))
                .collect(),
        );
    }

    Ok(Payload::Table(rows))
}
