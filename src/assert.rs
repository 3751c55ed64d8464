//! Structural response assertions.
//!
//! An expected template mirrors the shape of a decoded response. Leaves are
//! either literal values, compared for equality, or one of the [`Check`]
//! sentinels, which ask for a property instead of a value:
//!
//! ```rust,ignore
//! let expected = json!({
//!     "code": 200,
//!     "result": {
//!         "id": "CHECK_POSITIVE",
//!         "title": "CHECK_STRING_NOT_EMPTY",
//!         "created_at": "CHECK_DATETIME_FORMAT",
//!         "tags": "CHECK_ARRAY_NOT_EMPTY"
//!     }
//! });
//! assert_response(&expected, &body)?;
//! ```
//!
//! Keys of the template are visited in order and the first violation is
//! returned. Keys present in the response but absent from the template are
//! ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AssertError, AssertResult};

static DATETIME_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2}").expect("valid regex")
});

static DATE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid regex"));

/// Sentinel tokens usable as template leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Key must be present; any value.
    Exist,
    NotNull,
    Positive,
    NotNegative,
    NotZero,
    StringNotEmpty,
    ArrayEmpty,
    ArrayNotEmpty,
    /// `YYYY-MM-DDTHH:MM:SS±HH:MM`
    DatetimeFormat,
    /// `YYYY-MM-DD`
    DateFormat,
}

impl Check {
    pub const ALL: [Check; 10] = [
        Check::Exist,
        Check::NotNull,
        Check::Positive,
        Check::NotNegative,
        Check::NotZero,
        Check::StringNotEmpty,
        Check::ArrayEmpty,
        Check::ArrayNotEmpty,
        Check::DatetimeFormat,
        Check::DateFormat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Check::Exist => "CHECK_EXIST",
            Check::NotNull => "CHECK_NOT_NULL",
            Check::Positive => "CHECK_POSITIVE",
            Check::NotNegative => "CHECK_NOT_NEGATIVE",
            Check::NotZero => "CHECK_NOT_ZERO",
            Check::StringNotEmpty => "CHECK_STRING_NOT_EMPTY",
            Check::ArrayEmpty => "CHECK_ARRAY_EMPTY",
            Check::ArrayNotEmpty => "CHECK_ARRAY_NOT_EMPTY",
            Check::DatetimeFormat => "CHECK_DATETIME_FORMAT",
            Check::DateFormat => "CHECK_DATE_FORMAT",
        }
    }

    /// Recognise a template leaf as a sentinel.
    pub fn from_value(value: &Value) -> Option<Check> {
        value.as_str().and_then(|s| s.parse().ok())
    }

    /// Whether `actual` satisfies this check.
    pub fn holds(&self, actual: &Value) -> bool {
        match self {
            Check::Exist => true,
            Check::NotNull => !actual.is_null(),
            Check::Positive => as_number(actual).is_some_and(|n| n > 0.0),
            Check::NotNegative => as_number(actual).is_some_and(|n| n >= 0.0),
            Check::NotZero => as_number(actual).is_some_and(|n| n != 0.0),
            Check::StringNotEmpty => actual.as_str().is_some_and(|s| !s.is_empty()),
            Check::ArrayEmpty => collection_len(actual) == Some(0),
            Check::ArrayNotEmpty => collection_len(actual).is_some_and(|n| n > 0),
            Check::DatetimeFormat => actual.as_str().is_some_and(|s| DATETIME_FORMAT.is_match(s)),
            Check::DateFormat => actual.as_str().is_some_and(|s| DATE_FORMAT.is_match(s)),
        }
    }
}

impl FromStr for Check {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Check::ALL.into_iter().find(|c| c.as_str() == s).ok_or(())
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Check> for Value {
    fn from(check: Check) -> Self {
        Value::String(check.as_str().to_string())
    }
}

// Numeric strings count as numbers: APIs are not always consistent.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn collection_len(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep equality with numbers compared by value (`1 == 1.0`).
fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, x)| b.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => expected == actual,
    }
}

/// Look `key` up in an object, or parse it as an index into an array.
fn child<'v>(actual: &'v Value, key: &str) -> Option<&'v Value> {
    match actual {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Check `actual` against the `expected` template.
///
/// `expected` must be an object (or an array, read as an index-keyed map);
/// `actual` must not be a scalar.
pub fn assert_response(expected: &Value, actual: &Value) -> AssertResult {
    if !is_container(expected) {
        return Err(AssertError::InvalidExpectedShape {
            kind: kind(expected),
        });
    }
    walk(expected, actual, "")
}

fn walk(expected: &Value, actual: &Value, path: &str) -> AssertResult {
    if !is_container(actual) {
        return Err(AssertError::InvalidActualShape {
            path: path.to_string(),
            kind: kind(actual),
        });
    }

    let entries: Vec<(String, &Value)> = match expected {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => Vec::new(),
    };

    for (key, expected_value) in entries {
        let field_path = join_path(path, &key);

        // A missing key always fails, CHECK_EXIST included.
        let actual_value = child(actual, &key).ok_or_else(|| AssertError::MissingField {
            path: field_path.clone(),
            key: key.clone(),
        })?;

        if is_container(expected_value) && is_container(actual_value) {
            walk(expected_value, actual_value, &field_path)?;
            continue;
        }

        let ok = match Check::from_value(expected_value) {
            Some(check) => check.holds(actual_value),
            None => values_equal(expected_value, actual_value),
        };

        if !ok {
            return Err(AssertError::ValueMismatch {
                path: field_path,
                key,
                expected: expected_value.clone(),
                actual: actual_value.clone(),
            });
        }
    }

    Ok(())
}

/// Context of the HTTP exchange being checked, used to render failures.
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    pub method: String,
    pub url: String,
    /// Request body parameters, in order.
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub body: String,
}

/// An assertion bound to the request that produced the response.
///
/// ```rust,ignore
/// Assertion::new()
///     .with_context(ResponseContext { method: "GET".into(), url, body, ..Default::default() })
///     .verbose(config.server.verbose)
///     .check(&expected, &actual)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    context: Option<ResponseContext>,
    verbose: bool,
}

/// A failed [`Assertion`], carrying what is needed to print a diagnostic.
#[derive(Debug, Clone)]
pub struct AssertionFailure {
    pub error: AssertError,
    pub context: Option<ResponseContext>,
    pub verbose: bool,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::report::render_failure(
            &self.error,
            self.context.as_ref(),
            self.verbose,
        ))
    }
}

impl std::error::Error for AssertionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl Assertion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: ResponseContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Include headers, params and the full body in failure reports.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn check(&self, expected: &Value, actual: &Value) -> Result<(), AssertionFailure> {
        assert_response(expected, actual).map_err(|error| AssertionFailure {
            error,
            context: self.context.clone(),
            verbose: self.verbose,
        })
    }
}
