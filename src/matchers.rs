//! The matching rules an [`Interaction`] uses to describe the values it accepts.
//!
//! Every body, header value and query value in an [`Interaction`] is a [`MatchSpec`]: a recursive
//! structure whose nodes are either literal values (exact match required) or matcher nodes
//! (structural match required).
//!
//! ```rust
//! use pactmock::matchers::{like, MatchSpec};
//! use serde_json::json;
//!
//! let spec = like(json!({"firstName": "Craig", "lastName": "Risi", "age": 21}));
//!
//! // Same shape, different values: it matches.
//! let result = spec.matches(&json!({"firstName": "X", "lastName": "Y", "age": 99}), "$.body");
//! assert!(result.is_ok());
//!
//! // `age` has the wrong kind.
//! let result = spec.matches(&json!({"firstName": "X", "lastName": "Y", "age": "99"}), "$.body");
//! assert!(!result.is_ok());
//! assert_eq!(result.mismatches[0].path, "$.body.age");
//! ```
//!
//! Matching never fails with an error: [`MatchSpec::matches`] always returns a [`MatchResult`],
//! listing every mismatch it found.
//!
//! [`Interaction`]: crate::Interaction
use crate::PactError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A compiled regular expression used by [`MatchSpec::Regex`].
///
/// A value matches only if the whole of it matches, as if the pattern was wrapped in `^...$`.
/// Two patterns are equal if they were built from the same source string.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: Regex,
    anchored: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, PactError> {
        let invalid = |e: regex::Error| {
            PactError::InvalidMatchSpec(format!("invalid regex `{}`: {}", pattern, e))
        };
        let source = Regex::new(pattern).map_err(invalid)?;
        let anchored = Regex::new(&format!("^(?:{})$", pattern)).map_err(invalid)?;
        Ok(Self { source, anchored })
    }

    pub fn as_str(&self) -> &str {
        self.source.as_str()
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.anchored.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// The expected value of a body, header or query parameter.
///
/// `MatchSpec` can be built:
/// - from a `serde_json::Value` via `From`, in which case every node is a literal;
/// - with the [`like`], [`term`] and [`each_like`] helpers;
/// - from a declaration literal via [`MatchSpec::from_json`], where a mapping is read as a
///   matcher node when its `"rule"` is a known matcher and it carries an `"example"`:
///   `{"rule": "like", "example": ...}`, `{"rule": "regex", "pattern": "...", "example": "..."}`
///   or `{"rule": "eachLike", "example": ..., "min": 1}`. Any other mapping is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSpec {
    /// A scalar that must be matched exactly.
    Literal(Value),
    /// A sequence, matched element by element.
    Array(Vec<MatchSpec>),
    /// A mapping: every listed key must be present and match. Extra keys are ignored.
    Object(BTreeMap<String, MatchSpec>),
    /// Same kind and shape as the example, values may differ.
    Like(Box<MatchSpec>),
    /// A string matching `pattern`.
    Regex { pattern: Pattern, example: String },
    /// A sequence of at least `min` elements, each shaped like `example`.
    EachLike { example: Box<MatchSpec>, min: usize },
}

/// Shorthand for [`MatchSpec::Like`].
pub fn like<T>(example: T) -> MatchSpec
where
    T: Into<MatchSpec>,
{
    MatchSpec::Like(Box::new(example.into()))
}

/// Shorthand for [`MatchSpec::Regex`].
///
/// Panics if `pattern` is not a valid regex or `example` does not match it.
pub fn term<P, E>(pattern: P, example: E) -> MatchSpec
where
    P: AsRef<str>,
    E: Into<String>,
{
    let pattern = Pattern::new(pattern.as_ref()).expect("Failed to compile the term pattern.");
    let example = example.into();
    assert!(
        pattern.is_match(&example),
        "The example `{}` does not match the term pattern `{}`.",
        example,
        pattern.as_str()
    );
    MatchSpec::Regex { pattern, example }
}

/// Shorthand for [`MatchSpec::EachLike`].
///
/// Panics if `min` is above [`MAX_EACH_LIKE_MIN`].
pub fn each_like<T>(example: T, min: usize) -> MatchSpec
where
    T: Into<MatchSpec>,
{
    assert!(
        min <= MAX_EACH_LIKE_MIN,
        "`each_like` accepts a `min` of at most {}, got {}.",
        MAX_EACH_LIKE_MIN,
        min
    );
    MatchSpec::EachLike {
        example: Box::new(example.into()),
        min,
    }
}

impl From<Value> for MatchSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => MatchSpec::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(fields) => MatchSpec::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
            scalar => MatchSpec::Literal(scalar),
        }
    }
}

impl From<&str> for MatchSpec {
    fn from(value: &str) -> Self {
        MatchSpec::Literal(Value::String(value.to_owned()))
    }
}

impl From<String> for MatchSpec {
    fn from(value: String) -> Self {
        MatchSpec::Literal(Value::String(value))
    }
}

/// The largest `min` an [`MatchSpec::EachLike`] node accepts.
pub const MAX_EACH_LIKE_MIN: usize = 100;

const MATCHER_RULES: [&str; 5] = ["type", "like", "regex", "term", "eachLike"];

/// Whether a subtree is compared value by value or kind by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Exact,
    Type,
}

impl MatchSpec {
    /// Parse a declaration literal, interpreting matcher nodes.
    ///
    /// This is where matcher declarations are validated: an invalid regex, an example that
    /// does not satisfy its own pattern or an out of range `min` are rejected.
    pub fn from_json(value: Value) -> Result<Self, PactError> {
        match value {
            Value::Object(mut fields) if is_matcher_node(&fields) => {
                let rule = match fields.remove("rule") {
                    Some(Value::String(rule)) => rule,
                    _ => String::new(),
                };
                let example = fields.remove("example").unwrap_or(Value::Null);
                match rule.as_str() {
                    "type" | "like" => Ok(MatchSpec::Like(Box::new(Self::from_json(example)?))),
                    "regex" | "term" => {
                        let pattern = match fields.remove("pattern") {
                            Some(Value::String(pattern)) => Pattern::new(&pattern)?,
                            _ => {
                                return Err(PactError::InvalidMatchSpec(
                                    "the `regex` matcher needs a string `pattern`".into(),
                                ))
                            }
                        };
                        let example = match example {
                            Value::String(example) => example,
                            other => {
                                return Err(PactError::InvalidMatchSpec(format!(
                                    "the `regex` matcher needs a string example, got {}",
                                    other
                                )))
                            }
                        };
                        if !pattern.is_match(&example) {
                            return Err(PactError::InvalidMatchSpec(format!(
                                "the example `{}` does not match the pattern `{}`",
                                example,
                                pattern.as_str()
                            )));
                        }
                        Ok(MatchSpec::Regex { pattern, example })
                    }
                    "eachLike" => {
                        let min = match fields.remove("min") {
                            None => 1,
                            Some(min) => min.as_u64().ok_or_else(|| {
                                PactError::InvalidMatchSpec(format!(
                                    "`min` must be a non-negative integer, got {}",
                                    min
                                ))
                            })? as usize,
                        };
                        check_each_like_min(min)?;
                        Ok(MatchSpec::EachLike {
                            example: Box::new(Self::from_json(example)?),
                            min,
                        })
                    }
                    unknown => Err(PactError::InvalidMatchSpec(format!(
                        "unknown matcher rule `{}`",
                        unknown
                    ))),
                }
            }
            Value::Object(fields) => fields
                .into_iter()
                .map(|(key, value)| Ok((key, Self::from_json(value)?)))
                .collect::<Result<_, PactError>>()
                .map(MatchSpec::Object),
            Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<_, _>>()
                .map(MatchSpec::Array),
            scalar => Ok(MatchSpec::Literal(scalar)),
        }
    }

    /// The declaration literal for this spec, the inverse of [`MatchSpec::from_json`].
    pub fn to_json(&self) -> Value {
        match self {
            MatchSpec::Literal(value) => value.clone(),
            MatchSpec::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            MatchSpec::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, spec)| (key.clone(), spec.to_json()))
                    .collect(),
            ),
            MatchSpec::Like(example) => json!({"rule": "like", "example": example.to_json()}),
            MatchSpec::Regex { pattern, example } => {
                json!({"rule": "regex", "pattern": pattern.as_str(), "example": example})
            }
            MatchSpec::EachLike { example, min } => {
                json!({"rule": "eachLike", "example": example.to_json(), "min": min})
            }
        }
    }

    /// Check `actual` against this spec. `path` is the location of `actual`, e.g. `$.body`,
    /// and prefixes the path of every reported mismatch.
    pub fn matches(&self, actual: &Value, path: &str) -> MatchResult {
        let mut mismatches = Vec::new();
        self.check(actual, path, Mode::Exact, &mut mismatches);
        MatchResult { mismatches }
    }

    /// Strip every matcher node, returning the concrete example value.
    ///
    /// This is what the mock server sends back when an interaction matches.
    pub fn resolve(&self) -> Value {
        match self {
            MatchSpec::Literal(value) => value.clone(),
            MatchSpec::Array(items) => Value::Array(items.iter().map(Self::resolve).collect()),
            MatchSpec::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, spec)| (key.clone(), spec.resolve()))
                    .collect(),
            ),
            MatchSpec::Like(example) => example.resolve(),
            MatchSpec::Regex { example, .. } => Value::String(example.clone()),
            MatchSpec::EachLike { example, min } => {
                Value::Array(vec![example.resolve(); (*min).max(1)])
            }
        }
    }

    /// The Pact `matchingRules` entries for this spec, keyed by JSON path below `root`.
    pub fn matching_rules(&self, root: &str) -> Map<String, Value> {
        let mut rules = Map::new();
        self.collect_rules(root, &mut rules);
        rules
    }

    /// Reject nodes that were built directly rather than parsed, and that could not be honoured.
    pub(crate) fn check_bounds(&self) -> Result<(), PactError> {
        match self {
            MatchSpec::Literal(_) | MatchSpec::Regex { .. } => Ok(()),
            MatchSpec::Array(items) => items.iter().try_for_each(Self::check_bounds),
            MatchSpec::Object(fields) => fields.values().try_for_each(Self::check_bounds),
            MatchSpec::Like(example) => example.check_bounds(),
            MatchSpec::EachLike { example, min } => {
                check_each_like_min(*min)?;
                example.check_bounds()
            }
        }
    }

    fn collect_rules(&self, path: &str, rules: &mut Map<String, Value>) {
        match self {
            MatchSpec::Literal(_) => {}
            MatchSpec::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    item.collect_rules(&index_path(path, index), rules);
                }
            }
            MatchSpec::Object(fields) => {
                for (key, spec) in fields {
                    spec.collect_rules(&key_path(path, key), rules);
                }
            }
            MatchSpec::Like(example) => {
                rules.insert(path.to_owned(), json!({"match": "type"}));
                example.collect_rules(path, rules);
            }
            MatchSpec::Regex { pattern, .. } => {
                rules.insert(
                    path.to_owned(),
                    json!({"match": "regex", "regex": pattern.as_str()}),
                );
            }
            MatchSpec::EachLike { example, min } => {
                rules.insert(path.to_owned(), json!({"match": "type", "min": min}));
                example.collect_rules(&format!("{}[*]", path), rules);
            }
        }
    }

    fn check(&self, actual: &Value, path: &str, mode: Mode, out: &mut Vec<Mismatch>) {
        match self {
            MatchSpec::Literal(expected) => match mode {
                Mode::Exact => check_literal(expected, actual, path, out),
                Mode::Type => check_kind(expected, actual, path, out),
            },
            MatchSpec::Array(items) => {
                let Value::Array(actual_items) = actual else {
                    out.push(Mismatch::new(path, self.resolve(), actual, mode.kind_reason()));
                    return;
                };
                match mode {
                    Mode::Exact => {
                        if items.len() != actual_items.len() {
                            out.push(Mismatch::new(
                                path,
                                self.resolve(),
                                actual,
                                MismatchReason::LengthMismatch,
                            ));
                        }
                        for (index, (item, actual_item)) in
                            items.iter().zip(actual_items).enumerate()
                        {
                            item.check(actual_item, &index_path(path, index), mode, out);
                        }
                    }
                    Mode::Type => {
                        // Every element is matched against the first example element.
                        if let Some(first) = items.first() {
                            for (index, actual_item) in actual_items.iter().enumerate() {
                                first.check(actual_item, &index_path(path, index), mode, out);
                            }
                        }
                    }
                }
            }
            MatchSpec::Object(fields) => {
                let Value::Object(actual_fields) = actual else {
                    out.push(Mismatch::new(path, self.resolve(), actual, mode.kind_reason()));
                    return;
                };
                for (key, spec) in fields {
                    let child = key_path(path, key);
                    match actual_fields.get(key) {
                        Some(actual_value) => spec.check(actual_value, &child, mode, out),
                        None => out.push(Mismatch::new(
                            &child,
                            spec.resolve(),
                            &Value::Null,
                            MismatchReason::MissingKey,
                        )),
                    }
                }
            }
            MatchSpec::Like(example) => example.check(actual, path, Mode::Type, out),
            MatchSpec::Regex { pattern, .. } => match actual {
                Value::String(value) if pattern.is_match(value) => {}
                Value::String(_) => out.push(Mismatch::new(
                    path,
                    Value::String(pattern.as_str().to_owned()),
                    actual,
                    MismatchReason::PatternMismatch,
                )),
                _ => out.push(Mismatch::new(
                    path,
                    self.resolve(),
                    actual,
                    MismatchReason::TypeMismatch,
                )),
            },
            MatchSpec::EachLike { example, min } => {
                let Value::Array(actual_items) = actual else {
                    out.push(Mismatch::new(
                        path,
                        Value::Array(vec![example.resolve()]),
                        actual,
                        MismatchReason::TypeMismatch,
                    ));
                    return;
                };
                if actual_items.len() < *min {
                    out.push(Mismatch::new(
                        path,
                        json!(format!("at least {} element(s)", min)),
                        actual,
                        MismatchReason::TooFewElements,
                    ));
                }
                for (index, actual_item) in actual_items.iter().enumerate() {
                    example.check(actual_item, &index_path(path, index), Mode::Type, out);
                }
            }
        }
    }
}

impl Mode {
    fn kind_reason(self) -> MismatchReason {
        match self {
            Mode::Exact => MismatchReason::ValueMismatch,
            Mode::Type => MismatchReason::TypeMismatch,
        }
    }
}

/// Deep equality on plain JSON, recording every divergent sub-path.
fn check_literal(expected: &Value, actual: &Value, path: &str, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(expected_fields), Value::Object(actual_fields)) => {
            for (key, expected_value) in expected_fields {
                let child = key_path(path, key);
                match actual_fields.get(key) {
                    Some(actual_value) => check_literal(expected_value, actual_value, &child, out),
                    None => out.push(Mismatch::new(
                        &child,
                        expected_value.clone(),
                        &Value::Null,
                        MismatchReason::MissingKey,
                    )),
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() {
                out.push(Mismatch::new(
                    path,
                    expected.clone(),
                    actual,
                    MismatchReason::LengthMismatch,
                ));
            }
            for (index, (expected_item, actual_item)) in
                expected_items.iter().zip(actual_items).enumerate()
            {
                check_literal(expected_item, actual_item, &index_path(path, index), out);
            }
        }
        (Value::Number(e), Value::Number(a)) if same_number(e, a) => {}
        (e, a) if e == a => {}
        _ => out.push(Mismatch::new(
            path,
            expected.clone(),
            actual,
            MismatchReason::ValueMismatch,
        )),
    }
}

/// Structural equality on plain JSON: same kinds, same keys, homogeneous arrays.
fn check_kind(expected: &Value, actual: &Value, path: &str, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(expected_fields), Value::Object(actual_fields)) => {
            for (key, expected_value) in expected_fields {
                let child = key_path(path, key);
                match actual_fields.get(key) {
                    Some(actual_value) => check_kind(expected_value, actual_value, &child, out),
                    None => out.push(Mismatch::new(
                        &child,
                        expected_value.clone(),
                        &Value::Null,
                        MismatchReason::MissingKey,
                    )),
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if let Some(first) = expected_items.first() {
                for (index, actual_item) in actual_items.iter().enumerate() {
                    check_kind(first, actual_item, &index_path(path, index), out);
                }
            }
        }
        (e, a) if kind(e) == kind(a) => {}
        _ => out.push(Mismatch::new(
            path,
            expected.clone(),
            actual,
            MismatchReason::TypeMismatch,
        )),
    }
}

fn is_matcher_node(fields: &Map<String, Value>) -> bool {
    let known_rule = matches!(
        fields.get("rule"),
        Some(Value::String(rule)) if MATCHER_RULES.contains(&rule.as_str())
    );
    known_rule && fields.contains_key("example")
}

fn check_each_like_min(min: usize) -> Result<(), PactError> {
    if min > MAX_EACH_LIKE_MIN {
        return Err(PactError::InvalidMatchSpec(format!(
            "`min` must be at most {}, got {}",
            MAX_EACH_LIKE_MIN, min
        )));
    }
    Ok(())
}

/// Integers are compared as integers; floats only come into play if either side is one.
fn same_number(expected: &serde_json::Number, actual: &serde_json::Number) -> bool {
    if let (Some(e), Some(a)) = (expected.as_i64(), actual.as_i64()) {
        return e == a;
    }
    if let (Some(e), Some(a)) = (expected.as_u64(), actual.as_u64()) {
        return e == a;
    }
    if expected.is_f64() || actual.is_f64() {
        return expected.as_f64() == actual.as_f64();
    }
    false
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn key_path(path: &str, key: &str) -> String {
    let is_identifier = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if is_identifier {
        format!("{}.{}", path, key)
    } else {
        format!("{}['{}']", path, key)
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

impl Serialize for MatchSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MatchSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MatchSpec::from_json(value).map_err(serde::de::Error::custom)
    }
}

/// Why a value did not satisfy its [`MatchSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    ValueMismatch,
    TypeMismatch,
    MissingKey,
    LengthMismatch,
    PatternMismatch,
    TooFewElements,
    MissingBody,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            MismatchReason::ValueMismatch => "value-mismatch",
            MismatchReason::TypeMismatch => "type-mismatch",
            MismatchReason::MissingKey => "missing-key",
            MismatchReason::LengthMismatch => "length-mismatch",
            MismatchReason::PatternMismatch => "pattern-mismatch",
            MismatchReason::TooFewElements => "too-few-elements",
            MismatchReason::MissingBody => "missing-body",
        };
        f.write_str(reason)
    }
}

/// A single divergence between an expectation and what was actually received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    /// Where the divergence is, e.g. `$.body.clients[2].age` or `$.headers.accept`.
    pub path: String,
    pub expected: Value,
    pub actual: Value,
    pub reason: MismatchReason,
}

impl Mismatch {
    pub(crate) fn new(path: &str, expected: Value, actual: &Value, reason: MismatchReason) -> Self {
        Self {
            path: path.to_owned(),
            expected,
            actual: actual.clone(),
            reason,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (expected {}, actual {})",
            self.path, self.reason, self.expected, self.actual
        )
    }
}

/// The outcome of a match attempt. No mismatches means success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub mismatches: Vec<Mismatch>,
}

impl MatchResult {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub(crate) fn push(&mut self, mismatch: Mismatch) {
        self.mismatches.push(mismatch);
    }

    pub(crate) fn merge(&mut self, other: MatchResult) {
        self.mismatches.extend(other.mismatches);
    }
}
