//! Path expressions over resource documents.
//!
//! A catalog path is a dotted list of segments parsed once when the catalog
//! is built:
//!
//! | Syntax                | Segment                  | Meaning                                    |
//! |-----------------------|--------------------------|--------------------------------------------|
//! | `name`                | [`PathSegment::Field`]   | object key; arrays fan out implicitly      |
//! | `telecom[system=phone]` | [`PathSegment::Filter`] | fan out, keep elements whose key equals value |
//! | `value[x]`            | [`PathSegment::Choice`]  | every key `value<Type>` (`valueQuantity`, ...) |
//!
//! Evaluation never fails: a missing key simply yields no nodes.

use std::fmt;

use serde_json::Value;

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Plain object key.
    Field(String),
    /// Array elements filtered by `key == value`.
    Filter {
        /// The array-valued field.
        field: String,
        /// Key inside each element.
        key: String,
        /// Required value of that key.
        value: String,
    },
    /// Polymorphic `name[x]` element.
    Choice(String),
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    segments: Vec<PathSegment>,
}

/// A malformed path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError {
    /// The offending path.
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path '{}': {}", self.path, self.message)
    }
}

impl std::error::Error for PathParseError {}

impl PathExpr {
    /// Parses a dotted path such as `telecom[system=phone].value`.
    ///
    /// An empty string is the root path (the document itself).
    pub fn parse(path: &str) -> Result<Self, PathParseError> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
            });
        }

        let err = |message: &str| PathParseError {
            path: path.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        for raw in split_segments(path) {
            if raw.is_empty() {
                return Err(err("empty segment"));
            }

            let Some(open) = raw.find('[') else {
                segments.push(PathSegment::Field(raw.to_string()));
                continue;
            };

            let inner = raw[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| err("unterminated '['"))?;
            let field = &raw[..open];
            if field.is_empty() {
                return Err(err("bracket without a field name"));
            }

            if inner == "x" {
                segments.push(PathSegment::Choice(field.to_string()));
            } else {
                let (key, value) = inner
                    .split_once('=')
                    .ok_or_else(|| err("filter must have the form [key=value]"))?;
                if key.is_empty() || value.is_empty() {
                    return Err(err("filter key and value must not be empty"));
                }
                segments.push(PathSegment::Filter {
                    field: field.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(Self { segments })
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Evaluates the path against a document, returning every leaf node.
    ///
    /// Arrays reached by a segment are flattened, so the result never
    /// contains an array produced by fan-out.
    pub fn evaluate<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];

        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                let Value::Object(obj) = node else {
                    continue;
                };
                match segment {
                    PathSegment::Field(name) => {
                        if let Some(child) = obj.get(name) {
                            fan_out(child, &mut next);
                        }
                    }
                    PathSegment::Filter { field, key, value } => {
                        if let Some(child) = obj.get(field) {
                            let mut candidates = Vec::new();
                            fan_out(child, &mut candidates);
                            next.extend(candidates.into_iter().filter(|element| {
                                element.get(key).and_then(Value::as_str) == Some(value.as_str())
                            }));
                        }
                    }
                    PathSegment::Choice(prefix) => {
                        for (k, child) in obj {
                            if is_choice_of(k, prefix) {
                                fan_out(child, &mut next);
                            }
                        }
                    }
                }
            }
            current = next;
        }

        current
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|s| match s {
                PathSegment::Field(name) => name.clone(),
                PathSegment::Filter { field, key, value } => format!("{field}[{key}={value}]"),
                PathSegment::Choice(prefix) => format!("{prefix}[x]"),
            })
            .collect();
        f.write_str(&rendered.join("."))
    }
}

/// Returns `true` if `key` is a typed variant of the choice element `prefix`
/// (`valueQuantity` for `value`).
pub fn is_choice_of(key: &str, prefix: &str) -> bool {
    key.len() > prefix.len()
        && key.starts_with(prefix)
        && key[prefix.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
}

fn fan_out<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter().filter(|v| !v.is_null())),
        Value::Null => {}
        other => out.push(other),
    }
}

// Dots inside a filter value (`[system=http://x.org]`) do not split segments.
fn split_segments(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts
}
