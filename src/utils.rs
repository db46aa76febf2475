//! Utility functions

use crate::error::{JbofError, Result};
use crate::metadata::Metadata;
use serde_json::Value;
use uuid::Uuid;

/// Expand an item name template with values from item metadata
///
/// `{key}` is replaced by the value of `key`: strings verbatim, any other
/// JSON value as its JSON text. `{{` and `}}` produce literal braces.
///
/// A placeholder may carry a format spec after a colon, `{key:spec}`, where
/// spec is `[0][width][.precision][type]`:
///
/// - `d`: integers, right-aligned or zero-padded (`{take:02d}` gives `03`)
/// - `f`: numbers in fixed-point notation, six decimals unless given
/// - `s`: strings, left-aligned, truncated to the precision
///
/// Without a type, integers format as `d` and strings as `s`. Any other spec
/// fails with [`JbofError::InvalidName`].
pub fn format_item_name(template: &str, metadata: &Metadata) -> Result<String> {
    let mut name = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                name.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                name.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => key.push(c),
                        None => {
                            return Err(JbofError::InvalidName(format!(
                                "unterminated placeholder in item name template {template:?}"
                            )))
                        }
                    }
                }
                let (key, spec) = match key.split_once(':') {
                    Some((key, spec)) => (key, Some(spec)),
                    None => (key.as_str(), None),
                };
                let value = metadata.get(key).ok_or_else(|| {
                    JbofError::InvalidName(format!(
                        "item name template {template:?} needs metadata key {key:?}"
                    ))
                })?;
                match spec.filter(|spec| !spec.is_empty()) {
                    Some(spec) => {
                        let formatted = FormatSpec::parse(spec)
                            .and_then(|parsed| parsed.apply(value))
                            .ok_or_else(|| {
                                JbofError::InvalidName(format!(
                                    "unsupported format spec {spec:?} for key {key:?} in item name template {template:?}"
                                ))
                            })?;
                        name.push_str(&formatted);
                    }
                    None => match value {
                        Value::String(s) => name.push_str(s),
                        other => name.push_str(&other.to_string()),
                    },
                }
            }
            '}' => {
                return Err(JbofError::InvalidName(format!(
                    "unmatched '}}' in item name template {template:?}"
                )))
            }
            c => name.push(c),
        }
    }

    Ok(name)
}

/// Parsed `[0][width][.precision][type]` placeholder spec
#[derive(Debug, Default, PartialEq)]
struct FormatSpec {
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let mut rest = spec;
        let mut parsed = Self::default();
        if let Some(stripped) = rest.strip_prefix('0') {
            parsed.zero = true;
            rest = stripped;
        }
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits > 0 {
            parsed.width = rest[..digits].parse().ok()?;
            rest = &rest[digits..];
        }
        if let Some(stripped) = rest.strip_prefix('.') {
            let digits =
                stripped.len() - stripped.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            if digits == 0 {
                return None;
            }
            parsed.precision = Some(stripped[..digits].parse().ok()?);
            rest = &stripped[digits..];
        }
        let mut chars = rest.chars();
        parsed.kind = chars.next();
        if chars.next().is_some() || !matches!(parsed.kind, None | Some('d' | 'f' | 's')) {
            return None;
        }
        Some(parsed)
    }

    fn apply(&self, value: &Value) -> Option<String> {
        let width = self.width;
        match (self.kind, value) {
            (Some('d') | None, Value::Number(n)) if self.precision.is_none() => {
                let n = n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from))?;
                Some(if self.zero {
                    format!("{n:0width$}")
                } else {
                    format!("{n:>width$}")
                })
            }
            (Some('f'), Value::Number(n)) => {
                let n = n.as_f64()?;
                let precision = self.precision.unwrap_or(6);
                Some(if self.zero {
                    format!("{n:0width$.precision$}")
                } else {
                    format!("{n:>width$.precision$}")
                })
            }
            (Some('s') | None, Value::String(s)) if !self.zero => {
                let s: String = match self.precision {
                    Some(precision) => s.chars().take(precision).collect(),
                    None => s.clone(),
                };
                Some(format!("{s:<width$}"))
            }
            _ => None,
        }
    }
}

/// Generate a globally unique item name
pub fn synthesize_item_name() -> String {
    Uuid::new_v4().to_string()
}

/// Whether an item name looks machine-generated rather than chosen
pub fn is_synthesized_name(name: &str) -> bool {
    Uuid::parse_str(name).is_ok()
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
