//! Structured rendering of log lines.
//!
//! Lines arrive in one of three shapes: a JSON object written by a structured
//! logger, a bracketed `[timestamp] [LEVEL] module::Fn: message` line, or
//! anything else. [`normalize`] maps each to a [`NormalizedLine`] and never fails.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::value::RawValue;

/// `[timestamp] [LEVEL] message`
static BRACKET_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[([^\]]+)\]\s*\[([^\]]+)\]\s*(.*)$").unwrap_or_else(|_| unreachable!())
});

/// How far past `::` a colon may appear for the prefix to count as a module.
pub const MODULE_LOOKAHEAD: usize = 40;

/// Timestamp layouts tried, in order, when rewriting bracketed timestamps.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S,%3f", "%Y-%m-%d %H:%M:%S%.f"];

/// A log line in uniform form.
///
/// Serializes untagged: JSON lines as themselves, parsed lines as
/// `{time, level, module, message, raw}`, everything else as `{raw}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NormalizedLine {
    /// A JSON object passed through byte for byte.
    Structured(Box<RawValue>),
    /// A bracketed line split into fields.
    Parsed {
        /// Timestamp, rewritten to RFC 3339 UTC when it could be parsed.
        time: String,
        /// Lower-cased level.
        level: String,
        /// Module prefix, or empty.
        module: String,
        /// Message text after the module prefix.
        message: String,
        /// The line as received.
        raw: String,
    },
    /// A line that matched no known shape.
    Raw {
        /// The line as received.
        raw: String,
    },
}

impl NormalizedLine {
    /// The original text of the line.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Structured(value) => value.get(),
            Self::Parsed { raw, .. } | Self::Raw { raw } => raw,
        }
    }
}

impl PartialEq for NormalizedLine {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Structured(a), Self::Structured(b)) => a.get() == b.get(),
            (
                Self::Parsed {
                    time: t1,
                    level: l1,
                    module: m1,
                    message: msg1,
                    raw: r1,
                },
                Self::Parsed {
                    time: t2,
                    level: l2,
                    module: m2,
                    message: msg2,
                    raw: r2,
                },
            ) => t1 == t2 && l1 == l2 && m1 == m2 && msg1 == msg2 && r1 == r2,
            (Self::Raw { raw: a }, Self::Raw { raw: b }) => a == b,
            _ => false,
        }
    }
}

/// Normalizes one line. Surrounding whitespace is trimmed first.
#[must_use]
pub fn normalize(line: &str) -> NormalizedLine {
    let line = line.trim();

    if line.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Box<RawValue>>(line) {
            return NormalizedLine::Structured(value);
        }
    }

    let Some(caps) = BRACKET_LINE_REGEX.captures(line) else {
        return NormalizedLine::Raw {
            raw: line.to_string(),
        };
    };
    let field = |i: usize| caps.get(i).map_or("", |m| m.as_str().trim());

    let (module, message) = split_module(field(3));
    NormalizedLine::Parsed {
        time: normalize_timestamp(field(1)),
        level: field(2).to_lowercase(),
        module: module.to_string(),
        message: message.to_string(),
        raw: line.to_string(),
    }
}

/// Normalizes every line, preserving order.
#[must_use]
pub fn normalize_all<S: AsRef<str>>(lines: &[S]) -> Vec<NormalizedLine> {
    lines.iter().map(|l| normalize(l.as_ref())).collect()
}

/// Rewrites a recognised timestamp as RFC 3339 UTC; anything else is kept verbatim.
///
/// Timestamps without an offset are taken to be UTC.
#[must_use]
pub fn normalize_timestamp(ts: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(ts, layout).ok())
        .map_or_else(
            || ts.to_string(),
            |naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
}

/// Splits `Module::Fn: message` into (`Module`, `message`).
///
/// The prefix counts as a module only when a colon follows `::` within
/// [`MODULE_LOOKAHEAD`] bytes; otherwise the message is returned whole.
fn split_module(msg: &str) -> (&str, &str) {
    let Some(idx) = msg.find("::") else {
        return ("", msg);
    };
    if idx == 0 {
        return ("", msg);
    }
    let rest = &msg[idx + 2..];
    match rest.find(':') {
        Some(colon) if colon < MODULE_LOOKAHEAD => {
            (msg[..idx].trim(), rest[colon + 1..].trim())
        }
        _ => ("", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn bracketed_line_is_split() {
        let line = "[2025-09-19 04:37:38,155] [ERROR] ModbusServiceFunctions::ReadInt: Read timeout";
        assert_eq!(
            normalize(line),
            NormalizedLine::Parsed {
                time: "2025-09-19T04:37:38.155Z".to_string(),
                level: "error".to_string(),
                module: "ModbusServiceFunctions".to_string(),
                message: "Read timeout".to_string(),
                raw: line.to_string(),
            }
        );
    }

    #[test]
    fn bracketed_line_without_module() {
        let NormalizedLine::Parsed {
            module, message, ..
        } = normalize("[2025-09-19 04:37:38,000] [Info] service started")
        else {
            panic!("expected parsed line");
        };
        assert_eq!(module, "");
        assert_eq!(message, "service started");
    }

    #[test]
    fn far_colon_is_not_a_module() {
        let msg = "see std::collections for details, the long explanation ends here: ok";
        let NormalizedLine::Parsed {
            module, message, ..
        } = normalize(&format!("[t] [warn] {msg}"))
        else {
            panic!("expected parsed line");
        };
        assert_eq!(module, "");
        assert_eq!(message, msg);
    }

    #[test]
    fn json_object_passes_through_unmodified() {
        let line = r#"{"level":"info","msg":"hi",  "n":1}"#;
        let normalized = normalize(&format!("  {line}  "));
        assert!(matches!(normalized, NormalizedLine::Structured(_)));
        assert_eq!(normalized.raw(), line);
        assert_eq!(serde_json::to_string(&normalized).expect("json"), line);
    }

    #[test]
    fn invalid_json_falls_back_to_raw() {
        let normalized = normalize("{not json");
        assert_eq!(
            normalized,
            NormalizedLine::Raw {
                raw: "{not json".to_string()
            }
        );
    }

    #[test]
    fn raw_serializes_with_single_field() {
        let json = serde_json::to_value(normalize("plain text")).expect("json");
        assert_eq!(json, serde_json::json!({"raw": "plain text"}));
    }

    #[test]
    fn parsed_serializes_all_fields() {
        let json = serde_json::to_value(normalize("[x] [DEBUG] A::b: c")).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "time": "x",
                "level": "debug",
                "module": "A",
                "message": "c",
                "raw": "[x] [DEBUG] A::b: c",
            })
        );
    }

    #[test_case("2025-09-19 04:37:38,155", "2025-09-19T04:37:38.155Z" ; "comma millis")]
    #[test_case("2025-09-19 04:37:38", "2025-09-19T04:37:38Z" ; "no fraction")]
    #[test_case("2025-09-19T07:37:38+03:00", "2025-09-19T04:37:38Z" ; "rfc3339 offset")]
    #[test_case("yesterday", "yesterday" ; "unparseable kept")]
    fn timestamps(input: &str, expected: &str) {
        assert_eq!(normalize_timestamp(input), expected);
    }

    #[test_case("Mod::Fn: msg", ("Mod", "msg") ; "module and function")]
    #[test_case("::Fn: msg", ("", "::Fn: msg") ; "leading separator")]
    #[test_case("no module here", ("", "no module here") ; "none")]
    #[test_case("A::B", ("", "A::B") ; "no colon after")]
    fn module_split(input: &str, expected: (&str, &str)) {
        assert_eq!(split_module(input), expected);
    }

    #[test]
    fn normalize_all_preserves_order() {
        let out = normalize_all(&["one", "two"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].raw(), "two");
    }

    proptest! {
        #[test]
        fn never_panics_and_keeps_raw(line in ".{0,200}") {
            let normalized = normalize(&line);
            prop_assert_eq!(normalized.raw(), line.trim());
        }
    }
}
