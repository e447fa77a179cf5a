//! Mini query language for filtering log records.
//!
//! Expressions are sequences of `field:value` tokens joined by
//! case-insensitive `AND`/`OR` keywords, evaluated strictly left to
//! right with no precedence: `a:1 OR b:2 AND c:3` means
//! `(a:1 OR b:2) AND c:3`. Values of the form `>N` / `<N` (unsigned
//! integers only) compare numerically; everything else is a
//! case-insensitive substring match. Fields resolve through dotted
//! paths into nested objects (`geo.country`).
//!
//! The grammar is deliberately forgiving: a token that does not look
//! like `field:value` at all matches every record. Filters with typos
//! therefore silently widen instead of failing.

use crate::models::LogRecord;
use serde_json::Value;

/// Boolean connective between two query tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

/// Comparison applied to a resolved field value.
#[derive(Debug, Clone, PartialEq)]
enum TokenOp {
    /// Case-insensitive substring containment.
    Contains(String),
    /// Numeric greater-than against an unsigned integer threshold.
    Gt(f64),
    /// Numeric less-than against an unsigned integer threshold.
    Lt(f64),
}

/// A single parsed token.
#[derive(Debug, Clone, PartialEq)]
enum Term {
    /// Token without a recognizable `field:value` shape: matches everything.
    Always,
    Match { field: String, op: TokenOp },
}

/// A fully parsed expression: the first token plus `(connective, token)`
/// pairs folded left to right.
#[derive(Debug, Clone, PartialEq)]
struct ParsedQuery {
    first: Term,
    rest: Vec<(Connective, Term)>,
}

impl ParsedQuery {
    fn matches(&self, record: &LogRecord) -> bool {
        let mut ok = eval_term(record, &self.first);
        for (connective, term) in &self.rest {
            let res = eval_term(record, term);
            ok = match connective {
                Connective::And => ok && res,
                Connective::Or => ok || res,
            };
        }
        ok
    }
}

/// Filter `records` with `expression`.
///
/// A blank expression is the identity filter: every record passes, in
/// the original order. Malformed expressions never fail; individual
/// tokens degrade to always-true or always-false per the grammar rules.
pub fn run_query(records: &[LogRecord], expression: &str) -> Vec<LogRecord> {
    if expression.trim().is_empty() {
        return records.to_vec();
    }

    let parsed = parse_expression(expression);
    records
        .iter()
        .filter(|record| parsed.matches(record))
        .cloned()
        .collect()
}

/// Resolve a dotted field path against a record.
///
/// Missing intermediate keys (or a non-object along the way) resolve to
/// `None`, the explicit absent marker.
pub fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// String form of a field value for substring matching and grouping.
///
/// Absent and null values stringify to the empty string; composite
/// values stringify as their JSON text.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Numeric form of a field value for `>` / `<` comparisons.
///
/// `None` means not-a-number, which fails every comparison. Numeric
/// strings parse after trimming; an empty or whitespace-only string
/// coerces to zero, as do nulls. Booleans coerce to 0/1.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::Null) => Some(0.0),
        _ => None,
    }
}

fn eval_term(record: &LogRecord, term: &Term) -> bool {
    match term {
        Term::Always => true,
        Term::Match { field, op } => {
            let value = lookup_path(record, field);
            match op {
                TokenOp::Gt(threshold) => {
                    coerce_number(value).map_or(false, |v| v > *threshold)
                }
                TokenOp::Lt(threshold) => {
                    coerce_number(value).map_or(false, |v| v < *threshold)
                }
                TokenOp::Contains(needle) => value_text(value)
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
            }
        }
    }
}

fn parse_expression(expression: &str) -> ParsedQuery {
    let (tokens, connectives) = split_connectives(expression);
    let mut terms = tokens.iter().map(|t| parse_term(t));

    let first = terms.next().unwrap_or(Term::Always);
    let rest = connectives.into_iter().zip(terms).collect();

    ParsedQuery { first, rest }
}

/// Split an expression at whitespace-delimited `AND`/`OR` keywords.
///
/// Only a keyword with whitespace on both sides separates tokens, so
/// values may themselves contain spaces. Token text is preserved
/// verbatim, including any leading/trailing whitespace of the whole
/// expression (which then fails the anchored token shape below).
fn split_connectives(expression: &str) -> (Vec<String>, Vec<Connective>) {
    let chars: Vec<(usize, char)> = expression.char_indices().collect();
    let mut tokens = Vec::new();
    let mut connectives = Vec::new();

    let mut segment_start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        if !chars[i].1.is_whitespace() {
            i += 1;
            continue;
        }

        let ws_start = chars[i].0;
        let mut j = i;
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }

        if let Some((connective, after_keyword)) = match_keyword(&chars, j) {
            // Keyword must be followed by at least one whitespace char.
            if after_keyword < chars.len() && chars[after_keyword].1.is_whitespace() {
                let mut k = after_keyword;
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                tokens.push(expression[segment_start..ws_start].to_string());
                connectives.push(connective);
                segment_start = if k < chars.len() {
                    chars[k].0
                } else {
                    expression.len()
                };
                i = k;
                continue;
            }
        }

        i = j;
    }

    tokens.push(expression[segment_start..].to_string());
    (tokens, connectives)
}

fn match_keyword(chars: &[(usize, char)], at: usize) -> Option<(Connective, usize)> {
    for (keyword, connective) in [("AND", Connective::And), ("OR", Connective::Or)] {
        let len = keyword.len();
        if at + len > chars.len() {
            continue;
        }
        let candidate: String = chars[at..at + len].iter().map(|(_, c)| c).collect();
        if candidate.eq_ignore_ascii_case(keyword) {
            return Some((connective, at + len));
        }
    }
    None
}

/// Parse one token into a term.
///
/// Shape: a leading run of `[A-Za-z0-9_.@]` as the field, optional
/// spaces, `:`, optional spaces, a non-empty remainder as the raw
/// value. Anything else is vacuously true.
fn parse_term(token: &str) -> Term {
    let field_len = token
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@'))
        .map(char::len_utf8)
        .sum::<usize>();
    if field_len == 0 {
        return Term::Always;
    }

    let field = &token[..field_len];
    let after_field = token[field_len..].trim_start();
    let Some(raw) = after_field.strip_prefix(':') else {
        return Term::Always;
    };

    let value = raw.trim_start();
    let value = if !value.is_empty() {
        value
    } else if let Some((idx, _)) = raw.char_indices().last() {
        // Whitespace-only value: the final whitespace character still
        // counts as the value.
        &raw[idx..]
    } else {
        return Term::Always;
    };

    Term::Match {
        field: field.to_string(),
        op: parse_op(value),
    }
}

/// `>`/`<` followed by nothing but ASCII digits compares numerically;
/// decimals and negatives fall through to substring matching.
fn parse_op(value: &str) -> TokenOp {
    for (prefix, build) in [
        ('>', TokenOp::Gt as fn(f64) -> TokenOp),
        ('<', TokenOp::Lt as fn(f64) -> TokenOp),
    ] {
        if let Some(digits) = value.strip_prefix(prefix) {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(threshold) = digits.parse::<f64>() {
                    return build(threshold);
                }
            }
        }
    }
    TokenOp::Contains(value.to_string())
}
