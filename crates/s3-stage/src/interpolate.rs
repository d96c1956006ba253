//! Shell-style `${VAR}` / `$VAR` substitution over argument values.
//!
//! This is a pure function of the template and an environment snapshot; it
//! never spawns a shell. Backslash escapes (`\$`, `\\`) are honoured in both
//! modes so values stay readable whether or not lookup is enabled.

use std::collections::HashMap;

use crate::error::Error;

/// Environment snapshot used for lookups.
pub type Env = HashMap<String, String>;

/// Expand variable references in `template`.
///
/// With `lookup` disabled, references are copied through untouched and this
/// never fails. With it enabled, a reference to an unset variable (and no
/// `:-` default) is a validation error.
pub fn interpolate(template: &str, lookup: bool, env: &Env) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('$' | '\\'))) => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '$' if lookup => {
                let rest = &template[i + 1..];
                let (value, consumed) = expand_reference(rest, template, env)?;
                out.push_str(&value);
                for _ in 0..consumed {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Expand every token; the first failing token fails the whole sequence.
pub fn interpolate_all(tokens: &[String], lookup: bool, env: &Env) -> Result<Vec<String>, Error> {
    tokens.iter().map(|t| interpolate(t, lookup, env)).collect()
}

/// Resolve the reference following a `$`. Returns the substituted text and the
/// number of chars consumed after the `$`.
fn expand_reference(rest: &str, template: &str, env: &Env) -> Result<(String, usize), Error> {
    if let Some(body) = rest.strip_prefix('{') {
        let Some(end) = closing_brace(body) else {
            return Err(Error::validation(format!(
                "unterminated variable reference in '{template}'"
            )));
        };
        let inner = &body[..end];
        let consumed = inner.chars().count() + 2;

        let (name, default) = match inner.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (inner, None),
        };
        if !is_name(name) {
            return Err(Error::validation(format!(
                "bad substitution '${{{inner}}}' in '{template}'"
            )));
        }

        // The default is only expanded when it is used.
        let value = match (env.get(name), default) {
            (Some(v), Some(d)) if v.is_empty() => interpolate(d, true, env)?,
            (Some(v), _) => v.clone(),
            (None, Some(d)) => interpolate(d, true, env)?,
            (None, None) => return Err(unset(name, template)),
        };
        return Ok((value, consumed));
    }

    let name_len = rest
        .char_indices()
        .take_while(|&(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        .count();
    if name_len == 0 {
        // Lone `$` stays literal.
        return Ok(("$".to_string(), 0));
    }
    let name = &rest[..name_len];
    match env.get(name) {
        Some(v) => Ok((v.clone(), name_len)),
        None => Err(unset(name, template)),
    }
}

/// Byte offset of the `}` closing a `${`, skipping nested `${...}` and escapes.
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some(&(_, '$' | '\\'))) => {
                chars.next();
            }
            '$' if matches!(chars.peek(), Some(&(_, '{'))) => {
                chars.next();
                depth += 1;
            }
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn unset(name: &str, template: &str) -> Error {
    Error::validation(format!(
        "environment variable '{name}' is not set (referenced in '{template}'); \
         set it or pass --disable-lookup"
    ))
}
