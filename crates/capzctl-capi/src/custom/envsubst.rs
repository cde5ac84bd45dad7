//! clusterctl-style `${VAR}` substitution for custom templates
//!
//! Supported expressions:
//! - `${VAR}` value, error when unset
//! - `${VAR:=default}` / `${VAR:-default}` default when unset or empty
//! - `${VAR=default}` / `${VAR-default}` default when unset
//! - `${VAR,,}` / `${VAR^^}` lower / upper case
//! - `${VAR,}` / `${VAR^}` lower / upper case the first character
//! - `${#VAR}` length
//!
//! `$${` escapes a literal `${`. Unlike clusterctl, an unset variable without
//! a default is an error rather than an empty string.

use std::collections::BTreeMap;

use capzctl_common::{Error, Result};

/// Substitute every expression in `template`
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("${") {
        if remaining[..start].ends_with('$') {
            result.push_str(&remaining[..start - 1]);
            result.push_str("${");
            remaining = &remaining[start + 2..];
            continue;
        }
        result.push_str(&remaining[..start]);
        let after_start = &remaining[start + 2..];
        let end = after_start.find('}').ok_or_else(|| {
            Error::composition(format!(
                "unterminated expression '${{{}'",
                after_start.lines().next().unwrap_or_default()
            ))
        })?;
        result.push_str(&resolve(&after_start[..end], vars)?);
        remaining = &after_start[end + 1..];
    }
    result.push_str(remaining);
    Ok(result)
}

fn resolve(expr: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    if let Some(name) = expr.strip_prefix('#') {
        return Ok(required(name, vars)?.chars().count().to_string());
    }

    let split = expr
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(expr.len());
    let (name, op) = expr.split_at(split);
    if name.is_empty() {
        return Err(Error::composition(format!(
            "expression '${{{}}}' names no variable",
            expr
        )));
    }
    let value = vars.get(name);

    if let Some(default) = op.strip_prefix(":=").or_else(|| op.strip_prefix(":-")) {
        return Ok(match value {
            Some(v) if !v.is_empty() => v.clone(),
            _ => unquote(default).to_string(),
        });
    }
    if let Some(default) = op.strip_prefix('=').or_else(|| op.strip_prefix('-')) {
        return Ok(value.cloned().unwrap_or_else(|| unquote(default).to_string()));
    }

    let value = required(name, vars)?;
    match op {
        "" => Ok(value.to_string()),
        ",," => Ok(value.to_lowercase()),
        "^^" => Ok(value.to_uppercase()),
        "," => Ok(map_first(value, char::to_lowercase)),
        "^" => Ok(map_first(value, char::to_uppercase)),
        _ => Err(Error::composition(format!(
            "unsupported expression '${{{}}}'",
            expr
        ))),
    }
}

fn required<'a>(name: &str, vars: &'a BTreeMap<String, String>) -> Result<&'a str> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::composition(format!("template variable {} is not defined", name)))
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

fn map_first<I: Iterator<Item = char>>(value: &str, f: fn(char) -> I) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => f(first).chain(chars).collect(),
        None => String::new(),
    }
}
