//! `${NAME}` placeholders inside catalog skeletons
//!
//! Catalog templates are JSON values whose strings may embed placeholders.
//! A string that is exactly one placeholder takes the variable's typed value
//! (so counts stay numbers); otherwise placeholders are interpolated as text.

use std::collections::BTreeSet;

use capzctl_common::{Error, Result};
use serde_json::Value;

use crate::context::{Variable, VariableMap};

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(s: &str) -> Result<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::composition(format!("unterminated placeholder in '{}'", s)))?;
        let name = &after[..end];
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(Error::composition(format!(
                "malformed placeholder '${{{}}}' in '{}'",
                name, s
            )));
        }
        out.push(Segment::Placeholder(name));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    Ok(out)
}

/// Collect the placeholder names used anywhere in `value`
pub fn placeholder_names(value: &Value) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    collect(value, &mut names)?;
    Ok(names)
}

fn collect(value: &Value, names: &mut BTreeSet<String>) -> Result<()> {
    match value {
        Value::String(s) => {
            for segment in segments(s)? {
                if let Segment::Placeholder(name) = segment {
                    names.insert(name.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, names)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect(item, names)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Variables referenced by `value`; unknown names are skipped
pub fn referenced_variables(value: &Value) -> Result<BTreeSet<Variable>> {
    Ok(placeholder_names(value)?
        .iter()
        .filter_map(|name| Variable::from_name(name))
        .collect())
}

/// Replace every placeholder in `value`.
///
/// Fails on a placeholder that names no known variable or whose variable has
/// no value, so a literal placeholder never reaches a rendered manifest.
pub fn substitute(value: &Value, vars: &VariableMap) -> Result<Value> {
    match value {
        Value::String(s) => substitute_str(s, vars),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, vars))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, vars)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn lookup<'a>(name: &str, vars: &'a VariableMap) -> Result<&'a crate::context::VarValue> {
    let var = Variable::from_name(name)
        .ok_or_else(|| Error::composition(format!("unknown template variable {}", name)))?;
    vars.get(var).ok_or_else(|| {
        Error::composition(format!(
            "template variable {} has no value in the composition context",
            name
        ))
    })
}

fn substitute_str(s: &str, vars: &VariableMap) -> Result<Value> {
    let parts = segments(s)?;
    if let [Segment::Placeholder(name)] = parts.as_slice() {
        return Ok(lookup(name, vars)?.to_json());
    }
    let mut out = String::with_capacity(s.len());
    for part in parts {
        match part {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) => out.push_str(&lookup(name, vars)?.to_string()),
        }
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> VariableMap {
        let mut vars = VariableMap::new();
        vars.set(Variable::ClusterName, "demo");
        vars.set(Variable::WorkerMachineCount, 3u32);
        vars
    }

    #[test]
    fn whole_string_placeholder_keeps_type() {
        let out = substitute(&json!({"replicas": "${WORKER_MACHINE_COUNT}"}), &vars()).unwrap();
        assert_eq!(out, json!({"replicas": 3}));
    }

    #[test]
    fn embedded_placeholders_interpolate() {
        let out = substitute(
            &json!(["${CLUSTER_NAME}-vnet", "x${WORKER_MACHINE_COUNT}y"]),
            &vars(),
        )
        .unwrap();
        assert_eq!(out, json!(["demo-vnet", "x3y"]));
    }

    #[test]
    fn non_placeholder_text_is_untouched() {
        let hostname = json!("{{ ds.meta_data[\"local_hostname\"] }}");
        assert_eq!(substitute(&hostname, &vars()).unwrap(), hostname);
        assert_eq!(substitute(&json!(true), &vars()).unwrap(), json!(true));
    }

    #[test]
    fn missing_and_unknown_variables_fail() {
        let missing = substitute(&json!("${AZURE_LOCATION}"), &vars()).unwrap_err();
        assert!(missing.to_string().contains("AZURE_LOCATION has no value"));
        let unknown = substitute(&json!("${NOPE}"), &vars()).unwrap_err();
        assert!(unknown.to_string().contains("unknown template variable NOPE"));
    }

    #[test]
    fn malformed_placeholders_fail() {
        assert!(substitute(&json!("${CLUSTER_NAME"), &vars()).is_err());
        assert!(substitute(&json!("${lower}"), &vars()).is_err());
        assert!(substitute(&json!("${}"), &vars()).is_err());
    }

    #[test]
    fn collects_referenced_variables() {
        let value = json!({"a": ["${CLUSTER_NAME}"], "b": {"c": "${AZURE_LOCATION}-${NOPE}"}});
        let names = placeholder_names(&value).unwrap();
        assert_eq!(names.len(), 3);
        let vars = referenced_variables(&value).unwrap();
        assert!(vars.contains(&Variable::ClusterName));
        assert!(vars.contains(&Variable::Location));
        assert_eq!(vars.len(), 2);
    }
}
