//! Generic interpreter for catalog entries

use std::collections::BTreeMap;

use capzctl_common::{Error, Result, CLUSTER_NAME_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use serde_json::{json, Map, Value};

use crate::catalog::{
    substitute, CatalogVersion, CommandList, FragmentBody, NameRule, PlannedEntry, RefScope,
    ResourceKind, TemplateEntry,
};
use crate::context::{CompositionContext, RoleSuffix, VarValue, Variable, VariableMap};
use crate::manifest::CAPIManifest;

/// Rendered names of every planned entry, fixed before any rendering
pub(crate) struct NameTable {
    names: Vec<(ResourceKind, Option<RoleSuffix>, String)>,
}

impl NameTable {
    pub(crate) fn build(
        version: &CatalogVersion,
        ctx: &CompositionContext,
        vars: &VariableMap,
        plan: &[PlannedEntry],
    ) -> Result<Self> {
        let names = plan
            .iter()
            .map(|planned| {
                let entry = version.entry(planned.kind)?;
                let name = entry_name(entry, ctx, vars, planned.role)?;
                Ok((planned.kind, planned.role, name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }

    pub(crate) fn name_of(&self, kind: ResourceKind, role: Option<RoleSuffix>) -> Option<&str> {
        self.names
            .iter()
            .find(|(k, r, _)| *k == kind && *r == role)
            .map(|(_, _, n)| n.as_str())
    }

    fn resolve(
        &self,
        kind: ResourceKind,
        scope: RefScope,
        role: Option<RoleSuffix>,
    ) -> Option<&str> {
        let target_role = match scope {
            RefScope::Cluster => None,
            RefScope::ControlPlane => Some(RoleSuffix::CONTROL_PLANE),
            RefScope::SameRole => role,
        };
        self.name_of(kind, target_role)
    }
}

fn entry_name(
    entry: &TemplateEntry,
    ctx: &CompositionContext,
    vars: &VariableMap,
    role: Option<RoleSuffix>,
) -> Result<String> {
    match entry.name {
        NameRule::ClusterName => Ok(ctx.cluster_name.clone()),
        NameRule::RoleSuffixed => {
            let role = role.ok_or_else(|| {
                Error::composition_for_kind(entry.kind.as_str(), "role-suffixed name without a role")
            })?;
            Ok(format!("{}-{}", ctx.cluster_name, role))
        }
        NameRule::FromVariable(var) => vars.get(var).map(|v| v.to_string()).ok_or_else(|| {
            Error::composition_for_kind(
                entry.kind.as_str(),
                format!("name variable {} has no value", var),
            )
        }),
    }
}

/// Render one planned entry into a manifest
pub(crate) fn render_entry(
    version: &CatalogVersion,
    ctx: &CompositionContext,
    vars: &VariableMap,
    names: &NameTable,
    planned: &PlannedEntry,
) -> Result<CAPIManifest> {
    let kind = planned.kind;
    let entry = version.entry(kind)?;
    let api_version = version.api_version(kind)?;
    let name = names
        .name_of(kind, planned.role)
        .ok_or_else(|| Error::composition_for_kind(kind.as_str(), "entry missing from name table"))?
        .to_string();

    let mut scoped = vec![(Variable::ResourceName, VarValue::from(name.clone()))];
    if let Some(role) = planned.role {
        scoped.push((Variable::RoleSuffix, VarValue::from(role.as_str())));
    }
    let vars = vars.with(scoped);
    let in_kind = |e: Error| match e {
        Error::Composition { message, kind: None } => Error::Composition {
            message,
            kind: Some(kind.as_str().to_string()),
        },
        other => other,
    };

    let mut labels = BTreeMap::from([
        (CLUSTER_NAME_LABEL.to_string(), ctx.cluster_name.clone()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ]);
    labels.extend(entry.labels.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let mut doc = json!({
        "apiVersion": api_version,
        "kind": kind.as_str(),
        "metadata": {
            "name": name,
            "namespace": ctx.namespace,
            "labels": labels,
        },
        "spec": substitute(&(entry.skeleton)(), &vars).map_err(in_kind)?,
    });

    for fragment in entry.ordered_fragments() {
        if !fragment.guard.holds(ctx, planned.role) {
            continue;
        }
        match fragment.body {
            FragmentBody::Merge(body) => {
                let value = substitute(&body(), &vars).map_err(in_kind)?;
                merge_at(&mut doc, fragment.path, value);
            }
            FragmentBody::Commands(list) => {
                let commands = match list {
                    CommandList::Pre => &ctx.bootstrap.pre,
                    CommandList::Post => &ctx.bootstrap.post,
                };
                if !commands.is_empty() {
                    set_at(&mut doc, fragment.path, json!(commands));
                }
            }
            FragmentBody::Scalar { variable, default } => {
                let value = match vars.get(variable) {
                    Some(v) => v.to_json(),
                    None => substitute(&Value::from(default), &vars).map_err(in_kind)?,
                };
                set_at(&mut doc, fragment.path, value);
            }
        }
    }

    for slot in &entry.refs {
        if !slot.guard.holds(ctx, planned.role) {
            continue;
        }
        let target = names.resolve(slot.kind, slot.scope, planned.role).ok_or_else(|| {
            Error::composition_for_kind(
                kind.as_str(),
                format!("reference to {} has no composed target", slot.kind),
            )
        })?;
        let reference = json!({
            "apiVersion": version.api_version(slot.kind)?,
            "kind": slot.kind.as_str(),
            "name": target,
        });
        set_at(&mut doc, slot.path, reference);
    }

    serde_json::from_value(doc)
        .map_err(|e| Error::serialization_for_kind(kind.as_str(), e.to_string()))
}

/// Deep-merge `value` into the object at `path`, creating objects on the way.
///
/// Objects merge key by key; any other value replaces what was there.
pub(crate) fn merge_at(doc: &mut Value, path: &[&str], value: Value) {
    let slot = slot_at(doc, path);
    merge(slot, value);
}

/// Replace the value at `path`, creating objects on the way
pub(crate) fn set_at(doc: &mut Value, path: &[&str], value: Value) {
    *slot_at(doc, path) = value;
}

fn slot_at<'a>(doc: &'a mut Value, path: &[&str]) -> &'a mut Value {
    let mut current = doc;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            _ => unreachable!("converted to object above"),
        };
    }
    current
}

fn merge(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge(existing.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, value) => *slot = value,
    }
}
