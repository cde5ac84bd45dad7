//! Reference closure of a bundle
//!
//! Every object reference in a rendered manifest (`controlPlaneRef`,
//! `infrastructureRef`, `configRef`, `identityRef`, ...) must name a
//! manifest of the same bundle with matching kind, name and apiVersion.

use capzctl_common::{Error, Result};
use serde_json::Value;

use crate::manifest::{CAPIManifest, ManifestBundle};

/// An object reference found in a manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    /// Dotted path of the reference inside the referring manifest
    pub path: String,
    /// Referenced apiVersion, if given
    pub api_version: Option<String>,
    /// Referenced kind
    pub kind: String,
    /// Referenced name
    pub name: String,
}

/// Collect object references from a manifest's spec
pub fn object_refs(manifest: &CAPIManifest) -> Vec<ObjectRef> {
    let mut refs = Vec::new();
    if let Some(spec) = &manifest.spec {
        walk(spec, "spec", &mut refs);
    }
    refs
}

fn walk(value: &Value, path: &str, refs: &mut Vec<ObjectRef>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{}.{}", path, key);
                if key.ends_with("Ref") {
                    if let Some(r) = as_ref(child, &child_path) {
                        refs.push(r);
                        continue;
                    }
                }
                walk(child, &child_path, refs);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{}[{}]", path, i), refs);
            }
        }
        _ => {}
    }
}

fn as_ref(value: &Value, path: &str) -> Option<ObjectRef> {
    let kind = value.get("kind")?.as_str()?;
    let name = value.get("name")?.as_str()?;
    Some(ObjectRef {
        path: path.to_string(),
        api_version: value
            .get("apiVersion")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind: kind.to_string(),
        name: name.to_string(),
    })
}

/// Check that every reference resolves inside the bundle
pub fn validate_references(bundle: &ManifestBundle) -> Result<()> {
    for manifest in bundle.manifests() {
        for r in object_refs(manifest) {
            let target = bundle.find(&r.kind, &r.name).ok_or_else(|| {
                Error::composition_for_kind(
                    &manifest.kind,
                    format!(
                        "{} of {} references {} '{}' which is not in the bundle",
                        r.path,
                        manifest.name(),
                        r.kind,
                        r.name
                    ),
                )
            })?;
            match &r.api_version {
                Some(v) if *v == target.api_version => {}
                Some(v) => {
                    return Err(Error::composition_for_kind(
                        &manifest.kind,
                        format!(
                            "{} of {} expects {} at {} but the bundle has {}",
                            r.path,
                            manifest.name(),
                            r.kind,
                            v,
                            target.api_version
                        ),
                    ))
                }
                None => {
                    return Err(Error::composition_for_kind(
                        &manifest.kind,
                        format!("{} of {} has no apiVersion", r.path, manifest.name()),
                    ))
                }
            }
        }
    }
    Ok(())
}
