//! User-supplied templates that replace the built-in catalog
//!
//! A custom template is a complete multi-document YAML file. Files named
//! `*.jinja` or `*.j2` render with Jinja in strict-undefined mode; anything
//! else renders with clusterctl-style `${VAR}` substitution. Either way an
//! undefined variable fails composition, and the rendered documents form a
//! bundle keyed `<kind>/<name>`.

mod envsubst;

use std::collections::BTreeMap;
use std::path::Path;

use capzctl_common::{Error, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Deserialize;
use serde_json::Value;

use crate::context::{CompositionContext, DiskMode, OsFamily, Topology};
use crate::manifest::{CAPIManifest, ManifestBundle};

/// Template language of a custom template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateSyntax {
    /// `${VAR}` substitution
    Envsubst,
    /// Jinja
    Jinja,
}

impl TemplateSyntax {
    /// Syntax implied by a file name
    pub fn for_file_name(name: &str) -> Self {
        if name.ends_with(".jinja") || name.ends_with(".j2") {
            TemplateSyntax::Jinja
        } else {
            TemplateSyntax::Envsubst
        }
    }
}

/// A custom cluster template
#[derive(Clone, Debug, PartialEq)]
pub struct CustomTemplate {
    /// File name the template came from
    pub name: String,
    /// Template text
    pub source: String,
    /// Template language
    pub syntax: TemplateSyntax,
}

impl CustomTemplate {
    /// Template from in-memory text; the syntax follows the name's extension
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            syntax: TemplateSyntax::for_file_name(&name),
            name,
            source: source.into(),
        }
    }

    /// Read a template file
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::validation_for_field(
                capzctl_common::error::UNKNOWN_CONTEXT,
                "template",
                format!("cannot read template {}: {}", path.display(), e),
            )
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_source(name, source))
    }

    /// Render to YAML text
    pub fn render(&self, ctx: &CompositionContext) -> Result<String> {
        let vars = template_variables(ctx);
        match self.syntax {
            TemplateSyntax::Envsubst => {
                let env = vars
                    .iter()
                    .filter_map(|(k, v)| scalar_text(v).map(|s| (k.clone(), s)))
                    .collect();
                envsubst::substitute(&self.source, &env)
                    .map_err(|e| Error::composition(format!("{}: {}", self.name, e)))
            }
            TemplateSyntax::Jinja => {
                let mut env = Environment::new();
                env.set_undefined_behavior(UndefinedBehavior::Strict);
                env.render_str(&self.source, &vars)
                    .map_err(|e| Error::composition(format!("{}: {}", self.name, e)))
            }
        }
    }
}

/// Variables visible to custom templates
///
/// Every catalog variable the context supplies, plus feature switches and the
/// bootstrap command lists. Optional values the catalog defaults are always
/// present so strict Jinja rendering never trips on them.
pub fn template_variables(ctx: &CompositionContext) -> BTreeMap<String, Value> {
    let mut vars: BTreeMap<String, Value> = ctx
        .variables()
        .to_env()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    vars.entry("AZURE_SSH_PUBLIC_KEY_B64".to_string())
        .or_insert_with(|| Value::from(""));
    vars.entry("AZURE_VNET_NAME".to_string())
        .or_insert_with(|| Value::from(format!("{}-vnet", ctx.cluster_name)));
    vars.insert(
        "CONTROL_PLANE_MACHINE_COUNT".to_string(),
        Value::from(ctx.control_plane.count),
    );
    vars.insert(
        "WORKER_MACHINE_COUNT".to_string(),
        Value::from(ctx.workers.count),
    );
    vars.insert(
        "WINDOWS".to_string(),
        Value::Bool(ctx.os_family == OsFamily::Windows),
    );
    vars.insert(
        "EPHEMERAL".to_string(),
        Value::Bool(ctx.disk_mode == DiskMode::Ephemeral),
    );
    vars.insert(
        "EXTERNAL_CLOUD_PROVIDER".to_string(),
        Value::Bool(ctx.external_cloud_provider),
    );
    vars.insert(
        "NODEPOOL_TYPE".to_string(),
        Value::from(match ctx.topology {
            Topology::MachineDeployment => "machinedeployment",
            Topology::MachinePool => "machinepool",
        }),
    );
    vars.insert(
        "PRE_BOOTSTRAP_COMMANDS".to_string(),
        Value::from(ctx.bootstrap.pre.clone()),
    );
    vars.insert(
        "POST_BOOTSTRAP_COMMANDS".to_string(),
        Value::from(ctx.bootstrap.post.clone()),
    );
    vars
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Render a custom template into a bundle
pub(crate) fn render_bundle(template: &CustomTemplate, ctx: &CompositionContext) -> Result<ManifestBundle> {
    let rendered = template.render(ctx)?;
    parse_bundle(&template.name, &rendered)
}

/// Parse multi-document YAML into a bundle keyed `<kind>/<name>`
pub fn parse_bundle(origin: &str, yaml: &str) -> Result<ManifestBundle> {
    let mut bundle = ManifestBundle::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::composition(format!("{} is not valid YAML: {}", origin, e)))?;
        if value.is_null() {
            continue;
        }
        let manifest: CAPIManifest = serde_yaml::from_value(value).map_err(|e| {
            Error::composition(format!("{} contains an invalid manifest: {}", origin, e))
        })?;
        let key = format!("{}/{}", manifest.kind.to_lowercase(), manifest.name());
        bundle.push(key, manifest)?;
    }
    if bundle.is_empty() {
        return Err(Error::composition(format!("{} rendered no manifests", origin)));
    }
    Ok(bundle)
}
