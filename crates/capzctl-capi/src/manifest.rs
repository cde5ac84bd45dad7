//! Composed manifests and the bundle that carries them
//!
//! A [`CAPIManifest`] is an untyped Kubernetes resource. A [`ManifestBundle`]
//! is the ordered set of manifests produced by one composition, each stored
//! under a stable key (e.g. `control-plane`, `worker-pool-0`) so callers and
//! the reference checker can look entries up without knowing rendered names.

use std::collections::BTreeMap;

use capzctl_common::{Error, Result};
use serde_json::Value;

/// A CAPI manifest represented as an untyped Kubernetes resource
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CAPIManifest {
    /// API version (e.g., "cluster.x-k8s.io/v1beta1")
    pub api_version: String,
    /// Kind of resource (e.g., "Cluster", "MachineDeployment")
    pub kind: String,
    /// Resource metadata
    pub metadata: ManifestMetadata,
    /// Resource spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
    /// Any other top-level fields (`data`, `stringData`, `type`) of
    /// resources supplied through custom templates
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CAPIManifest {
    /// Create a new CAPI manifest
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ManifestMetadata {
                name: name.into(),
                namespace: Some(namespace.into()),
                labels: None,
                annotations: None,
            },
            spec: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the spec for this manifest
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Add labels to the manifest
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels = Some(labels);
        self
    }

    /// Name of the resource
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Look up a value inside the spec by path
    pub fn spec_at(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self.spec.as_ref()?;
        for segment in path {
            current = current.get(*segment)?;
        }
        Some(current)
    }

    /// Serialize the manifest to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization_for_kind(&self.kind, e.to_string()))
    }

    /// Serialize the manifest to a single YAML document
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::serialization_for_kind(&self.kind, e.to_string()))
    }
}

/// Metadata for a CAPI manifest
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ManifestMetadata {
    /// Name of the resource
    pub name: String,
    /// Namespace (optional for cluster-scoped resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// One manifest of a bundle together with its cross-reference key
#[derive(Clone, Debug, PartialEq)]
pub struct BundleEntry {
    /// Stable key, independent of the rendered name
    pub key: String,
    /// The rendered manifest
    pub manifest: CAPIManifest,
}

/// Ordered, de-duplicated set of composed manifests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManifestBundle {
    entries: Vec<BundleEntry>,
}

impl ManifestBundle {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manifest under `key`.
    ///
    /// Keys are unique, and so is each (kind, name) pair.
    pub fn push(&mut self, key: impl Into<String>, manifest: CAPIManifest) -> Result<()> {
        let key = key.into();
        if self.entries.iter().any(|e| e.key == key) {
            return Err(Error::composition_for_kind(
                &manifest.kind,
                format!("duplicate bundle key '{}'", key),
            ));
        }
        if self.find(&manifest.kind, manifest.name()).is_some() {
            return Err(Error::composition_for_kind(
                &manifest.kind,
                format!("duplicate manifest '{}'", manifest.name()),
            ));
        }
        self.entries.push(BundleEntry { key, manifest });
        Ok(())
    }

    /// All entries in composition order
    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    /// Iterate over the manifests in composition order
    pub fn manifests(&self) -> impl Iterator<Item = &CAPIManifest> {
        self.entries.iter().map(|e| &e.manifest)
    }

    /// Manifest stored under `key`
    pub fn get(&self, key: &str) -> Option<&CAPIManifest> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.manifest)
    }

    /// Manifest with the given kind and name
    pub fn find(&self, kind: &str, name: &str) -> Option<&CAPIManifest> {
        self.manifests().find(|m| m.kind == kind && m.name() == name)
    }

    /// Manifests of one kind
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a CAPIManifest> + 'a {
        self.manifests().filter(move |m| m.kind == kind)
    }

    /// Number of manifests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the bundle holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the bundle as a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let docs = self
            .manifests()
            .map(CAPIManifest::to_yaml)
            .collect::<Result<Vec<_>>>()?;
        Ok(docs.join("---\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster(name: &str) -> CAPIManifest {
        CAPIManifest::new("cluster.x-k8s.io/v1beta1", "Cluster", name, "default")
            .with_spec(json!({"paused": false}))
    }

    mod capi_manifest {
        use super::*;

        #[test]
        fn serializes_camel_case_without_empty_fields() {
            let yaml = cluster("demo").to_yaml().unwrap();
            assert!(yaml.contains("apiVersion: cluster.x-k8s.io/v1beta1"));
            assert!(yaml.contains("kind: Cluster"));
            assert!(!yaml.contains("labels"));
            assert!(!yaml.contains("annotations"));
        }

        #[test]
        fn extra_top_level_fields_round_trip_through_flatten() {
            let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cni\ndata:\n  calico.yaml: x\n";
            let manifest: CAPIManifest = serde_yaml::from_str(yaml).unwrap();
            assert!(manifest.spec.is_none());
            assert_eq!(manifest.extra["data"]["calico.yaml"], json!("x"));
            assert!(manifest.to_yaml().unwrap().contains("calico.yaml: x"));
        }

        #[test]
        fn spec_at_walks_nested_objects() {
            let m = CAPIManifest::new("v", "K", "n", "ns")
                .with_spec(json!({"template": {"spec": {"vmSize": "Standard_D2s_v3"}}}));
            assert_eq!(
                m.spec_at(&["template", "spec", "vmSize"]),
                Some(&json!("Standard_D2s_v3"))
            );
            assert_eq!(m.spec_at(&["template", "missing"]), None);
        }
    }

    mod bundle {
        use super::*;

        #[test]
        fn rejects_duplicate_keys_and_names() {
            let mut bundle = ManifestBundle::new();
            bundle.push("cluster", cluster("demo")).unwrap();
            assert!(matches!(
                bundle.push("cluster", cluster("other")),
                Err(Error::Composition { .. })
            ));
            assert!(matches!(
                bundle.push("cluster-2", cluster("demo")),
                Err(Error::Composition { .. })
            ));
            assert_eq!(bundle.len(), 1);
        }

        #[test]
        fn yaml_stream_separates_documents_in_order() {
            let mut bundle = ManifestBundle::new();
            bundle.push("a", cluster("a")).unwrap();
            bundle.push("b", cluster("b")).unwrap();
            let yaml = bundle.to_yaml().unwrap();
            assert_eq!(yaml.matches("---\n").count(), 1);
            assert!(yaml.find("name: a").unwrap() < yaml.find("name: b").unwrap());
        }

        #[test]
        fn lookup_by_key_kind_and_name() {
            let mut bundle = ManifestBundle::new();
            bundle.push("cluster", cluster("demo")).unwrap();
            assert_eq!(bundle.get("cluster").map(|m| m.name()), Some("demo"));
            assert!(bundle.find("Cluster", "demo").is_some());
            assert!(bundle.find("AzureCluster", "demo").is_none());
            assert_eq!(bundle.of_kind("Cluster").count(), 1);
        }
    }
}
