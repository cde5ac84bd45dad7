//! Bootstrap command documents
//!
//! Users may supply a small YAML document with commands to run on every
//! node before and after kubeadm:
//!
//! ```yaml
//! preBootstrapCommands:
//!   - apt-get update
//! postBootstrapCommands: "echo done"
//! ```
//!
//! Each key accepts a single string or a list of strings. An empty string
//! means zero commands. Unknown keys are rejected.

use capzctl_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ordered pre- and post-kubeadm commands
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapCommands {
    /// Commands run before kubeadm
    pub pre: Vec<String>,
    /// Commands run after kubeadm
    pub post: Vec<String>,
}

impl BootstrapCommands {
    /// True when neither list has commands
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Parse a bootstrap command document.
    ///
    /// An empty or null document yields no commands.
    pub fn parse(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        let invalid = |message: String| {
            Error::validation_for_field(
                capzctl_common::error::UNKNOWN_CONTEXT,
                "bootstrapCommands",
                format!("invalid bootstrap command document: {}", message),
            )
        };
        let value: serde_yaml::Value =
            serde_yaml::from_str(document).map_err(|e| invalid(e.to_string()))?;
        match value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {}
            _ => return Err(invalid("expected a mapping".to_string())),
        }
        let raw: RawBootstrapDocument =
            serde_yaml::from_value(value).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pre: normalize("preBootstrapCommands", raw.pre_bootstrap_commands)?,
            post: normalize("postBootstrapCommands", raw.post_bootstrap_commands)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawBootstrapDocument {
    #[serde(default)]
    pre_bootstrap_commands: Option<OneOrMany>,
    #[serde(default)]
    post_bootstrap_commands: Option<OneOrMany>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn normalize(field: &str, value: Option<OneOrMany>) -> Result<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(OneOrMany::One(command)) if command.trim().is_empty() => Ok(Vec::new()),
        Some(OneOrMany::One(command)) => Ok(vec![command]),
        Some(OneOrMany::Many(commands)) => {
            if let Some(index) = commands.iter().position(|c| c.trim().is_empty()) {
                return Err(Error::validation_for_field(
                    capzctl_common::error::UNKNOWN_CONTEXT,
                    format!("{}[{}]", field, index),
                    "bootstrap commands must be non-empty strings",
                ));
            }
            Ok(commands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn single_string_becomes_one_command() {
        let commands = BootstrapCommands::parse("preBootstrapCommands: \"touch /tmp/a\"").unwrap();
        assert_eq!(commands.pre, vec!["touch /tmp/a".to_string()]);
        assert!(commands.post.is_empty());
    }

    #[test]
    fn lists_keep_their_order() {
        let doc = "preBootstrapCommands:\n  - one\n  - two\npostBootstrapCommands:\n  - three\n";
        let commands = BootstrapCommands::parse(doc).unwrap();
        assert_eq!(commands.pre, vec!["one", "two"]);
        assert_eq!(commands.post, vec!["three"]);
    }

    #[rstest]
    #[case::empty_document("")]
    #[case::whitespace_document("  \n")]
    #[case::null_document("~")]
    #[case::empty_string("preBootstrapCommands: \"\"")]
    #[case::null_value("postBootstrapCommands: null")]
    #[case::empty_list("preBootstrapCommands: []")]
    fn documents_with_no_commands(#[case] doc: &str) {
        assert!(BootstrapCommands::parse(doc).unwrap().is_empty());
    }

    #[rstest]
    #[case::unknown_key("preCommands: [a]")]
    #[case::number("preBootstrapCommands: 5")]
    #[case::mapping("preBootstrapCommands: {a: b}")]
    #[case::not_a_mapping("- a\n- b")]
    #[case::blank_list_entry("preBootstrapCommands: [\"ok\", \"\"]")]
    fn malformed_documents_are_validation_errors(#[case] doc: &str) {
        assert!(matches!(
            BootstrapCommands::parse(doc),
            Err(Error::Validation { .. })
        ));
    }
}
