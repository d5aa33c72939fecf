use std::collections::BTreeMap;
use std::fmt::Display;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Identifies a service account in a cluster by namespace and name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub struct AccountKey {
    pub namespace: String,
    pub name: String,
}

impl AccountKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        AccountKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountMeta {
    /// Name of the Kubernetes service account.
    #[serde(default)]
    pub name: String,

    /// Namespace of the Kubernetes service account.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Extra labels to set on the Kubernetes service account.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra annotations to set on the Kubernetes service account.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ServiceAccountMeta {
    fn default() -> Self {
        ServiceAccountMeta {
            name: String::new(),
            namespace: default_namespace(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// An IAM role bound to a Kubernetes service account.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    pub metadata: ServiceAccountMeta,

    /// ARNs of managed policies to attach to the generated role.
    #[serde(rename = "attachPolicyARNs")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attach_policy_arns: Vec<String>,

    /// Inline policy document to embed in the generated role.
    /// The document is passed on as-is.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_policy: Option<serde_json::Value>,

    /// ARN of an existing role to bind instead of generating one.
    #[serde(rename = "attachRoleARN")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_role_arn: Option<String>,

    /// Custom name for the generated role.
    /// If not set, a name is generated when the role is created.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    /// Only create the role, leave the Kubernetes service account alone.
    #[serde(default)]
    pub role_only: bool,

    /// Tags to apply to the generated role.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ServiceAccountSpec {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ServiceAccountSpec {
            metadata: ServiceAccountMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::new(&self.metadata.namespace, &self.metadata.name)
    }
}
