use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::service_account::ServiceAccountSpec;

pub mod v1alpha1 {
    use super::*;

    pub const API_VERSION: &str = "irsactl.io/v1alpha1";
    pub const KIND: &str = "ClusterConfig";

    /// Desired IAM service accounts for an existing cluster.
    #[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct ClusterConfig {
        #[serde(default = "default_api_version")]
        pub api_version: String,

        #[serde(default = "default_kind")]
        pub kind: String,

        pub metadata: ClusterMeta,

        #[serde(default)]
        pub iam: ClusterIam,
    }

    impl ClusterConfig {
        pub fn new(name: impl Into<String>, region: Option<String>) -> Self {
            ClusterConfig {
                api_version: default_api_version(),
                kind: default_kind(),
                metadata: ClusterMeta {
                    name: name.into(),
                    region,
                },
                iam: Default::default(),
            }
        }
    }

    fn default_api_version() -> String {
        API_VERSION.to_string()
    }

    fn default_kind() -> String {
        KIND.to_string()
    }
}

/// Identifies the target cluster.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMeta {
    /// Name of the cluster.
    #[serde(default)]
    pub name: String,

    /// AWS region of the cluster.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIam {
    /// Thumbprint expected on the cluster's OIDC identity provider.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_thumbprint: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<ServiceAccountSpec>,
}

#[cfg(test)]
mod tests {
    use super::v1alpha1::*;
    use crate::AccountKey;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_config_file() {
        let cfg: ClusterConfig = serde_yaml::from_str(
            r#"
metadata:
  name: prod
  region: eu-north-1
iam:
  serviceAccounts:
    - metadata:
        name: s3-reader
        namespace: backend
        labels:
          team: storage
      attachPolicyARNs:
        - arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess
      tags:
        owner: storage
    - metadata:
        name: autoscaler
        namespace: kube-system
      attachRoleARN: arn:aws:iam::123456789012:role/autoscaler
"#,
        )
        .unwrap();

        assert_eq!(cfg.api_version, API_VERSION);
        assert_eq!(cfg.kind, KIND);
        assert_eq!(cfg.metadata.region.as_deref(), Some("eu-north-1"));
        assert_eq!(cfg.iam.oidc_thumbprint, None);
        let keys: Vec<AccountKey> = cfg.iam.service_accounts.iter().map(|sa| sa.key()).collect();
        assert_eq!(
            keys,
            vec![
                AccountKey::new("backend", "s3-reader"),
                AccountKey::new("kube-system", "autoscaler"),
            ]
        );
        assert_eq!(
            cfg.iam.service_accounts[1].attach_role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/autoscaler")
        );
    }
}
