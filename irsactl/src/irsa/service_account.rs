use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use api::ServiceAccountSpec;

pub const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// The Kubernetes side of an iamserviceaccount, bound to `role_arn`.
pub(crate) fn build(sa: &ServiceAccountSpec, role_arn: &str) -> ServiceAccount {
    let mut labels = sa.metadata.labels.clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), "irsactl".to_string());
    let mut annotations = sa.metadata.annotations.clone();
    annotations.insert(ROLE_ARN_ANNOTATION.to_string(), role_arn.to_string());

    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(sa.metadata.name.clone()),
            namespace: Some(sa.metadata.namespace.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_annotation_wins_over_user_annotations() {
        let mut sa = ServiceAccountSpec::new("backend", "s3-reader");
        sa.metadata.annotations = BTreeMap::from([
            (ROLE_ARN_ANNOTATION.to_string(), "stale".to_string()),
            ("team".to_string(), "storage".to_string()),
        ]);

        let built = build(&sa, "arn:aws:iam::123456789012:role/s3-reader");
        assert_eq!(built.metadata.namespace.as_deref(), Some("backend"));
        assert_eq!(
            built.metadata.annotations,
            Some(BTreeMap::from([
                (ROLE_ARN_ANNOTATION.to_string(), "arn:aws:iam::123456789012:role/s3-reader".to_string()),
                ("team".to_string(), "storage".to_string()),
            ]))
        );
        assert_eq!(
            built.metadata.labels.unwrap().get(MANAGED_BY_LABEL).map(String::as_str),
            Some("irsactl")
        );
    }
}
