//! CloudFormation template for the role behind a service account.

use serde_json::{json, Map, Value};

use api::ServiceAccountSpec;

use crate::provider::OidcProvider;

pub const ROLE_OUTPUT: &str = "Role1";
const ROLE_RESOURCE: &str = "Role1";
const AUDIENCE: &str = "sts.amazonaws.com";

pub fn role_template(sa: &ServiceAccountSpec, provider: &OidcProvider) -> Value {
    let key = sa.key();
    let mut role = Map::new();
    role.insert(
        "AssumeRolePolicyDocument".to_string(),
        trust_policy(&key.namespace, &key.name, provider),
    );
    if !sa.attach_policy_arns.is_empty() {
        role.insert("ManagedPolicyArns".to_string(), json!(sa.attach_policy_arns));
    }
    if let Some(document) = &sa.attach_policy {
        role.insert(
            "Policies".to_string(),
            json!([{
                "PolicyName": {"Fn::Sub": "${AWS::StackName}-Policy1"},
                "PolicyDocument": document,
            }]),
        );
    }
    if let Some(name) = &sa.role_name {
        role.insert("RoleName".to_string(), json!(name));
    }
    if !sa.tags.is_empty() {
        let tags: Vec<Value> = sa
            .tags
            .iter()
            .map(|(k, v)| json!({"Key": k, "Value": v}))
            .collect();
        role.insert("Tags".to_string(), Value::Array(tags));
    }

    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("IAM role for serviceaccount \"{}\" [created and managed by irsactl]", key),
        "Resources": {
            ROLE_RESOURCE: {
                "Type": "AWS::IAM::Role",
                "Properties": role,
            }
        },
        "Outputs": {
            ROLE_OUTPUT: {
                "Value": {"Fn::GetAtt": [ROLE_RESOURCE, "Arn"]}
            }
        }
    })
}

/// Only the given service account, presenting a token for the STS audience, may assume the role.
fn trust_policy(namespace: &str, name: &str, provider: &OidcProvider) -> Value {
    let mut conditions = Map::new();
    conditions.insert(format!("{}:aud", provider.issuer), json!(AUDIENCE));
    conditions.insert(
        format!("{}:sub", provider.issuer),
        json!(format!("system:serviceaccount:{}:{}", namespace, name)),
    );
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["sts:AssumeRoleWithWebIdentity"],
            "Principal": {"Federated": provider.arn},
            "Condition": {"StringEquals": conditions},
        }]
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use assert_json_diff::{assert_json_eq, assert_json_include};
    use rstest::*;

    #[fixture]
    fn provider() -> OidcProvider {
        OidcProvider {
            arn: "arn:aws:iam::123456789012:oidc-provider/oidc.eks.eu-north-1.amazonaws.com/id/ABC".to_string(),
            issuer: "oidc.eks.eu-north-1.amazonaws.com/id/ABC".to_string(),
        }
    }

    #[rstest]
    fn trust_is_bound_to_the_service_account(provider: OidcProvider) {
        let sa = ServiceAccountSpec::new("backend", "s3-reader");
        let template = role_template(&sa, &provider);
        assert_json_include!(
            actual: template,
            expected: json!({
                "Resources": {"Role1": {"Properties": {"AssumeRolePolicyDocument": {"Statement": [{
                    "Principal": {"Federated": "arn:aws:iam::123456789012:oidc-provider/oidc.eks.eu-north-1.amazonaws.com/id/ABC"},
                    "Condition": {"StringEquals": {
                        "oidc.eks.eu-north-1.amazonaws.com/id/ABC:aud": "sts.amazonaws.com",
                        "oidc.eks.eu-north-1.amazonaws.com/id/ABC:sub": "system:serviceaccount:backend:s3-reader"
                    }}
                }]}}}},
                "Outputs": {"Role1": {"Value": {"Fn::GetAtt": ["Role1", "Arn"]}}}
            })
        );
    }

    #[rstest]
    fn optional_role_properties(provider: OidcProvider) {
        let mut sa = ServiceAccountSpec::new("backend", "s3-reader");
        sa.attach_policy_arns = vec!["arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess".to_string()];
        sa.attach_policy = Some(json!({"Version": "2012-10-17", "Statement": []}));
        sa.role_name = Some("s3-reader".to_string());
        sa.tags = BTreeMap::from([("owner".to_string(), "storage".to_string())]);

        let properties = role_template(&sa, &provider)["Resources"]["Role1"]["Properties"].clone();
        assert_json_eq!(properties["ManagedPolicyArns"], json!(["arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess"]));
        assert_json_eq!(properties["RoleName"], json!("s3-reader"));
        assert_json_eq!(properties["Tags"], json!([{"Key": "owner", "Value": "storage"}]));
        assert_json_eq!(
            properties["Policies"][0]["PolicyDocument"],
            json!({"Version": "2012-10-17", "Statement": []})
        );
    }

    #[rstest]
    fn unset_properties_are_left_out(provider: OidcProvider) {
        let properties = role_template(&ServiceAccountSpec::new("default", "a"), &provider)["Resources"]["Role1"]
            ["Properties"]
            .clone();
        let keys: Vec<&String> = properties.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["AssumeRolePolicyDocument"]);
    }
}
