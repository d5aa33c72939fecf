//! Provisioning of IAM roles for service accounts.
//!
//! Each target gets a role, either an existing one named by `attachRoleARN` or one deployed as a
//! CloudFormation stack, and unless it is role-only, a Kubernetes service account annotated with
//! that role. Targets are worked on concurrently, the batch succeeds or fails as a whole.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use api::ServiceAccountSpec;

use crate::provider::{
    OidcManager, OidcProvider, Provisioner, ServiceAccountClient, StackManager, StackRequest,
};
use crate::{Error, Result};

pub mod service_account;
pub mod template;

pub struct Irsa {
    cluster_name: String,
    stacks: Arc<dyn StackManager>,
    oidc: Arc<dyn OidcManager>,
    service_accounts: Arc<dyn ServiceAccountClient>,
    timeout: Duration,
}

/// What will be done for one target, logged in plan mode.
enum Task {
    DeployRole { stack: String },
    UseRole { arn: String },
}

struct Planned<'a> {
    sa: &'a ServiceAccountSpec,
    task: Task,
}

impl Display for Planned<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = self.sa.key();
        match &self.task {
            Task::DeployRole { stack } => write!(f, "create IAM role stack {:?} for serviceaccount \"{}\"", stack, key)?,
            Task::UseRole { arn } => write!(f, "use existing IAM role {:?} for serviceaccount \"{}\"", arn, key)?,
        }
        if !self.sa.role_only {
            write!(f, ", then create or update serviceaccount \"{}\"", key)?;
        }
        Ok(())
    }
}

impl Irsa {
    pub fn new(
        cluster_name: impl Into<String>,
        stacks: Arc<dyn StackManager>,
        oidc: Arc<dyn OidcManager>,
        service_accounts: Arc<dyn ServiceAccountClient>,
        timeout: Duration,
    ) -> Self {
        Irsa {
            cluster_name: cluster_name.into(),
            stacks,
            oidc,
            service_accounts,
            timeout,
        }
    }

    fn plan<'a>(&self, sa: &'a ServiceAccountSpec) -> Planned<'a> {
        let task = match &sa.attach_role_arn {
            Some(arn) => Task::UseRole { arn: arn.clone() },
            None => Task::DeployRole {
                stack: self.stacks.stack_name(&sa.key()),
            },
        };
        Planned { sa, task }
    }

    async fn create_one(
        &self,
        sa: &ServiceAccountSpec,
        provider: &OidcProvider,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let key = sa.key();
        let role_arn = match &sa.attach_role_arn {
            Some(arn) => arn.clone(),
            None => {
                let request = StackRequest {
                    name: self.stacks.stack_name(&key),
                    template_body: serde_json::to_string(&template::role_template(sa, provider))?,
                    key: key.clone(),
                };
                self.stacks.deploy(&request, cancel).await?
            }
        };
        if sa.role_only {
            info!("IAM role {} for \"{}\" is ready, serviceaccount left untouched", role_arn, key);
            return Ok(());
        }
        self.service_accounts
            .apply(service_account::build(sa, &role_arn))
            .await
    }
}

#[async_trait]
impl Provisioner for Irsa {
    #[instrument(skip_all, fields(cluster = %self.cluster_name, targets = targets.len()))]
    async fn create_iam_service_accounts(
        &self,
        targets: &[ServiceAccountSpec],
        plan: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if targets.is_empty() {
            info!("no iamserviceaccounts to create");
            return Ok(());
        }
        if plan {
            for sa in targets {
                info!("(plan) would {}", self.plan(sa));
            }
            warn!("no changes were applied, run again with '--approve' to apply the changes");
            return Ok(());
        }

        let provider = self.oidc.provider().await?.ok_or_else(|| {
            Error::provisioning(format!(
                "no IAM OIDC provider associated with cluster {:?}",
                self.cluster_name
            ))
        })?;

        let batch = join_all(targets.iter().map(|sa| self.create_one(sa, &provider, cancel)));
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            results = tokio::time::timeout(self.timeout, batch) => results.map_err(|_| {
                Error::provisioning(format!("timed out after {:?} waiting for iamserviceaccount(s)", self.timeout))
            })?,
        };

        let failures: Vec<String> = targets
            .iter()
            .zip(results)
            .filter_map(|(sa, result)| result.err().map(|e| format!("\"{}\": {}", sa.key(), e)))
            .collect();
        if !failures.is_empty() {
            return Err(Error::provisioning(format!(
                "{} of {} iamserviceaccount(s) failed: {}",
                failures.len(),
                targets.len(),
                failures.join("; ")
            )));
        }
        info!("{} iamserviceaccount(s) ready", targets.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn irsa(fake: &FakeCluster) -> Irsa {
        Irsa::new(
            "prod",
            Arc::new(fake.clone()),
            Arc::new(fake.clone()),
            Arc::new(fake.clone()),
            Duration::from_secs(30),
        )
    }

    #[fixture]
    fn targets() -> Vec<ServiceAccountSpec> {
        let mut a = ServiceAccountSpec::new("default", "a");
        a.attach_policy_arns = vec!["arn:aws:iam::aws:policy/ReadOnlyAccess".to_string()];
        let mut b = ServiceAccountSpec::new("kube-system", "b");
        b.attach_role_arn = Some("arn:aws:iam::123456789012:role/existing".to_string());
        vec![a, b]
    }

    #[rstest]
    #[tokio::test]
    async fn plan_changes_nothing(targets: Vec<ServiceAccountSpec>) {
        let fake = FakeCluster::builder().build();
        irsa(&fake)
            .create_iam_service_accounts(&targets, true, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fake.counts().deploys, 0);
        assert_eq!(fake.counts().applies, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn attached_roles_skip_the_stack(targets: Vec<ServiceAccountSpec>) {
        let fake = FakeCluster::builder().build();
        irsa(&fake)
            .create_iam_service_accounts(&targets, false, &CancellationToken::new())
            .await
            .unwrap();

        let deployed: Vec<String> = fake.deployed().into_iter().map(|s| s.name).collect();
        assert_eq!(deployed, vec!["test-default-a".to_string()]);

        let mut role_arns: Vec<String> = fake
            .applied()
            .iter()
            .map(|sa| sa.metadata.annotations.as_ref().unwrap()[service_account::ROLE_ARN_ANNOTATION].clone())
            .collect();
        role_arns.sort();
        assert_eq!(
            role_arns,
            vec![
                "arn:aws:iam::123456789012:role/existing".to_string(),
                "arn:aws:iam::123456789012:role/test-default-a".to_string(),
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn role_only_leaves_kubernetes_alone(targets: Vec<ServiceAccountSpec>) {
        let fake = FakeCluster::builder().build();
        let mut role_only = targets[0].clone();
        role_only.role_only = true;
        irsa(&fake)
            .create_iam_service_accounts(&[role_only], false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fake.counts().deploys, 1);
        assert_eq!(fake.counts().applies, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_are_reported_together(targets: Vec<ServiceAccountSpec>) {
        let fake = FakeCluster::builder().failing_deploy("default", "a").build();
        let err = irsa(&fake)
            .create_iam_service_accounts(&targets, false, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Provisioning { message } => {
                assert!(message.starts_with("1 of 2 iamserviceaccount(s) failed"), "{}", message);
                assert!(message.contains("\"default/a\""), "{}", message);
            }
            other => panic!("expected provisioning error, got {:?}", other),
        }
        // the other target is still carried out
        assert_eq!(fake.counts().applies, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn cancelled_batch_stops(targets: Vec<ServiceAccountSpec>) {
        let fake = FakeCluster::builder().build();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = irsa(&fake)
            .create_iam_service_accounts(&targets, false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
