//! Collaborators backed by EKS, IAM and CloudFormation.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_eks::config::Region;
use aws_sdk_eks::error::DisplayErrorContext;
use aws_sdk_eks::types::{Cluster, ClusterStatus};
use tracing::{debug, instrument};

use api::{ClusterConfig, ClusterMeta};

use crate::provider::kubernetes::KubeServiceAccounts;
use crate::provider::{
    Bootstrap, ClusterProvider, OidcManager, ServiceAccountClient, StackManager,
};
use crate::{Error, Result};

mod oidc;
mod stacks;

pub use oidc::IamOidcManager;
pub use stacks::{stack_name, CloudFormationStackManager};

/// Connects to an existing EKS cluster using the default credential chain.
#[derive(Debug, Default)]
pub struct AwsBootstrap;

#[async_trait]
impl Bootstrap for AwsBootstrap {
    #[instrument(skip_all, fields(cluster = %cfg.metadata.name))]
    async fn connect(&self, cfg: &ClusterConfig) -> Result<Arc<dyn ClusterProvider>> {
        let region = cfg
            .metadata
            .region
            .clone()
            .ok_or_else(|| Error::cluster(&cfg.metadata.name, "no region configured"))?;
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        debug!("using region {}", region);

        Ok(Arc::new(EksCluster {
            meta: cfg.metadata.clone(),
            oidc_thumbprint: cfg.iam.oidc_thumbprint.clone(),
            eks: aws_sdk_eks::Client::new(&sdk_config),
            iam: aws_sdk_iam::Client::new(&sdk_config),
            cloudformation: aws_sdk_cloudformation::Client::new(&sdk_config),
        }))
    }
}

pub struct EksCluster {
    meta: ClusterMeta,
    oidc_thumbprint: Option<String>,
    eks: aws_sdk_eks::Client,
    iam: aws_sdk_iam::Client,
    cloudformation: aws_sdk_cloudformation::Client,
}

impl EksCluster {
    async fn describe(&self) -> Result<Cluster> {
        let out = self
            .eks
            .describe_cluster()
            .name(&self.meta.name)
            .send()
            .await
            .map_err(|e| Error::cluster(&self.meta.name, DisplayErrorContext(&e)))?;
        out.cluster()
            .cloned()
            .ok_or_else(|| Error::cluster(&self.meta.name, "DescribeCluster returned no cluster"))
    }

    async fn kube_config(&self) -> Result<kube::Config> {
        kube::Config::infer()
            .await
            .map_err(|e| Error::cluster(&self.meta.name, format!("loading kubeconfig: {}", e)))
    }
}

#[async_trait]
impl ClusterProvider for EksCluster {
    async fn can_operate(&self) -> Result<()> {
        let cluster = self.describe().await?;
        match cluster.status() {
            Some(ClusterStatus::Active) => {}
            status => {
                return Err(Error::cluster(
                    &self.meta.name,
                    format!("cluster status is {:?}, expected ACTIVE", status),
                ))
            }
        }

        let endpoint = cluster
            .endpoint()
            .ok_or_else(|| Error::cluster(&self.meta.name, "cluster has no API endpoint"))?;
        let config = self.kube_config().await?;
        let kube_host = config.cluster_url.host().unwrap_or_default();
        if !endpoint_host(endpoint).eq_ignore_ascii_case(kube_host) {
            return Err(Error::cluster(
                &self.meta.name,
                format!(
                    "current kubeconfig points at {:?}, not at the cluster endpoint {:?}",
                    kube_host, endpoint
                ),
            ));
        }
        debug!("cluster is active and reachable at {}", endpoint);
        Ok(())
    }

    async fn service_accounts(&self) -> Result<Arc<dyn ServiceAccountClient>> {
        let config = self.kube_config().await?;
        let client = kube::Client::try_from(config)
            .map_err(|e| Error::cluster(&self.meta.name, format!("creating Kubernetes client: {}", e)))?;
        Ok(Arc::new(KubeServiceAccounts::new(client)))
    }

    async fn oidc_manager(&self) -> Result<Arc<dyn OidcManager>> {
        let cluster = self.describe().await?;
        let issuer = cluster
            .identity()
            .and_then(|identity| identity.oidc())
            .and_then(|oidc| oidc.issuer())
            .ok_or_else(|| Error::cluster(&self.meta.name, "cluster has no OIDC issuer"))?;
        Ok(Arc::new(IamOidcManager::new(
            self.iam.clone(),
            issuer,
            self.oidc_thumbprint.clone(),
        )))
    }

    fn stack_manager(&self) -> Arc<dyn StackManager> {
        Arc::new(CloudFormationStackManager::new(
            self.cloudformation.clone(),
            &self.meta.name,
        ))
    }
}

/// Host part of an endpoint URL such as `https://ABC.gr7.eu-north-1.eks.amazonaws.com`.
fn endpoint_host(endpoint: &str) -> &str {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://ABC.gr7.eu-north-1.eks.amazonaws.com", "ABC.gr7.eu-north-1.eks.amazonaws.com")]
    #[case("https://10.0.0.1:6443/", "10.0.0.1")]
    #[case("kubernetes.local", "kubernetes.local")]
    fn endpoint_hosts(#[case] endpoint: &str, #[case] expected: &str) {
        assert_eq!(endpoint_host(endpoint), expected);
    }
}
