//! Boundaries to the cluster and the cloud account.
//!
//! The orchestrator only talks to these traits. [`aws`] and [`kubernetes`] hold the
//! implementations used by the binary, tests substitute their own.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use tokio_util::sync::CancellationToken;

use api::{AccountKey, ClusterConfig};

use crate::Result;

pub mod aws;
pub mod kubernetes;

/// OIDC identity provider registered for a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct OidcProvider {
    pub arn: String,
    /// Issuer URL without the scheme, as used in trust policy condition keys.
    pub issuer: String,
}

/// Creates a handle to an existing cluster.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn connect(&self, cfg: &ClusterConfig) -> Result<Arc<dyn ClusterProvider>>;
}

#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Fails with [`crate::Error::Cluster`] unless the cluster is ready to be worked on.
    async fn can_operate(&self) -> Result<()>;

    async fn service_accounts(&self) -> Result<Arc<dyn ServiceAccountClient>>;

    async fn oidc_manager(&self) -> Result<Arc<dyn OidcManager>>;

    fn stack_manager(&self) -> Arc<dyn StackManager>;
}

#[async_trait]
pub trait OidcManager: Send + Sync {
    async fn provider(&self) -> Result<Option<OidcProvider>>;

    async fn provider_exists(&self) -> Result<bool> {
        Ok(self.provider().await?.is_some())
    }
}

/// A role stack to create, or update when it already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    pub key: AccountKey,
    pub name: String,
    pub template_body: String,
}

#[async_trait]
pub trait StackManager: Send + Sync {
    /// Name of the role stack backing the given service account.
    fn stack_name(&self, key: &AccountKey) -> String;

    /// The subset of `keys` already backed by a role stack.
    async fn existing_stacks(&self, keys: &[AccountKey]) -> Result<BTreeSet<AccountKey>>;

    /// Creates or updates the stack and waits for it to settle, returning the role ARN.
    async fn deploy(&self, stack: &StackRequest, cancel: &CancellationToken) -> Result<String>;
}

#[async_trait]
pub trait ServiceAccountClient: Send + Sync {
    async fn exists(&self, key: &AccountKey) -> Result<bool>;

    /// Creates the service account, or merges it into the existing one.
    async fn apply(&self, sa: ServiceAccount) -> Result<()>;
}

/// Carries out the filtered batch. Implemented by [`crate::irsa::Irsa`].
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_iam_service_accounts(
        &self,
        targets: &[api::ServiceAccountSpec],
        plan: bool,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
