//! In-memory cluster used by unit tests, counting every call made against it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use tokio_util::sync::CancellationToken;

use api::{AccountKey, ClusterConfig};

use crate::provider::{
    Bootstrap, ClusterProvider, OidcManager, OidcProvider, ServiceAccountClient, StackManager,
    StackRequest,
};
use crate::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub connects: usize,
    pub operability_checks: usize,
    pub oidc_checks: usize,
    pub sa_lookups: usize,
    pub stack_lookups: usize,
    pub deploys: usize,
    pub applies: usize,
}

#[derive(Default)]
struct State {
    inoperable: bool,
    no_oidc_provider: bool,
    failing_state_query: bool,
    failing_deploys: BTreeSet<AccountKey>,
    service_accounts: BTreeSet<AccountKey>,
    stacks: BTreeSet<AccountKey>,
    counts: Mutex<Counts>,
    applied: Mutex<Vec<ServiceAccount>>,
    deployed: Mutex<Vec<StackRequest>>,
}

#[derive(Clone)]
pub struct FakeCluster(Arc<State>);

#[derive(Default)]
pub struct FakeClusterBuilder(State);

impl FakeClusterBuilder {
    pub fn inoperable(mut self) -> Self {
        self.0.inoperable = true;
        self
    }

    pub fn without_oidc_provider(mut self) -> Self {
        self.0.no_oidc_provider = true;
        self
    }

    pub fn failing_state_query(mut self) -> Self {
        self.0.failing_state_query = true;
        self
    }

    pub fn failing_deploy(mut self, namespace: &str, name: &str) -> Self {
        self.0.failing_deploys.insert(AccountKey::new(namespace, name));
        self
    }

    pub fn with_service_account(mut self, namespace: &str, name: &str) -> Self {
        self.0.service_accounts.insert(AccountKey::new(namespace, name));
        self
    }

    pub fn with_stack(mut self, namespace: &str, name: &str) -> Self {
        self.0.stacks.insert(AccountKey::new(namespace, name));
        self
    }

    pub fn build(self) -> FakeCluster {
        FakeCluster(Arc::new(self.0))
    }
}

impl FakeCluster {
    pub fn builder() -> FakeClusterBuilder {
        FakeClusterBuilder::default()
    }

    pub fn counts(&self) -> Counts {
        *self.0.counts.lock().unwrap()
    }

    pub fn applied(&self) -> Vec<ServiceAccount> {
        self.0.applied.lock().unwrap().clone()
    }

    pub fn deployed(&self) -> Vec<StackRequest> {
        self.0.deployed.lock().unwrap().clone()
    }

    fn count(&self, f: impl FnOnce(&mut Counts)) {
        f(&mut self.0.counts.lock().unwrap());
    }
}

#[async_trait]
impl Bootstrap for FakeCluster {
    async fn connect(&self, _cfg: &ClusterConfig) -> Result<Arc<dyn ClusterProvider>> {
        self.count(|c| c.connects += 1);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ClusterProvider for FakeCluster {
    async fn can_operate(&self) -> Result<()> {
        self.count(|c| c.operability_checks += 1);
        if self.0.inoperable {
            return Err(Error::cluster("prod", "cluster status is CREATING, expected ACTIVE"));
        }
        Ok(())
    }

    async fn service_accounts(&self) -> Result<Arc<dyn ServiceAccountClient>> {
        Ok(Arc::new(self.clone()))
    }

    async fn oidc_manager(&self) -> Result<Arc<dyn OidcManager>> {
        Ok(Arc::new(self.clone()))
    }

    fn stack_manager(&self) -> Arc<dyn StackManager> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl OidcManager for FakeCluster {
    async fn provider(&self) -> Result<Option<OidcProvider>> {
        self.count(|c| c.oidc_checks += 1);
        if self.0.no_oidc_provider {
            return Ok(None);
        }
        Ok(Some(OidcProvider {
            arn: "arn:aws:iam::123456789012:oidc-provider/oidc.eks.eu-north-1.amazonaws.com/id/ABC"
                .to_string(),
            issuer: "oidc.eks.eu-north-1.amazonaws.com/id/ABC".to_string(),
        }))
    }
}

#[async_trait]
impl StackManager for FakeCluster {
    fn stack_name(&self, key: &AccountKey) -> String {
        format!("test-{}-{}", key.namespace, key.name)
    }

    async fn existing_stacks(&self, keys: &[AccountKey]) -> Result<BTreeSet<AccountKey>> {
        self.count(|c| c.stack_lookups += 1);
        if self.0.failing_state_query {
            return Err(Error::aws("Throttling: Rate exceeded"));
        }
        Ok(keys.iter().filter(|k| self.0.stacks.contains(*k)).cloned().collect())
    }

    async fn deploy(&self, stack: &StackRequest, _cancel: &CancellationToken) -> Result<String> {
        self.count(|c| c.deploys += 1);
        self.0.deployed.lock().unwrap().push(stack.clone());
        if self.0.failing_deploys.contains(&stack.key) {
            return Err(Error::aws(format!("stack {:?} ended in status ROLLBACK_COMPLETE", stack.name)));
        }
        Ok(format!("arn:aws:iam::123456789012:role/{}", stack.name))
    }
}

#[async_trait]
impl ServiceAccountClient for FakeCluster {
    async fn exists(&self, key: &AccountKey) -> Result<bool> {
        self.count(|c| c.sa_lookups += 1);
        if self.0.failing_state_query {
            return Err(Error::aws("connection refused"));
        }
        Ok(self.0.service_accounts.contains(key))
    }

    async fn apply(&self, sa: ServiceAccount) -> Result<()> {
        self.count(|c| c.applies += 1);
        self.0.applied.lock().unwrap().push(sa);
        Ok(())
    }
}
