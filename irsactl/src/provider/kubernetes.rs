use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, field, info, instrument, Span};

use api::AccountKey;

use crate::provider::ServiceAccountClient;
use crate::{Error, Result};

pub const FIELD_MANAGER: &str = "irsactl";

fn post_params() -> PostParams {
    PostParams {
        dry_run: false,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

/// Service accounts read and written through the Kubernetes API.
#[derive(Clone)]
pub struct KubeServiceAccounts {
    client: Client,
}

impl KubeServiceAccounts {
    pub fn new(client: Client) -> Self {
        KubeServiceAccounts { client }
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(namespace).await?.is_some() {
            return Ok(());
        }
        debug!("namespace {} does not exist, creating it", namespace);
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&post_params(), &ns).await?;
        info!("created namespace {:?}", namespace);
        Ok(())
    }
}

#[async_trait]
impl ServiceAccountClient for KubeServiceAccounts {
    async fn exists(&self, key: &AccountKey) -> Result<bool> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?.is_some())
    }

    #[instrument(skip_all, fields(serviceaccount))]
    async fn apply(&self, sa: ServiceAccount) -> Result<()> {
        let ns = sa
            .namespace()
            .ok_or_else(|| Error::provisioning("serviceaccount without namespace"))?;
        let name = sa.name_any();
        Span::current().record("serviceaccount", field::display(format!("{}/{}", ns, name)));

        self.ensure_namespace(&ns).await?;
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &ns);
        match api.get_opt(&name).await? {
            Some(mut existing) => {
                debug!("serviceaccount already exists, merging metadata");
                existing.labels_mut().extend(sa.labels().clone());
                existing.annotations_mut().extend(sa.annotations().clone());
                api.replace(&name, &post_params(), &existing).await?;
                info!("updated serviceaccount \"{}/{}\"", ns, name);
            }
            None => {
                api.create(&post_params(), &sa).await?;
                info!("created serviceaccount \"{}/{}\"", ns, name);
            }
        }
        Ok(())
    }
}
