use tracing::{debug, instrument, warn};

use api::ClusterMeta;

use crate::provider::OidcManager;
use crate::{Error, Result};

/// Roles for service accounts can only be assumed through the cluster's OIDC identity provider,
/// so nothing is created without one.
#[instrument(skip_all, fields(cluster = %cluster.name))]
pub async fn ensure_oidc_provider_present(oidc: &dyn OidcManager, cluster: &ClusterMeta) -> Result<()> {
    let exists = oidc.provider_exists().await.map_err(|e| match e {
        Error::Cancelled => e,
        e => Error::state_query(format!("checking for IAM OIDC provider: {}", e)),
    })?;
    if exists {
        debug!("IAM OIDC provider is associated with the cluster");
        return Ok(());
    }

    let region = cluster.region.as_deref().unwrap_or_default();
    let hint = format!(
        "associate an IAM OIDC provider with cluster {} in {} first, irsactl does not create one. \
         With eksctl installed: 'eksctl utils associate-iam-oidc-provider --region={} --cluster={} --approve'",
        cluster.name, region, region, cluster.name
    );
    warn!("no IAM OIDC provider associated with the cluster, {}", hint);
    Err(Error::Precondition {
        message: "unable to create iamserviceaccount(s) without IAM OIDC provider enabled".to_string(),
        hint,
    })
}
