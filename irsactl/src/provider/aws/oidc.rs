use async_trait::async_trait;
use aws_sdk_iam::error::DisplayErrorContext;
use tracing::{debug, warn};

use crate::provider::{OidcManager, OidcProvider};
use crate::{Error, Result};

/// Looks up the IAM OIDC identity provider that trusts the cluster's issuer.
pub struct IamOidcManager {
    iam: aws_sdk_iam::Client,
    issuer: String,
    thumbprint: Option<String>,
}

impl IamOidcManager {
    pub fn new(iam: aws_sdk_iam::Client, issuer_url: &str, thumbprint: Option<String>) -> Self {
        IamOidcManager {
            iam,
            issuer: strip_scheme(issuer_url).to_string(),
            thumbprint,
        }
    }

    async fn check_thumbprint(&self, arn: &str, expected: &str) -> Result<()> {
        let out = self
            .iam
            .get_open_id_connect_provider()
            .open_id_connect_provider_arn(arn)
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;
        let registered = out.thumbprint_list();
        if !registered.iter().any(|t| t.eq_ignore_ascii_case(expected)) {
            warn!(
                "IAM OIDC provider {} does not list thumbprint {}, registered thumbprints: {}",
                arn,
                expected,
                registered.join(", ")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl OidcManager for IamOidcManager {
    async fn provider(&self) -> Result<Option<OidcProvider>> {
        let out = self
            .iam
            .list_open_id_connect_providers()
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;

        let found = out
            .open_id_connect_provider_list()
            .iter()
            .filter_map(|entry| entry.arn())
            .find(|arn| provider_matches(arn, &self.issuer))
            .map(str::to_string);

        let Some(arn) = found else {
            debug!("no IAM OIDC provider for issuer {}", self.issuer);
            return Ok(None);
        };
        if let Some(thumbprint) = &self.thumbprint {
            self.check_thumbprint(&arn, thumbprint).await?;
        }
        Ok(Some(OidcProvider {
            arn,
            issuer: self.issuer.clone(),
        }))
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://").unwrap_or(url).trim_end_matches('/')
}

/// Provider ARNs look like `arn:aws:iam::<account>:oidc-provider/<issuer without scheme>`.
fn provider_matches(arn: &str, issuer: &str) -> bool {
    arn.split_once(":oidc-provider/")
        .is_some_and(|(_, provider_issuer)| provider_issuer == issuer)
}
