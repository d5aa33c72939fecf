use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, Output, Stack, StackStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use api::AccountKey;

use crate::irsa::template::ROLE_OUTPUT;
use crate::provider::{StackManager, StackRequest};
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn stack_name(cluster: &str, key: &AccountKey) -> String {
    format!(
        "irsactl-{}-addon-iamserviceaccount-{}-{}",
        cluster, key.namespace, key.name
    )
}

pub struct CloudFormationStackManager {
    cloudformation: aws_sdk_cloudformation::Client,
    cluster: String,
}

impl CloudFormationStackManager {
    pub fn new(cloudformation: aws_sdk_cloudformation::Client, cluster: &str) -> Self {
        CloudFormationStackManager {
            cloudformation,
            cluster: cluster.to_string(),
        }
    }

    async fn live_stack_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut next_token = None;
        loop {
            let out = self
                .cloudformation
                .describe_stacks()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;
            names.extend(
                out.stacks()
                    .iter()
                    .filter(|stack| stack.stack_status() != Some(&StackStatus::DeleteComplete))
                    .filter_map(|stack| stack.stack_name())
                    .map(str::to_string),
            );
            match out.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    async fn describe(&self, name: &str) -> Result<Option<Stack>> {
        match self
            .cloudformation
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
        {
            Ok(out) => Ok(out.stacks().first().cloned()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if message.contains("does not exist") {
                    Ok(None)
                } else {
                    Err(Error::aws(message))
                }
            }
        }
    }

    async fn create(&self, stack: &StackRequest) -> Result<()> {
        self.cloudformation
            .create_stack()
            .stack_name(&stack.name)
            .template_body(&stack.template_body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;
        info!("creating stack {:?}", stack.name);
        Ok(())
    }

    /// Returns false when the stack already matches the template.
    async fn update(&self, stack: &StackRequest) -> Result<bool> {
        let result = self
            .cloudformation
            .update_stack()
            .stack_name(&stack.name)
            .template_body(&stack.template_body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;
        match result {
            Ok(_) => {
                info!("updating stack {:?}", stack.name);
                Ok(true)
            }
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if message.contains("No updates are to be performed") {
                    info!("stack {:?} is already up to date", stack.name);
                    Ok(false)
                } else {
                    Err(Error::aws(message))
                }
            }
        }
    }

    async fn wait(&self, name: &str, cancel: &CancellationToken) -> Result<Stack> {
        loop {
            let stack = self
                .describe(name)
                .await?
                .ok_or_else(|| Error::aws(format!("stack {:?} disappeared", name)))?;
            let status = stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            match settled(&status) {
                Some(true) => return Ok(stack),
                Some(false) => {
                    return Err(Error::aws(format!(
                        "stack {:?} ended in status {}: {}",
                        name,
                        status,
                        stack.stack_status_reason().unwrap_or("no reason given")
                    )))
                }
                None => debug!("waiting for stack {:?}, status {}", name, status),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

/// `Some(true)` on success, `Some(false)` on failure, `None` while still in progress.
fn settled(status: &str) -> Option<bool> {
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" => Some(true),
        s if s.ends_with("_IN_PROGRESS") => None,
        _ => Some(false),
    }
}

fn role_arn(name: &str, outputs: &[Output]) -> Result<String> {
    outputs
        .iter()
        .find(|output| output.output_key() == Some(ROLE_OUTPUT))
        .and_then(|output| output.output_value())
        .map(str::to_string)
        .ok_or_else(|| Error::aws(format!("stack {:?} has no {} output", name, ROLE_OUTPUT)))
}

/// Role of a stack the update left untouched. Its status is not waited on, it may be a
/// completed rollback from an earlier update.
fn unchanged_role_arn(name: &str, changed: bool, outputs: &[Output]) -> Result<Option<String>> {
    if changed {
        return Ok(None);
    }
    role_arn(name, outputs).map(Some)
}

#[async_trait]
impl StackManager for CloudFormationStackManager {
    fn stack_name(&self, key: &AccountKey) -> String {
        stack_name(&self.cluster, key)
    }

    async fn existing_stacks(&self, keys: &[AccountKey]) -> Result<BTreeSet<AccountKey>> {
        let live = self.live_stack_names().await?;
        Ok(keys
            .iter()
            .filter(|key| live.contains(&stack_name(&self.cluster, key)))
            .cloned()
            .collect())
    }

    #[instrument(skip_all, fields(stack = %stack.name))]
    async fn deploy(&self, stack: &StackRequest, cancel: &CancellationToken) -> Result<String> {
        match self.describe(&stack.name).await? {
            None => self.create(stack).await?,
            Some(current) => {
                let changed = self.update(stack).await?;
                if let Some(arn) = unchanged_role_arn(&stack.name, changed, current.outputs())? {
                    return Ok(arn);
                }
            }
        }
        let settled = self.wait(&stack.name, cancel).await?;
        role_arn(&stack.name, settled.outputs())
    }
}
