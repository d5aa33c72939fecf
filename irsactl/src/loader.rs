//! Turns command line flags and an optional config file into a validated batch.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, instrument};

use api::{ClusterConfig, ServiceAccountSpec, DEFAULT_NAMESPACE, KIND};

use crate::commands::create::IamServiceAccountArgs;
use crate::filter::RuleFilter;
use crate::models::{CreateRequest, RunFlags};
use crate::{Error, Result};

#[instrument(skip_all)]
pub fn load(args: &IamServiceAccountArgs) -> Result<CreateRequest> {
    let flags = RunFlags {
        override_existing: args.override_existing,
        role_only: args.role_only,
        plan: !args.approve,
        timeout: args.timeout,
    };

    let mut config = match &args.config_file {
        Some(path) => from_file(path, args)?,
        None => from_flags(args)?,
    };

    if let (Some(file_region), Some(flag_region)) = (&config.metadata.region, &args.region) {
        if file_region != flag_region {
            return Err(Error::load(format!(
                "--region={} conflicts with metadata.region={} in the config file",
                flag_region, file_region
            )));
        }
    }
    if config.metadata.region.is_none() {
        config.metadata.region = args.region.clone().or_else(|| args.env_region.clone());
    }
    if config.metadata.region.is_none() {
        return Err(Error::load("--region must be set"));
    }
    if let Some(thumbprint) = &args.oidc_thumbprint {
        config.iam.oidc_thumbprint = Some(thumbprint.clone());
    }

    let rules = RuleFilter::new(&args.include, &args.exclude)?;
    let (kept, _) = rules.apply(std::mem::take(&mut config.iam.service_accounts));
    config.iam.service_accounts = kept;
    if flags.role_only {
        for sa in config.iam.service_accounts.iter_mut() {
            sa.role_only = true;
        }
    }

    validate(&config)?;
    debug!(
        "loaded {} iamserviceaccount(s) for cluster {:?}",
        config.iam.service_accounts.len(),
        config.metadata.name
    );

    Ok(CreateRequest { config, flags })
}

fn from_flags(args: &IamServiceAccountArgs) -> Result<ClusterConfig> {
    if !args.include.is_empty() || !args.exclude.is_empty() {
        return Err(Error::load("--include and --exclude can only be used with --config-file"));
    }
    let cluster = args
        .cluster
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::load("--cluster must be set"))?;
    let name = match (&args.name, &args.name_arg) {
        (Some(flag), Some(arg)) if flag != arg => {
            return Err(Error::load(format!(
                "--name={} and argument {} cannot be used at the same time",
                flag, arg
            )))
        }
        (Some(name), _) | (None, Some(name)) => name.clone(),
        (None, None) => return Err(Error::load("--name must be set")),
    };

    let mut sa = ServiceAccountSpec::new(
        args.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
        name,
    );
    sa.attach_policy_arns = args.attach_policy_arns.clone();
    sa.attach_role_arn = args.attach_role_arn.clone();
    sa.role_name = args.role_name.clone();
    sa.role_only = args.role_only;
    sa.tags = args.tags.iter().cloned().collect();

    let mut config = ClusterConfig::new(cluster, args.region.clone());
    config.iam.service_accounts.push(sa);
    Ok(config)
}

fn from_file(path: &Path, args: &IamServiceAccountArgs) -> Result<ClusterConfig> {
    let incompatible = [
        ("--cluster", args.cluster.is_some()),
        ("--name", args.name.is_some() || args.name_arg.is_some()),
        ("--namespace", args.namespace.is_some()),
        ("--attach-policy-arn", !args.attach_policy_arns.is_empty()),
        ("--attach-role-arn", args.attach_role_arn.is_some()),
        ("--role-name", args.role_name.is_some()),
        ("--tags", !args.tags.is_empty()),
    ];
    if let Some((flag, _)) = incompatible.iter().find(|(_, set)| *set) {
        return Err(Error::load(format!(
            "cannot use {} when --config-file/-f is set",
            flag
        )));
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::load(format!("reading {}: {}", path.display(), e)))?;
    parse(&contents).map_err(|e| match e {
        Error::Load { message } => Error::load(format!("{}: {}", path.display(), message)),
        e => e,
    })
}

/// Parses a `ClusterConfig` document.
pub fn parse(contents: &str) -> Result<ClusterConfig> {
    let config: ClusterConfig =
        serde_yaml::from_str(contents).map_err(|e| Error::load(e.to_string()))?;
    if config.kind != KIND {
        return Err(Error::load(format!(
            "unexpected kind {:?}, expected {:?}",
            config.kind, KIND
        )));
    }
    if config.metadata.name.is_empty() {
        return Err(Error::load("metadata.name must be set"));
    }
    if config.iam.service_accounts.is_empty() {
        return Err(Error::load("no iam.serviceAccounts specified"));
    }
    Ok(config)
}

/// Rejects accounts that can not be provisioned as declared.
pub fn validate(config: &ClusterConfig) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (i, sa) in config.iam.service_accounts.iter().enumerate() {
        let invalid = |message: String| Error::load(format!("iam.serviceAccounts[{}]: {}", i, message));

        if sa.metadata.name.trim().is_empty() {
            return Err(invalid("metadata.name must be set".to_string()));
        }
        if sa.metadata.namespace.trim().is_empty() {
            return Err(invalid("metadata.namespace must not be empty".to_string()));
        }
        let key = sa.key();
        if !seen.insert(key.clone()) {
            return Err(invalid(format!("\"{}\" is defined more than once", key)));
        }
        if sa.attach_policy_arns.iter().any(|arn| arn.trim().is_empty()) {
            return Err(invalid("attachPolicyARNs must not contain empty values".to_string()));
        }

        let has_policies = !sa.attach_policy_arns.is_empty() || sa.attach_policy.is_some();
        match &sa.attach_role_arn {
            Some(_) if has_policies => {
                return Err(invalid(
                    "attachRoleARN cannot be combined with attachPolicyARNs or attachPolicy".to_string(),
                ))
            }
            Some(_) if sa.role_only => {
                return Err(invalid(
                    "attachRoleARN cannot be combined with roleOnly, there would be nothing to create"
                        .to_string(),
                ))
            }
            Some(_) if sa.role_name.is_some() => {
                return Err(invalid("roleName cannot be combined with attachRoleARN".to_string()))
            }
            Some(arn) if arn.trim().is_empty() => {
                return Err(invalid("attachRoleARN must not be empty".to_string()))
            }
            None if !has_policies => {
                return Err(invalid(
                    "at least one of attachPolicyARNs, attachPolicy or attachRoleARN must be set"
                        .to_string(),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}
