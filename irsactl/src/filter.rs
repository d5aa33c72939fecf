//! Narrowing of the desired service accounts.
//!
//! Two filters run in sequence: the include/exclude rules given by the operator are applied
//! when the batch is loaded, the existence filter runs once the live cluster state is known.
//! Both keep the relative order of their input.

use regex::Regex;
use tracing::info;

use api::{AccountKey, ServiceAccountSpec};

use crate::models::{Decision, ExistenceState};
use crate::{Error, Result};

/// Operator supplied glob rules over `namespace/name`.
#[derive(Debug, Default)]
pub struct RuleFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RuleFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(RuleFilter {
            include: include.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, key: &AccountKey) -> bool {
        let subject = key.to_string();
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(&subject));
        included && !self.exclude.iter().any(|r| r.is_match(&subject))
    }

    /// Splits the batch into accounts passing the rules and the keys of those that did not.
    pub fn apply(&self, specs: Vec<ServiceAccountSpec>) -> (Vec<ServiceAccountSpec>, Vec<AccountKey>) {
        let (kept, dropped): (Vec<_>, Vec<_>) = specs.into_iter().partition(|sa| self.matches(&sa.key()));
        if !self.is_empty() {
            log_keys(&keys(&kept), "included (based on the include/exclude rules)");
            log_keys(&keys(&dropped), "excluded (based on the include/exclude rules)");
        }
        (kept, keys(&dropped))
    }
}

/// `*` matches any run of characters, `?` a single one.
/// A pattern without a namespace part matches the name in every namespace.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(Error::load("empty include/exclude pattern"));
    }
    let qualified = if pattern.contains('/') {
        pattern.to_string()
    } else {
        format!("*/{}", pattern)
    };
    let mut expr = String::from("^");
    for c in qualified.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::load(format!("invalid pattern {:?}: {}", pattern, e)))
}

/// Result of matching the desired batch against the live cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub targets: Vec<ServiceAccountSpec>,
    pub decisions: Vec<(AccountKey, Decision)>,
}

impl Filtered {
    pub fn skipped(&self) -> Vec<AccountKey> {
        self.decisions
            .iter()
            .filter(|(_, decision)| !decision.is_target())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn log(&self) {
        let with = |wanted: Decision| -> Vec<AccountKey> {
            self.decisions
                .iter()
                .filter(|(_, d)| *d == wanted)
                .map(|(key, _)| key.clone())
                .collect()
        };
        log_keys(&with(Decision::SkipExisting), "excluded (already exist)");
        log_keys(&with(Decision::OverrideExisting), "included (already exist, will be updated)");
        log_keys(&with(Decision::Create), "included");
    }
}

pub fn decide(key: &AccountKey, existing: &ExistenceState, override_existing: bool) -> Decision {
    match (existing.contains(key), override_existing) {
        (false, _) => Decision::Create,
        (true, false) => Decision::SkipExisting,
        (true, true) => Decision::OverrideExisting,
    }
}

/// Decides for every desired account whether it is acted upon. Pure, logging is left to
/// [`Filtered::log`].
pub fn filter_existing(
    desired: &[ServiceAccountSpec],
    existing: &ExistenceState,
    override_existing: bool,
) -> Filtered {
    let mut targets = Vec::with_capacity(desired.len());
    let mut decisions = Vec::with_capacity(desired.len());
    for sa in desired {
        let key = sa.key();
        let decision = decide(&key, existing, override_existing);
        if decision.is_target() {
            targets.push(sa.clone());
        }
        decisions.push((key, decision));
    }
    Filtered { targets, decisions }
}

pub fn compute_targets(
    desired: &[ServiceAccountSpec],
    existing: &ExistenceState,
    override_existing: bool,
) -> Vec<ServiceAccountSpec> {
    filter_existing(desired, existing, override_existing).targets
}

fn keys(specs: &[ServiceAccountSpec]) -> Vec<AccountKey> {
    specs.iter().map(|sa| sa.key()).collect()
}

fn log_keys(keys: &[AccountKey], what: &str) {
    if keys.is_empty() {
        return;
    }
    let listed = keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ");
    info!("{} iamserviceaccount(s) ({}) were {}", keys.len(), listed, what);
}
