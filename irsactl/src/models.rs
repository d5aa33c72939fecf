use std::collections::BTreeSet;
use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use api::{AccountKey, ClusterConfig};

/// Service accounts and role stacks already present in the cluster.
///
/// Read once at the start of a run and dropped with it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceState {
    #[serde(default)]
    pub service_accounts: BTreeSet<AccountKey>,
    #[serde(default)]
    pub stacks: BTreeSet<AccountKey>,
}

impl ExistenceState {
    pub fn contains(&self, key: &AccountKey) -> bool {
        self.service_accounts.contains(key) || self.stacks.contains(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Create,
    SkipExisting,
    OverrideExisting,
}

impl Decision {
    pub fn is_target(&self) -> bool {
        !matches!(self, Decision::SkipExisting)
    }
}

/// How pre-existing Kubernetes service accounts are treated during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    RoleOnly,
    OverrideExisting,
    ExcludeExisting,
}

impl Mode {
    /// Role-only wins over override, override wins over the default.
    pub fn select(role_only: bool, override_existing: bool) -> Mode {
        match (role_only, override_existing) {
            (true, _) => Mode::RoleOnly,
            (false, true) => Mode::OverrideExisting,
            (false, false) => Mode::ExcludeExisting,
        }
    }

    /// Operator warnings for this mode, in the order they should be emitted.
    pub fn warnings(&self, override_existing: bool) -> Vec<&'static str> {
        match self {
            Mode::RoleOnly if override_existing => vec![
                "serviceaccounts in Kubernetes will not be created or modified, since the option --role-only is used",
                "when option --role-only is used passing --override-existing-serviceaccounts has no effect",
            ],
            Mode::RoleOnly => vec![
                "serviceaccounts in Kubernetes will not be created or modified, since the option --role-only is used",
            ],
            Mode::OverrideExisting => vec![
                "metadata of serviceaccounts that exist in Kubernetes will be updated, as --override-existing-serviceaccounts was set",
            ],
            Mode::ExcludeExisting => vec![
                "serviceaccounts that exist in Kubernetes will be excluded, use --override-existing-serviceaccounts to override",
            ],
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::RoleOnly => "role-only",
            Mode::OverrideExisting => "override-existing",
            Mode::ExcludeExisting => "exclude-existing",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    PreconditionChecked,
    StateLoaded,
    Filtered,
    Delegated,
    Done,
    Failed,
}

/// Operator switches that steer a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFlags {
    pub override_existing: bool,
    pub role_only: bool,
    /// Only log what would be done.
    pub plan: bool,
    pub timeout: Duration,
}

impl Default for RunFlags {
    fn default() -> Self {
        RunFlags {
            override_existing: false,
            role_only: false,
            plan: true,
            timeout: Duration::from_secs(25 * 60),
        }
    }
}

/// A validated batch, ready to be reconciled against the cluster.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub config: ClusterConfig,
    pub flags: RunFlags,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: RunState,
    pub mode: Mode,
    pub targets: Vec<AccountKey>,
    pub skipped: Vec<AccountKey>,
}
