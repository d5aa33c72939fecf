//! Sequencing of one `create iamserviceaccount` run.
//!
//! A run moves through `Init → PreconditionChecked → StateLoaded → Filtered → Delegated` and ends
//! in `Done` or `Failed`. Any failing step ends the run, a failed run is never resumed.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use api::{AccountKey, ServiceAccountSpec};

use crate::filter;
use crate::gate;
use crate::irsa::Irsa;
use crate::models::{CreateRequest, ExistenceState, Mode, RunReport, RunState};
use crate::provider::{Bootstrap, Provisioner, ServiceAccountClient, StackManager};
use crate::{Error, Result};

pub struct Orchestrator<'a> {
    bootstrap: &'a dyn Bootstrap,
    cancel: CancellationToken,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(bootstrap: &'a dyn Bootstrap, cancel: CancellationToken) -> Self {
        Orchestrator {
            bootstrap,
            cancel,
            state: RunState::Init,
        }
    }

    #[instrument(skip_all, fields(cluster = %request.config.metadata.name))]
    pub async fn run(mut self, request: CreateRequest) -> Result<RunReport> {
        match self.reconcile(request).await {
            Ok(report) => {
                self.transition(RunState::Done);
                Ok(RunReport {
                    state: self.state,
                    ..report
                })
            }
            Err(e) => {
                debug!(state = ?self.state, "run failed");
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Races `fut` against cancellation, cancellation wins when both are ready.
    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    async fn reconcile(&mut self, request: CreateRequest) -> Result<RunReport> {
        let CreateRequest { config, flags } = request;

        let cluster = self.guard(self.bootstrap.connect(&config)).await?;
        self.guard(cluster.can_operate()).await?;
        let service_accounts = self.guard(cluster.service_accounts()).await?;
        let oidc = self.guard(cluster.oidc_manager()).await?;

        self.guard(gate::ensure_oidc_provider_present(oidc.as_ref(), &config.metadata))
            .await?;
        self.transition(RunState::PreconditionChecked);

        let stacks = cluster.stack_manager();
        let desired = &config.iam.service_accounts;
        let existing = self
            .guard(load_existence(desired, service_accounts.as_ref(), stacks.as_ref()))
            .await?;
        self.transition(RunState::StateLoaded);

        let filtered = filter::filter_existing(desired, &existing, flags.override_existing);
        filtered.log();
        self.transition(RunState::Filtered);

        let mode = Mode::select(flags.role_only, flags.override_existing);
        info!("using mode {}", mode);
        for warning in mode.warnings(flags.override_existing) {
            warn!("{}", warning);
        }
        debug!("cfg.json = \\\n{}", serde_json::to_string_pretty(&config)?);

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let provisioner: Arc<dyn Provisioner> = Arc::new(Irsa::new(
            config.metadata.name.clone(),
            stacks,
            oidc,
            service_accounts,
            flags.timeout,
        ));
        self.transition(RunState::Delegated);
        self.guard(provisioner.create_iam_service_accounts(&filtered.targets, flags.plan, &self.cancel))
            .await?;

        Ok(RunReport {
            state: self.state,
            mode,
            targets: filtered.targets.iter().map(|sa| sa.key()).collect(),
            skipped: filtered.skipped(),
        })
    }
}

/// Reads which desired accounts already exist, either in Kubernetes or as a role stack.
async fn load_existence(
    desired: &[ServiceAccountSpec],
    service_accounts: &dyn ServiceAccountClient,
    stacks: &dyn StackManager,
) -> Result<ExistenceState> {
    let keys: Vec<AccountKey> = desired.iter().map(|sa| sa.key()).collect();
    let mut existing = ExistenceState::default();
    for key in &keys {
        if service_accounts.exists(key).await.map_err(state_query)? {
            existing.service_accounts.insert(key.clone());
        }
    }
    existing.stacks = stacks.existing_stacks(&keys).await.map_err(state_query)?;
    debug!(
        "{} serviceaccount(s) and {} stack(s) already exist",
        existing.service_accounts.len(),
        existing.stacks.len()
    );
    Ok(existing)
}

fn state_query(e: Error) -> Error {
    match e {
        Error::Cancelled => e,
        e => Error::state_query(e),
    }
}
