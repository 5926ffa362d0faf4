//! Shared run entrypoint used by the CLI: enumerate, converge, promote,
//! record.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use agentsync_core::{
    ArtifactId, ArtifactKind, ArtifactName, ArtifactStore, DeploymentState, InvalidArtifact,
};
use agentsync_remote::RegistryClient;

use crate::diff::{compute_diff, preview, ArtifactPreview, Diff};
use crate::direction::Direction;
use crate::error::SyncError;
use crate::ledger;
use crate::promote::promote;
use crate::reconcile::{DependencyContext, Reconciler};
use crate::report::{ArtifactOutcome, Outcome, Report};
use crate::side::{ArtifactSide, LocalSide, RemoteSide};

/// Which artifact kinds a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindScope {
    Agents,
    Tools,
    #[default]
    All,
}

impl KindScope {
    /// Kinds in processing order: tools before agents.
    pub fn kinds(self) -> &'static [ArtifactKind] {
        match self {
            KindScope::Agents => &[ArtifactKind::Agent],
            KindScope::Tools => &[ArtifactKind::Tool],
            KindScope::All => ArtifactKind::all(),
        }
    }

    pub fn includes(self, kind: ArtifactKind) -> bool {
        self.kinds().contains(&kind)
    }
}

impl fmt::Display for KindScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindScope::Agents => write!(f, "agents"),
            KindScope::Tools => write!(f, "tools"),
            KindScope::All => write!(f, "all"),
        }
    }
}

impl FromStr for KindScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agents" | "agent" => Ok(KindScope::Agents),
            "tools" | "tool" => Ok(KindScope::Tools),
            "all" => Ok(KindScope::All),
            other => Err(format!("unknown kind '{other}'; expected: agents, tools, all")),
        }
    }
}

/// Parameters of one import or export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub direction: Direction,
    pub scope: KindScope,
    /// Environment the ledger is recorded under.
    pub env: Option<String>,
    /// Promote applied artifacts to live. Export only.
    pub deploy: bool,
    pub concurrency: usize,
}

impl SyncRequest {
    pub fn new(direction: Direction, scope: KindScope) -> Self {
        Self {
            direction,
            scope,
            env: None,
            deploy: false,
            concurrency: agentsync_core::config::DEFAULT_CONCURRENCY,
        }
    }
}

/// The diff for one kind, plus the source artifacts that could not be loaded.
#[derive(Debug, Clone)]
pub struct Phase {
    pub diff: Diff,
    pub invalid: Vec<InvalidArtifact>,
}

impl Phase {
    pub fn kind(&self) -> ArtifactKind {
        self.diff.kind()
    }
}

/// Everything a run would do, computed before anything is written.
#[derive(Debug, Clone)]
pub struct Plan {
    pub direction: Direction,
    pub phases: Vec<Phase>,
    /// Tools an agent may reference without them being in the source: the
    /// destination's tools and the platform-managed ones.
    pub available_tools: BTreeSet<ArtifactName>,
}

impl Plan {
    /// Unified diffs of every artifact the run would write.
    pub fn previews(&self) -> Vec<ArtifactPreview> {
        self.phases
            .iter()
            .flat_map(|phase| preview(&phase.diff, self.direction))
            .collect()
    }
}

fn sides(
    store: &ArtifactStore,
    client: &Arc<dyn RegistryClient>,
    direction: Direction,
) -> (Box<dyn ArtifactSide>, Box<dyn ArtifactSide>) {
    let local: Box<dyn ArtifactSide> = Box::new(LocalSide::new(store.clone()));
    let remote: Box<dyn ArtifactSide> = Box::new(RemoteSide::new(Arc::clone(client)));
    match direction {
        Direction::Import => (remote, local),
        Direction::Export => (local, remote),
    }
}

/// Enumerate both sides for every kind in `scope` and diff them.
///
/// Any enumeration failure is fatal; nothing has been written at that point.
pub async fn plan(
    store: &ArtifactStore,
    client: &Arc<dyn RegistryClient>,
    direction: Direction,
    scope: KindScope,
) -> Result<Plan, SyncError> {
    if direction == Direction::Export {
        for kind in scope.kinds() {
            store
                .require_layout(*kind)
                .map_err(|source| SyncError::LocalEnumerate { kind: *kind, source })?;
        }
    }

    let (source, destination) = sides(store, client, direction);
    let mut phases = Vec::new();
    for kind in scope.kinds() {
        let from = source.list(*kind).await?;
        let to = destination.list(*kind).await?;
        tracing::info!(
            kind = %kind,
            source = source.label(),
            found = from.artifacts.len(),
            invalid = from.invalid.len(),
            "enumerated"
        );
        for invalid in &to.invalid {
            tracing::warn!(
                artifact = %invalid.id,
                side = destination.label(),
                error = %invalid.error,
                "destination artifact unreadable; treating as absent"
            );
        }
        let invalid_ids: Vec<ArtifactId> = from.invalid.iter().map(|i| i.id.clone()).collect();
        let diff = compute_diff(&from.artifacts, &to.artifacts)?.without(&invalid_ids);
        phases.push(Phase {
            diff,
            invalid: from.invalid,
        });
    }

    let mut available_tools = BTreeSet::new();
    if scope.includes(ArtifactKind::Agent) {
        available_tools.extend(destination.names(ArtifactKind::Tool).await?);
        let managed = client
            .catalog(ArtifactKind::Tool)
            .await
            .map_err(|source| SyncError::RemoteEnumerate {
                kind: ArtifactKind::Tool,
                source,
            })?;
        available_tools.extend(
            managed
                .into_iter()
                .filter(|entry| !entry.exportable)
                .map(|entry| entry.name),
        );
    }

    Ok(Plan {
        direction,
        phases,
        available_tools,
    })
}

/// Run one import or export: plan, converge tools then agents, optionally
/// promote, then record the ledger.
///
/// Per-artifact failures end up in the returned [`Report`]; only enumeration
/// and ledger errors are returned as `Err`. The ledger is left untouched when
/// the run was cancelled.
pub async fn run(
    store: &ArtifactStore,
    client: Arc<dyn RegistryClient>,
    request: &SyncRequest,
    cancel: CancellationToken,
) -> Result<Report, SyncError> {
    let plan = plan(store, &client, request.direction, request.scope).await?;
    let (_, destination) = sides(store, &client, request.direction);
    let reconciler = Reconciler::new(request.direction, request.concurrency, cancel.clone());

    let mut deps = DependencyContext::new().with_available(plan.available_tools);
    let mut report = Report::new(request.direction);

    for phase in plan.phases {
        let kind = phase.kind();
        let mut phase_report = Report::new(request.direction);
        for invalid in phase.invalid {
            tracing::error!(artifact = %invalid.id, error = %invalid.error, "not applied");
            if kind == ArtifactKind::Tool {
                deps.mark_failed(invalid.id.name.clone());
            }
            phase_report.push(ArtifactOutcome::new(
                invalid.id,
                Outcome::Failed {
                    error: invalid.error,
                },
            ));
        }
        phase_report.merge(reconciler.apply(phase.diff, destination.as_ref(), &deps).await);
        if kind == ArtifactKind::Tool {
            deps.record_tool_phase(&phase_report);
        }
        report.merge(phase_report);
    }

    if request.deploy {
        match request.direction {
            Direction::Import => {
                tracing::warn!("--deploy has no effect on import");
            }
            Direction::Export if cancel.is_cancelled() => {
                tracing::warn!("run cancelled; skipping promotion");
            }
            Direction::Export => {
                let applied = report.applied();
                let promotion =
                    promote(&applied, client.as_ref(), request.concurrency, &cancel).await;
                let live: Vec<ArtifactId> = promotion.live().cloned().collect();
                for outcome in &mut report.outcomes {
                    if live.contains(&outcome.id) {
                        outcome.state = Some(DeploymentState::Live);
                    }
                }
                report.promotion = Some(promotion);
            }
        }
    }

    if report.was_cancelled() || cancel.is_cancelled() {
        tracing::warn!("run cancelled; ledger not updated");
    } else {
        let env = ledger::env_key(request.env.as_deref());
        ledger::update_at(store.root(), &env, &report)?;
    }

    let counts = report.counts();
    tracing::info!(
        direction = %request.direction,
        added = counts.added,
        modified = counts.modified,
        unchanged = counts.unchanged,
        failed = counts.failed,
        skipped = counts.skipped_dependency,
        "run finished"
    );
    Ok(report)
}
