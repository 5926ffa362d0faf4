//! Draft → live promotion of freshly exported artifacts.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use agentsync_core::{ArtifactError, ArtifactId, ArtifactKind};
use agentsync_remote::{PromoteOutcome, RegistryClient};

use crate::report::serialize_display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromotionStatus {
    Promoted,
    /// The live version already matched; nothing changed.
    AlreadyLive,
    Failed { error: ArtifactError },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionOutcome {
    #[serde(serialize_with = "serialize_display")]
    pub id: ArtifactId,
    #[serde(flatten)]
    pub status: PromotionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub outcomes: Vec<PromotionOutcome>,
}

impl PromotionReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.status, PromotionStatus::Failed { .. }))
    }

    /// Identities that are live after promotion.
    pub fn live(&self) -> impl Iterator<Item = &ArtifactId> {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    PromotionStatus::Promoted | PromotionStatus::AlreadyLive
                )
            })
            .map(|o| &o.id)
    }

    pub fn status_of(&self, id: &ArtifactId) -> Option<&PromotionStatus> {
        self.outcomes.iter().find(|o| &o.id == id).map(|o| &o.status)
    }

    pub fn count(&self, wanted: fn(&PromotionStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| wanted(&o.status)).count()
    }
}

/// Promote every identity in `ids`, tools before agents.
///
/// One promote call per identity, at most `concurrency` at a time. A failed
/// call is recorded and never stops the others; identities not yet submitted
/// when `cancel` fires are recorded as cancelled.
pub async fn promote(
    ids: &[ArtifactId],
    registry: &dyn RegistryClient,
    concurrency: usize,
    cancel: &CancellationToken,
) -> PromotionReport {
    let mut report = PromotionReport::default();
    for kind in ArtifactKind::all() {
        let batch: Vec<ArtifactId> = ids.iter().filter(|id| id.kind == *kind).cloned().collect();
        if batch.is_empty() {
            continue;
        }
        let mut outcomes: Vec<PromotionOutcome> = stream::iter(batch)
            .map(|id| async move {
                if cancel.is_cancelled() {
                    return PromotionOutcome {
                        id,
                        status: PromotionStatus::Cancelled,
                    };
                }
                let status = match registry.promote(&id).await {
                    Ok(PromoteOutcome::Promoted) => {
                        tracing::info!(artifact = %id, "promoted to live");
                        PromotionStatus::Promoted
                    }
                    Ok(PromoteOutcome::AlreadyLive) => {
                        tracing::debug!(artifact = %id, "already live");
                        PromotionStatus::AlreadyLive
                    }
                    Err(error) => {
                        tracing::error!(artifact = %id, error = %error, "promotion failed");
                        PromotionStatus::Failed { error }
                    }
                };
                PromotionOutcome { id, status }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.id.cmp(&b.id));
        report.outcomes.extend(outcomes);
    }
    report
}

#[cfg(test)]
mod tests {
    use agentsync_core::{Artifact, Origin};
    use agentsync_remote::memory::Operation;
    use agentsync_remote::MemoryRegistry;

    use super::*;

    fn agent(name: &str) -> Artifact {
        Artifact::agent(name, format!("name: {name}\n"), Origin::Local(name.into())).unwrap()
    }

    #[tokio::test]
    async fn promoting_twice_is_a_no_op_the_second_time() {
        let registry = MemoryRegistry::new();
        registry.upsert(&agent("greeter")).await.unwrap();
        let ids = [ArtifactId::agent("greeter")];
        let cancel = CancellationToken::new();

        let first = promote(&ids, &registry, 2, &cancel).await;
        assert_eq!(first.status_of(&ids[0]), Some(&PromotionStatus::Promoted));
        let second = promote(&ids, &registry, 2, &cancel).await;
        assert_eq!(second.status_of(&ids[0]), Some(&PromotionStatus::AlreadyLive));
        assert!(!second.has_failures());
    }

    #[tokio::test]
    async fn one_failed_promotion_does_not_stop_the_rest() {
        let registry = MemoryRegistry::new();
        for name in ["a", "b", "c"] {
            registry.upsert(&agent(name)).await.unwrap();
        }
        registry.fail_on(
            Operation::Promote,
            ArtifactId::agent("b"),
            ArtifactError::Promotion("quota exceeded".into()),
        );
        let ids: Vec<_> = ["a", "b", "c"].into_iter().map(ArtifactId::agent).collect();

        let report = promote(&ids, &registry, 1, &CancellationToken::new()).await;
        assert!(report.has_failures());
        assert_eq!(report.live().count(), 2);
        assert_eq!(
            registry.state(&ArtifactId::agent("c")),
            Some(agentsync_core::DeploymentState::Live)
        );
    }

    #[tokio::test]
    async fn cancelled_promotion_submits_nothing() {
        let registry = MemoryRegistry::new();
        registry.upsert(&agent("a")).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = promote(&[ArtifactId::agent("a")], &registry, 2, &cancel).await;
        assert_eq!(
            report.status_of(&ArtifactId::agent("a")),
            Some(&PromotionStatus::Cancelled)
        );
        assert_eq!(registry.call_count(Operation::Promote, &ArtifactId::agent("a")), 0);
    }
}
