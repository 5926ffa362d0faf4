//! # agentsync-sync
//!
//! Convergence between the local agents/tools tree and the remote registry.
//!
//! Call [`pipeline::run`] for a full import or export, or [`pipeline::plan`]
//! to see what a run would write without writing anything. The pieces are
//! usable on their own: [`compute_diff`] and [`Reconciler`] for one kind,
//! [`promote`] for draft → live, [`status::check`] for an offline look at the
//! tree against the last recorded sync.

pub mod diff;
pub mod direction;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod promote;
pub mod reconcile;
pub mod report;
pub mod side;
pub mod status;

pub use diff::{compute_diff, preview, ArtifactPreview, Change, Diff, DiffEntry};
pub use direction::Direction;
pub use error::SyncError;
pub use pipeline::{plan, run, KindScope, Plan, SyncRequest};
pub use promote::{promote, PromotionReport, PromotionStatus};
pub use reconcile::{DependencyContext, Reconciler};
pub use report::{ArtifactOutcome, Counts, Outcome, Report};
pub use side::{ArtifactSide, LocalSide, RemoteSide};
pub use status::{Signal, StatusReport};
