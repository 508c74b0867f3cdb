//! Emptying the destination project before a re-run.

use tracing::{info, instrument, warn};

use crate::confirm::Confirmer;
use crate::errors::ImportError;
use crate::tracker::IssueDestination;

/// Outcome of [`reset_destination`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetStats {
    pub issues_deleted: usize,
    pub milestones_deleted: usize,
    pub failed: usize,
}

/// Delete every issue, then every milestone, of the destination project
/// after the operator confirms. Declining leaves the project untouched.
#[instrument(skip_all)]
pub async fn reset_destination<D: IssueDestination>(
    destination: &D,
    confirmer: &impl Confirmer,
) -> Result<ResetStats, ImportError> {
    let project = destination.project().await?;
    let issues = destination.list_issues().await?;
    let milestones = destination.list_milestones().await?;

    let prompt = format!(
        "Delete {} issue(s) and {} milestone(s) from GitLab project '{}'?",
        issues.len(),
        milestones.len(),
        project.path_with_namespace
    );
    if !confirmer.confirm(&prompt) {
        info!("reset declined");
        return Err(ImportError::Declined);
    }

    let mut stats = ResetStats::default();
    for issue in &issues {
        match destination.delete_issue(issue.iid).await {
            Ok(()) => stats.issues_deleted += 1,
            Err(e) => {
                warn!(iid = issue.iid, error = %e, "failed to delete issue");
                stats.failed += 1;
            }
        }
    }
    for milestone in &milestones {
        match destination.delete_milestone(milestone.id).await {
            Ok(()) => stats.milestones_deleted += 1,
            Err(e) => {
                warn!(id = milestone.id, title = %milestone.title, error = %e, "failed to delete milestone");
                stats.failed += 1;
            }
        }
    }

    info!(
        issues = stats.issues_deleted,
        milestones = stats.milestones_deleted,
        failed = stats.failed,
        "destination reset"
    );
    Ok(stats)
}
