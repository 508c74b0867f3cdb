//! Jira sprint -> GitLab milestone resolution.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::errors::GitLabError;
use crate::models::{MilestoneState, NewMilestone, SourceMilestone};
use crate::retry::RetryPolicy;
use crate::tracker::IssueDestination;

/// Creates or reuses destination milestones, at most one per name.
#[derive(Debug, Clone, Default)]
pub struct MilestoneResolver {
    by_source: HashMap<u64, u64>,
    by_name: HashMap<String, u64>,
}

impl MilestoneResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination milestone id for `milestone`, creating the milestone if
    /// the project has none with that title.
    pub async fn resolve<D: IssueDestination>(
        &mut self,
        destination: &D,
        retry: &RetryPolicy,
        milestone: &SourceMilestone,
    ) -> Result<u64, GitLabError> {
        if let Some(id) = self.cached(milestone) {
            return Ok(id);
        }

        let title = milestone.name.as_str();
        let existing = retry
            .run("find milestone", move || async move {
                destination.find_milestones(title).await
            })
            .await?;
        if let Some(found) = existing.into_iter().find(|m| m.title == milestone.name) {
            debug!(title, id = found.id, "reusing existing milestone");
            self.remember(milestone, found.id);
            return Ok(found.id);
        }

        let payload = NewMilestone {
            title: milestone.name.clone(),
            start_date: milestone.start_date.map(|d| d.date_naive()),
            due_date: milestone.end_date.map(|d| d.date_naive()),
        };
        let payload = &payload;
        let created = retry
            .run("create milestone", move || async move {
                destination.create_milestone(payload).await
            })
            .await?;
        self.remember(milestone, created.id);

        if milestone.state == MilestoneState::Closed {
            let id = created.id;
            if let Err(e) = retry
                .run("close milestone", move || async move {
                    destination.close_milestone(id).await
                })
                .await
            {
                warn!(title, id, error = %e, "failed to close milestone");
            }
        }

        info!(title, id = created.id, state = ?milestone.state, "milestone ready");
        Ok(created.id)
    }

    /// Number of distinct destination milestones resolved so far.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn cached(&mut self, milestone: &SourceMilestone) -> Option<u64> {
        if let Some(&id) = self.by_source.get(&milestone.id) {
            return Some(id);
        }
        let id = *self.by_name.get(&milestone.name)?;
        self.by_source.insert(milestone.id, id);
        Some(id)
    }

    fn remember(&mut self, milestone: &SourceMilestone, id: u64) {
        self.by_source.insert(milestone.id, id);
        self.by_name.insert(milestone.name.clone(), id);
    }
}
