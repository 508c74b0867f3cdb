//! The two seams of a migration: where issues are read from and where they
//! are written to.
//!
//! [`JiraClient`](crate::jira::JiraClient) and
//! [`GitLabClient`](crate::gitlab::GitLabClient) are the production
//! implementations. The importer is generic over both traits so it can be
//! driven by in-memory fakes.

use crate::errors::{GitLabError, JiraError};
use crate::models::{
    DestinationIssue, DestinationMilestone, DestinationProject, DestinationUser, IssueDetails,
    IssueIid, NewIssue, NewLink, NewMilestone, NewNote, SourceIssue, SourceUser, UploadedFile,
};

/// Read access to the source tracker.
#[allow(async_fn_in_trait)]
pub trait IssueSource {
    /// Users that can be assigned issues in the source project.
    async fn users(&self) -> Result<Vec<SourceUser>, JiraError>;

    /// Every issue of the source project, ordered by id ascending.
    async fn issues(&self) -> Result<Vec<SourceIssue>, JiraError>;

    /// Comments and attachment contents of one issue.
    async fn issue_details(&self, issue: &SourceIssue) -> Result<IssueDetails, JiraError>;
}

/// Write access to the destination project.
///
/// `sudo` names the login to act as; `None` acts as the token owner.
#[allow(async_fn_in_trait)]
pub trait IssueDestination {
    async fn project(&self) -> Result<DestinationProject, GitLabError>;

    async fn members(&self) -> Result<Vec<DestinationUser>, GitLabError>;

    async fn create_issue(
        &self,
        issue: &NewIssue,
        sudo: Option<&str>,
    ) -> Result<DestinationIssue, GitLabError>;

    async fn create_note(
        &self,
        iid: IssueIid,
        note: &NewNote,
        sudo: Option<&str>,
    ) -> Result<(), GitLabError>;

    async fn add_spent_time(&self, iid: IssueIid, seconds: u64) -> Result<(), GitLabError>;

    async fn set_time_estimate(&self, iid: IssueIid, seconds: u64) -> Result<(), GitLabError>;

    async fn close_issue(&self, iid: IssueIid) -> Result<(), GitLabError>;

    async fn create_link(&self, iid: IssueIid, link: &NewLink) -> Result<(), GitLabError>;

    async fn upload_file(
        &self,
        filename: &str,
        content: &[u8],
        sudo: Option<&str>,
    ) -> Result<UploadedFile, GitLabError>;

    /// Milestones whose title matches exactly.
    async fn find_milestones(&self, title: &str) -> Result<Vec<DestinationMilestone>, GitLabError>;

    async fn create_milestone(
        &self,
        milestone: &NewMilestone,
    ) -> Result<DestinationMilestone, GitLabError>;

    async fn close_milestone(&self, id: u64) -> Result<(), GitLabError>;

    async fn list_issues(&self) -> Result<Vec<DestinationIssue>, GitLabError>;

    async fn delete_issue(&self, iid: IssueIid) -> Result<(), GitLabError>;

    async fn list_milestones(&self) -> Result<Vec<DestinationMilestone>, GitLabError>;

    async fn delete_milestone(&self, id: u64) -> Result<(), GitLabError>;
}
