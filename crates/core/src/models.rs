//! Domain model types shared by the clients, the translator and the importer.
//!
//! `Source*` types are what is read from Jira, `New*` types are payloads
//! written to GitLab.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Numeric Jira issue id.
pub type SourceIssueId = u64;

/// Project-scoped GitLab issue number (`iid`).
pub type IssueIid = u64;

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// A Jira user as referenced by issues, comments and attachments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceUser {
    pub display_name: String,
    pub account_id: String,
}

/// A sprint or version an issue belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMilestone {
    pub id: u64,
    pub name: String,
    pub state: MilestoneState,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
}

/// Lifecycle state of a source milestone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    Open,
    Closed,
}

impl MilestoneState {
    /// Parse a Jira sprint state. Anything other than `closed` is open
    /// (Jira also reports `active` and `future`).
    pub fn from_jira(state: &str) -> Self {
        if state.eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

/// A comment on a Jira issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceComment {
    pub author: SourceUser,
    pub body: String,
    pub created: DateTime<FixedOffset>,
}

/// A file attached to a Jira issue. The content is only held while the
/// owning issue is being imported.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceAttachment {
    pub author: SourceUser,
    pub filename: String,
    pub content: Vec<u8>,
}

impl std::fmt::Debug for SourceAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAttachment")
            .field("author", &self.author)
            .field("filename", &self.filename)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// Comments and attachments of one issue, fetched right before it is
/// imported.
#[derive(Debug, Clone, Default)]
pub struct IssueDetails {
    pub comments: Vec<SourceComment>,
    pub attachments: Vec<SourceAttachment>,
    /// File names of attachments whose content could not be downloaded.
    pub missing_attachments: Vec<String>,
}

/// A Jira issue as returned by the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceIssue {
    pub id: SourceIssueId,
    /// Human-readable key such as `PROJ-12`.
    pub key: String,
    /// REST URL of the issue, used to fetch details.
    pub self_url: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub reporter: SourceUser,
    pub assignee: Option<SourceUser>,
    pub parent: Option<SourceIssueId>,
    /// Issues this one is blocked by.
    pub inward: Vec<SourceIssueId>,
    /// Issues this one relates to or blocks.
    pub outward: Vec<SourceIssueId>,
    pub labels: Vec<String>,
    pub milestones: Vec<SourceMilestone>,
    /// Seconds.
    pub time_spent: Option<u64>,
    /// Seconds.
    pub time_estimate: Option<u64>,
    pub due_date: Option<NaiveDate>,
    pub created: DateTime<FixedOffset>,
    pub updated: DateTime<FixedOffset>,
}

impl SourceIssue {
    /// Referenced issue ids in resolution order: parent, then inward links,
    /// then outward links.
    pub fn references(&self) -> Vec<SourceIssueId> {
        self.parent
            .iter()
            .chain(self.inward.iter())
            .chain(self.outward.iter())
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Destination side
// ---------------------------------------------------------------------------

/// The GitLab project being imported into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationProject {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,
    pub web_url: String,
}

impl DestinationProject {
    /// Browser URL of an issue in this project.
    pub fn issue_url(&self, iid: IssueIid) -> String {
        format!("{}/-/issues/{}", self.web_url.trim_end_matches('/'), iid)
    }
}

/// A GitLab project member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationUser {
    pub id: u64,
    #[serde(rename = "username")]
    pub login: String,
}

/// GitLab issue type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    #[default]
    Issue,
    Incident,
}

/// Payload for creating a GitLab issue.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    /// Serialized as a comma separated list.
    #[serde(serialize_with = "serialize_labels")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    pub issue_type: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<FixedOffset>>,
}

fn serialize_labels<S: serde::Serializer>(labels: &[String], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&labels.join(","))
}

/// Payload for creating a note (comment) on a GitLab issue.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewNote {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<FixedOffset>>,
}

/// Payload for creating a GitLab milestone.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewMilestone {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

/// A GitLab milestone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationMilestone {
    pub id: u64,
    pub title: String,
}

/// A GitLab issue as listed by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationIssue {
    pub id: u64,
    pub iid: IssueIid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Relation between two GitLab issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Blocks,
    IsBlockedBy,
    RelatesTo,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocks => write!(f, "blocks"),
            Self::IsBlockedBy => write!(f, "is_blocked_by"),
            Self::RelatesTo => write!(f, "relates_to"),
        }
    }
}

/// Payload for linking two issues of the destination project.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewLink {
    pub target_project_id: u64,
    pub target_issue_iid: IssueIid,
    pub link_type: LinkKind,
}

/// Result of uploading a file to a GitLab project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    /// Project-relative URL, e.g. `/uploads/<secret>/<name>`.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> SourceUser {
        SourceUser {
            display_name: name.into(),
            account_id: format!("acc-{name}"),
        }
    }

    #[test]
    fn test_references_order() {
        let created = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+00:00").unwrap();
        let issue = SourceIssue {
            id: 1,
            key: "P-1".into(),
            self_url: String::new(),
            issue_type: "Task".into(),
            status: "Open".into(),
            priority: None,
            summary: "s".into(),
            description: None,
            reporter: user("a"),
            assignee: None,
            parent: Some(9),
            inward: vec![3, 4],
            outward: vec![5],
            labels: vec![],
            milestones: vec![],
            time_spent: None,
            time_estimate: None,
            due_date: None,
            created,
            updated: created,
        };
        assert_eq!(issue.references(), vec![9, 3, 4, 5]);
    }

    #[test]
    fn test_new_issue_serialization() {
        let issue = NewIssue {
            title: "Crash on start".into(),
            description: "boom".into(),
            labels: vec!["status::open".into(), "type::bug".into()],
            issue_type: IssueKind::Incident,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["labels"], "status::open,type::bug");
        assert_eq!(json["issue_type"], "incident");
        assert_eq!(json["due_date"], "2024-05-01");
        assert!(json.get("assignee_id").is_none());
        assert!(json.get("weight").is_none());
    }

    #[test]
    fn test_link_kind_display() {
        assert_eq!(LinkKind::IsBlockedBy.to_string(), "is_blocked_by");
        let link = NewLink {
            target_project_id: 4,
            target_issue_iid: 2,
            link_type: LinkKind::RelatesTo,
        };
        assert_eq!(serde_json::to_value(&link).unwrap()["link_type"], "relates_to");
    }

    #[test]
    fn test_milestone_state_from_jira() {
        assert_eq!(MilestoneState::from_jira("closed"), MilestoneState::Closed);
        assert_eq!(MilestoneState::from_jira("active"), MilestoneState::Open);
        assert_eq!(MilestoneState::from_jira("future"), MilestoneState::Open);
    }

    #[test]
    fn test_attachment_debug_hides_content() {
        let attachment = SourceAttachment {
            author: user("a"),
            filename: "shot.png".into(),
            content: vec![0u8; 2048],
        };
        let rendered = format!("{attachment:?}");
        assert!(rendered.contains("bytes: 2048"));
    }
}
