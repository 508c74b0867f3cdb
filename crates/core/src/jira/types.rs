//! Wire types of the Jira REST API v2 and their conversion into the
//! domain model.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use crate::errors::JiraError;
use crate::models::{
    MilestoneState, SourceComment, SourceIssue, SourceIssueId, SourceMilestone, SourceUser,
};

const JIRA_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const JIRA_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub start_at: u32,
    #[serde(default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub issues: Vec<RawIssue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    pub display_name: String,
    pub account_id: String,
}

impl From<RawUser> for SourceUser {
    fn from(raw: RawUser) -> Self {
        Self {
            display_name: raw.display_name,
            account_id: raw.account_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNamed {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIssueRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIssueLink {
    #[serde(default)]
    pub inward_issue: Option<RawIssueRef>,
    #[serde(default)]
    pub outward_issue: Option<RawIssueRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSprint {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFields {
    pub created: String,
    pub updated: String,
    #[serde(default)]
    pub duedate: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub reporter: RawUser,
    #[serde(default)]
    pub assignee: Option<RawUser>,
    #[serde(default)]
    pub timespent: Option<u64>,
    #[serde(default)]
    pub timeoriginalestimate: Option<u64>,
    pub issuetype: RawNamed,
    #[serde(default)]
    pub priority: Option<RawNamed>,
    pub status: RawNamed,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub parent: Option<RawIssueRef>,
    #[serde(default)]
    pub issuelinks: Vec<RawIssueLink>,
    /// Custom fields, among them the sprint field named in the config.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub id: String,
    #[serde(rename = "self")]
    pub self_url: String,
    pub key: String,
    pub fields: RawFields,
}

impl RawIssue {
    /// Convert into a [`SourceIssue`], reading milestones from the custom
    /// field `milestone_field`.
    pub fn into_source(self, milestone_field: &str) -> Result<SourceIssue, JiraError> {
        let fields = self.fields;
        let id = parse_id(&self.id)?;

        let mut inward = Vec::new();
        let mut outward = Vec::new();
        for link in &fields.issuelinks {
            if let Some(ref issue) = link.inward_issue {
                inward.push(parse_id(&issue.id)?);
            }
            if let Some(ref issue) = link.outward_issue {
                outward.push(parse_id(&issue.id)?);
            }
        }

        let parent = fields
            .parent
            .as_ref()
            .map(|p| parse_id(&p.id))
            .transpose()?;

        let milestones = match fields.extra.get(milestone_field) {
            Some(value) => parse_sprints(value)?,
            None => Vec::new(),
        };

        let due_date = fields
            .duedate
            .as_deref()
            .map(|d| {
                NaiveDate::parse_from_str(d, JIRA_DATE_FORMAT)
                    .map_err(|e| JiraError::ParseError(format!("due date '{}': {}", d, e)))
            })
            .transpose()?;

        Ok(SourceIssue {
            id,
            key: self.key,
            self_url: self.self_url,
            issue_type: fields.issuetype.name,
            status: fields.status.name,
            priority: fields.priority.map(|p| p.name),
            summary: fields.summary,
            description: fields.description,
            reporter: fields.reporter.into(),
            assignee: fields.assignee.map(Into::into),
            parent,
            inward,
            outward,
            labels: fields.labels,
            milestones,
            time_spent: fields.timespent,
            time_estimate: fields.timeoriginalestimate,
            due_date,
            created: parse_datetime(&fields.created)?,
            updated: parse_datetime(&fields.updated)?,
        })
    }
}

// -- Issue details -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    pub filename: String,
    /// Download URL of the content.
    pub content: String,
    pub author: RawUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawComment {
    pub author: RawUser,
    #[serde(default)]
    pub body: String,
    pub created: String,
}

impl RawComment {
    pub fn into_source(self) -> Result<SourceComment, JiraError> {
        Ok(SourceComment {
            author: self.author.into(),
            body: self.body,
            created: parse_datetime(&self.created)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommentPage {
    #[serde(default)]
    pub comments: Vec<RawComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDetailFields {
    #[serde(default)]
    pub attachment: Vec<RawAttachment>,
    #[serde(default)]
    pub comment: RawCommentPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIssueDetail {
    pub fields: RawDetailFields,
}

// -- Parsing helpers -------------------------------------------------------------

fn parse_id(id: &str) -> Result<SourceIssueId, JiraError> {
    id.parse()
        .map_err(|_| JiraError::ParseError(format!("issue id '{}' is not numeric", id)))
}

/// Parse a Jira timestamp (`2024-03-01T10:15:30.000+0100`), also accepting
/// RFC 3339 as used by the agile API for sprint dates.
pub fn parse_datetime(s: &str) -> Result<DateTime<FixedOffset>, JiraError> {
    DateTime::parse_from_str(s, JIRA_DATETIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map_err(|e| JiraError::ParseError(format!("timestamp '{}': {}", s, e)))
}

fn parse_sprints(value: &serde_json::Value) -> Result<Vec<SourceMilestone>, JiraError> {
    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            debug!(value = %other, "milestone field is not a list, ignoring");
            return Ok(Vec::new());
        }
    };

    let mut milestones = Vec::with_capacity(entries.len());
    for entry in entries {
        let sprint: RawSprint = match serde_json::from_value(entry.clone()) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "skipping unrecognized milestone entry");
                continue;
            }
        };
        milestones.push(SourceMilestone {
            id: sprint.id,
            name: sprint.name,
            state: MilestoneState::from_jira(&sprint.state),
            start_date: sprint.start_date.as_deref().map(parse_datetime).transpose()?,
            end_date: sprint.end_date.as_deref().map(parse_datetime).transpose()?,
        });
    }
    Ok(milestones)
}
