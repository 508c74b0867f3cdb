//! Jira REST API client (read-only).

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use tracing::{debug, info, instrument, warn};

use super::types::{RawAttachment, RawIssueDetail, RawUser, SearchPage};
use crate::config::JiraConfig;
use crate::errors::JiraError;
use crate::models::{IssueDetails, SourceAttachment, SourceIssue, SourceUser};
use crate::tracker::IssueSource;

/// Asynchronous Jira REST API client scoped to one project.
#[derive(Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
    account: String,
    token: String,
    milestone_field: String,
    page_size: u32,
}

impl JiraClient {
    /// Build a client from resolved configuration.
    pub fn new(config: &JiraConfig) -> Result<Self, JiraError> {
        let token = config.token.clone().ok_or_else(|| {
            JiraError::AuthenticationFailed(format!("token from '{}' not resolved", config.token_env))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("issuebridge/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        let base_url = config.url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, project = %config.project, "created JiraClient");
        Ok(Self {
            http,
            base_url,
            project: config.project.clone(),
            account: config.account.clone(),
            token,
            milestone_field: config.milestone_field.clone(),
            page_size: config.page_size,
        })
    }

    /// Fetch one page of the project's issues ordered by id.
    #[instrument(skip(self))]
    pub async fn search_page(&self, start_at: u32) -> Result<SearchPage, JiraError> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let jql = format!("project={} ORDER BY id ASC", self.project);
        let max_results = self.page_size.to_string();
        let start = start_at.to_string();
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.account, Some(&self.token))
            .query(&[
                ("jql", jql.as_str()),
                ("maxResults", max_results.as_str()),
                ("startAt", start.as_str()),
            ])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let page: SearchPage = resp.json().await?;
        debug!(
            start_at,
            count = page.issues.len(),
            total = page.total,
            "fetched search page"
        );
        Ok(page)
    }

    /// Download the content of an attachment.
    #[instrument(skip(self))]
    pub async fn download(&self, content_url: &str) -> Result<Vec<u8>, JiraError> {
        let resp = self
            .http
            .get(content_url)
            .basic_auth(&self.account, Some(&self.token))
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let bytes = resp.bytes().await?;
        debug!(bytes = bytes.len(), "downloaded attachment");
        Ok(bytes.to_vec())
    }
}

impl IssueSource for JiraClient {
    #[instrument(skip(self))]
    async fn users(&self) -> Result<Vec<SourceUser>, JiraError> {
        let url = format!("{}/rest/api/2/user/assignable/search", self.base_url);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.account, Some(&self.token))
            .query(&[("project", self.project.as_str())])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let users: Vec<RawUser> = resp.json().await?;
        info!(count = users.len(), "retrieved Jira users");
        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn issues(&self) -> Result<Vec<SourceIssue>, JiraError> {
        let mut issues = Vec::new();
        let mut start_at = 0;
        loop {
            let page = self.search_page(start_at).await?;
            if page.issues.is_empty() {
                break;
            }
            let fetched = page.issues.len() as u32;
            for raw in page.issues {
                issues.push(raw.into_source(&self.milestone_field)?);
            }
            start_at += fetched;
            if start_at >= page.total {
                break;
            }
        }
        info!(count = issues.len(), project = %self.project, "retrieved Jira issues");
        Ok(issues)
    }

    #[instrument(skip(self, issue), fields(key = %issue.key))]
    async fn issue_details(&self, issue: &SourceIssue) -> Result<IssueDetails, JiraError> {
        let resp = self
            .http
            .get(&issue.self_url)
            .basic_auth(&self.account, Some(&self.token))
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let detail: RawIssueDetail = resp.json().await?;

        let (attachments, missing_attachments) =
            fetch_attachments(detail.fields.attachment, move |url| async move {
                self.download(&url).await
            })
            .await;

        let comments = detail
            .fields
            .comment
            .comments
            .into_iter()
            .map(|c| c.into_source())
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            attachments = attachments.len(),
            comments = comments.len(),
            "fetched issue details"
        );
        Ok(IssueDetails {
            comments,
            attachments,
            missing_attachments,
        })
    }
}

/// Download the content of every attachment. An attachment that cannot be
/// downloaded is left out and its file name returned separately.
async fn fetch_attachments<F, Fut>(
    raw: Vec<RawAttachment>,
    download: F,
) -> (Vec<SourceAttachment>, Vec<String>)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, JiraError>>,
{
    let mut attachments = Vec::with_capacity(raw.len());
    let mut missing = Vec::new();
    for raw in raw {
        match download(raw.content).await {
            Ok(content) => attachments.push(SourceAttachment {
                author: raw.author.into(),
                filename: raw.filename,
                content,
            }),
            Err(e) => {
                warn!(filename = %raw.filename, error = %e, "attachment download failed, skipping");
                missing.push(raw.filename);
            }
        }
    }
    (attachments, missing)
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, JiraError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(JiraError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = %status, "Jira API returned error");
    Err(JiraError::ApiError {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JiraConfig {
        JiraConfig {
            url: "https://acme.atlassian.net/".into(),
            project: "PROJ".into(),
            account: "migrator@acme.example".into(),
            token_env: "JIRA_TOKEN".into(),
            verify_ssl: true,
            milestone_field: "customfield_10000".into(),
            page_size: 50,
            token: Some("secret".into()),
        }
    }

    #[test]
    fn test_client_construction() {
        let client = JiraClient::new(&config()).unwrap();
        assert_eq!(client.base_url, "https://acme.atlassian.net");
        assert_eq!(client.page_size, 50);
    }

    fn attachment(filename: &str) -> RawAttachment {
        RawAttachment {
            filename: filename.into(),
            content: format!("https://acme.atlassian.net/secure/attachment/{}", filename),
            author: RawUser {
                display_name: "Jane Roe".into(),
                account_id: "abc".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_failed_download_skips_only_that_attachment() {
        let raw = vec![attachment("shot.png"), attachment("gone.log"), attachment("trace.txt")];
        let (attachments, missing) = fetch_attachments(raw, |url| async move {
            if url.ends_with("gone.log") {
                Err(JiraError::ApiError {
                    status: 404,
                    body: "not found".into(),
                })
            } else {
                Ok(url.into_bytes())
            }
        })
        .await;

        let names: Vec<_> = attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["shot.png", "trace.txt"]);
        assert_eq!(missing, ["gone.log"]);
        assert_eq!(attachments[0].author.display_name, "Jane Roe");
    }

    #[test]
    fn test_unresolved_token_is_rejected() {
        let mut config = config();
        config.token = None;
        assert!(matches!(
            JiraClient::new(&config),
            Err(JiraError::AuthenticationFailed(_))
        ));
    }
}
