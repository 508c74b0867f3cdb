//! GitLab REST API v4 client scoped to the destination project.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::config::GitLabConfig;
use crate::errors::GitLabError;
use crate::models::{
    DestinationIssue, DestinationMilestone, DestinationProject, DestinationUser, IssueIid,
    NewIssue, NewLink, NewMilestone, NewNote, UploadedFile,
};
use crate::tracker::IssueDestination;

const PER_PAGE: usize = 100;

/// Asynchronous GitLab REST API client.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_url: String,
    project_id: u64,
    token: String,
}

impl GitLabClient {
    /// Build a client from resolved configuration.
    pub fn new(config: &GitLabConfig) -> Result<Self, GitLabError> {
        let token = config.token.clone().ok_or_else(|| {
            GitLabError::AuthenticationFailed(format!(
                "token from '{}' not resolved",
                config.token_env
            ))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("issuebridge/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        let api_url = config.api_url();
        info!(api_url = %api_url, project_id = config.project_id, "created GitLabClient");
        Ok(Self {
            http,
            api_url,
            project_id: config.project_id,
            token,
        })
    }

    fn project_path(&self, path: &str) -> String {
        format!("{}/projects/{}{}", self.api_url, self.project_id, path)
    }

    fn request(&self, method: Method, url: &str, sudo: Option<&str>) -> reqwest::RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token);
        match sudo {
            Some(login) => req.header("Sudo", login),
            None => req,
        }
    }

    /// Follow page numbers until a short page comes back.
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, GitLabError> {
        let mut items = Vec::new();
        let per_page = PER_PAGE.to_string();
        let mut page = 1u32;
        loop {
            let page_str = page.to_string();
            let resp = self
                .request(Method::GET, url, None)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())])
                .send()
                .await?;
            let resp = check_response(resp).await?;
            let batch: Vec<T> = resp.json().await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<(), GitLabError> {
        let resp = req.send().await?;
        check_response(resp).await?;
        Ok(())
    }
}

impl IssueDestination for GitLabClient {
    #[instrument(skip(self))]
    async fn project(&self) -> Result<DestinationProject, GitLabError> {
        let url = self.project_path("");
        let resp = self.request(Method::GET, &url, None).send().await?;
        if resp.status().as_u16() == 404 {
            return Err(GitLabError::ProjectNotFound(self.project_id.to_string()));
        }
        let resp = check_response(resp).await?;
        let project: DestinationProject = resp.json().await?;
        info!(name = %project.name, path = %project.path_with_namespace, "fetched GitLab project");
        Ok(project)
    }

    #[instrument(skip(self))]
    async fn members(&self) -> Result<Vec<DestinationUser>, GitLabError> {
        let url = self.project_path("/users");
        let users: Vec<DestinationUser> = self.get_all(&url, &[]).await?;
        info!(count = users.len(), "retrieved GitLab users");
        Ok(users)
    }

    #[instrument(skip(self, issue), fields(title = %issue.title))]
    async fn create_issue(
        &self,
        issue: &NewIssue,
        sudo: Option<&str>,
    ) -> Result<DestinationIssue, GitLabError> {
        let url = self.project_path("/issues");
        let resp = self
            .request(Method::POST, &url, sudo)
            .json(issue)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let created: DestinationIssue = resp.json().await?;
        debug!(iid = created.iid, "created issue");
        Ok(created)
    }

    #[instrument(skip(self, note))]
    async fn create_note(
        &self,
        iid: IssueIid,
        note: &NewNote,
        sudo: Option<&str>,
    ) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}/notes", iid));
        self.send_empty(self.request(Method::POST, &url, sudo).json(note))
            .await?;
        debug!(iid, "created note");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_spent_time(&self, iid: IssueIid, seconds: u64) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}/add_spent_time", iid));
        let duration = format!("{}s", seconds);
        self.send_empty(
            self.request(Method::POST, &url, None)
                .query(&[("duration", duration.as_str())]),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn set_time_estimate(&self, iid: IssueIid, seconds: u64) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}/time_estimate", iid));
        let duration = format!("{}s", seconds);
        self.send_empty(
            self.request(Method::POST, &url, None)
                .query(&[("duration", duration.as_str())]),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn close_issue(&self, iid: IssueIid) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}", iid));
        self.send_empty(
            self.request(Method::PUT, &url, None)
                .json(&serde_json::json!({ "state_event": "close" })),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn create_link(&self, iid: IssueIid, link: &NewLink) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}/links", iid));
        self.send_empty(self.request(Method::POST, &url, None).json(link))
            .await?;
        debug!(iid, target = link.target_issue_iid, kind = %link.link_type, "created link");
        Ok(())
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn upload_file(
        &self,
        filename: &str,
        content: &[u8],
        sudo: Option<&str>,
    ) -> Result<UploadedFile, GitLabError> {
        let url = self.project_path("/uploads");
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .request(Method::POST, &url, sudo)
            .multipart(form)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let uploaded: UploadedFile = resp.json().await?;
        debug!(url = %uploaded.url, "uploaded file");
        Ok(uploaded)
    }

    #[instrument(skip(self))]
    async fn find_milestones(&self, title: &str) -> Result<Vec<DestinationMilestone>, GitLabError> {
        let url = self.project_path("/milestones");
        self.get_all(&url, &[("title", title)]).await
    }

    #[instrument(skip(self, milestone), fields(title = %milestone.title))]
    async fn create_milestone(
        &self,
        milestone: &NewMilestone,
    ) -> Result<DestinationMilestone, GitLabError> {
        let url = self.project_path("/milestones");
        let resp = self
            .request(Method::POST, &url, None)
            .json(milestone)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let created: DestinationMilestone = resp.json().await?;
        info!(id = created.id, title = %created.title, "created milestone");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn close_milestone(&self, id: u64) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/milestones/{}", id));
        self.send_empty(
            self.request(Method::PUT, &url, None)
                .json(&serde_json::json!({ "state_event": "close" })),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_issues(&self) -> Result<Vec<DestinationIssue>, GitLabError> {
        let url = self.project_path("/issues");
        self.get_all(&url, &[("scope", "all")]).await
    }

    #[instrument(skip(self))]
    async fn delete_issue(&self, iid: IssueIid) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/issues/{}", iid));
        self.send_empty(self.request(Method::DELETE, &url, None))
            .await
    }

    #[instrument(skip(self))]
    async fn list_milestones(&self) -> Result<Vec<DestinationMilestone>, GitLabError> {
        let url = self.project_path("/milestones");
        self.get_all(&url, &[]).await
    }

    #[instrument(skip(self))]
    async fn delete_milestone(&self, id: u64) -> Result<(), GitLabError> {
        let url = self.project_path(&format!("/milestones/{}", id));
        self.send_empty(self.request(Method::DELETE, &url, None))
            .await
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, GitLabError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(GitLabError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(GitLabError::RateLimited { retry_after });
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "GitLab API returned error");
    Err(GitLabError::ApiError {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GitLabConfig {
        GitLabConfig {
            url: "https://gitlab.acme.example/".into(),
            project_id: 42,
            token_env: "GITLAB_TOKEN".into(),
            verify_ssl: true,
            sudo: true,
            premium: false,
            default_user: "root".into(),
            token: Some("glpat-abc".into()),
        }
    }

    #[test]
    fn test_project_paths() {
        let client = GitLabClient::new(&config()).unwrap();
        assert_eq!(
            client.project_path("/issues/3/links"),
            "https://gitlab.acme.example/api/v4/projects/42/issues/3/links"
        );
    }

    #[test]
    fn test_unresolved_token_is_rejected() {
        let mut config = config();
        config.token = None;
        assert!(matches!(
            GitLabClient::new(&config),
            Err(GitLabError::AuthenticationFailed(_))
        ));
    }
}
