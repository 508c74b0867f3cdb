//! The import orchestrator.
//!
//! [`Importer`] creates GitLab issues from Jira issues in dependency order:
//! an issue's parent and linked issues are created before the issue itself
//! so that its description can point at them. A second pass
//! ([`Importer::link_all`]) creates the GitLab issue links once every issue
//! exists.

pub mod attachments;
pub mod mapping;
pub mod milestones;
pub mod reset;

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::future::Future;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, ImportConfig};
use crate::confirm::Confirmer;
use crate::errors::{GitLabError, ImportError};
use crate::identity::IdentityMapper;
use crate::markup::{MarkupTranslator, Substitutions};
use crate::models::{
    DestinationIssue, DestinationProject, DestinationUser, IssueIid, IssueKind, LinkKind,
    NewIssue, NewLink, NewNote, SourceIssue, SourceIssueId, SourceUser,
};
use crate::retry::RetryPolicy;
use crate::tracker::{IssueDestination, IssueSource};

pub use attachments::{AttachmentRelocator, RelocatedAttachment};
pub use mapping::{IdMapping, ImportState};
pub use milestones::MilestoneResolver;
pub use reset::{reset_destination, ResetStats};

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Outcome of the issue creation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: usize,
    pub failed: usize,
    /// Steps that failed after their issue was created (comments, time
    /// tracking, closing, milestones) and attachments that could not be
    /// downloaded.
    pub warnings: usize,
    /// Reporters, assignees, comment authors and uploaders attributed to
    /// the default user because they have no mapping.
    pub fallback_users: usize,
}

/// Outcome of the link pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub created: usize,
    /// One endpoint was never imported.
    pub skipped_unresolved: usize,
    pub failed: usize,
}

/// A unit of work on the import stack.
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// Visit an issue and schedule its references.
    Enter(SourceIssueId),
    /// Create an issue whose references have been handled.
    Create(SourceIssueId),
}

/// Moves the issues of one Jira project into one GitLab project.
pub struct Importer<'a, S, D> {
    source: &'a S,
    destination: &'a D,
    config: &'a AppConfig,
    project: DestinationProject,
    identity: IdentityMapper,
    translator: MarkupTranslator,
    mentions: Substitutions,
    relocator: AttachmentRelocator,
    milestones: MilestoneResolver,
    retry: RetryPolicy,
    mapping: IdMapping,
    /// Display names the miss policy has already been applied to.
    checked_users: HashSet<String>,
}

impl<'a, S: IssueSource, D: IssueDestination> Importer<'a, S, D> {
    pub fn new(
        source: &'a S,
        destination: &'a D,
        config: &'a AppConfig,
        project: DestinationProject,
        identity: IdentityMapper,
        translator: MarkupTranslator,
    ) -> Self {
        Self {
            source,
            destination,
            config,
            project,
            identity,
            translator,
            mentions: Substitutions::new(),
            relocator: AttachmentRelocator::new(&config.import.media_extensions),
            milestones: MilestoneResolver::new(),
            retry: RetryPolicy::from(&config.retry),
            mapping: IdMapping::new(),
            checked_users: HashSet::new(),
        }
    }

    /// Fetch the destination project and its members, map the source users
    /// and apply the configured miss policy. Nothing is written.
    #[instrument(skip_all)]
    pub async fn connect(
        source: &'a S,
        destination: &'a D,
        config: &'a AppConfig,
        confirmer: &impl Confirmer,
    ) -> Result<Self, ImportError> {
        let project = destination.project().await?;
        info!(project = %project.path_with_namespace, "connected to GitLab project");

        let members = destination.members().await?;
        let identity = IdentityMapper::new(&config.identity, &config.gitlab.default_user, members)?;

        let users = source.users().await?;
        identity.check(&users, config.identity.on_missing, confirmer)?;

        let translator = MarkupTranslator::new()?;
        let mut importer =
            Self::new(source, destination, config, project, identity, translator).with_mentions(&users);
        importer
            .checked_users
            .extend(users.into_iter().map(|u| u.display_name));
        Ok(importer)
    }

    /// Rewrite `[~accountid:...]` mentions of `users` to GitLab logins.
    pub fn with_mentions(mut self, users: &[SourceUser]) -> Self {
        self.mentions = self.identity.mention_substitutions(users);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn project(&self) -> &DestinationProject {
        &self.project
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    pub fn milestones(&self) -> &MilestoneResolver {
        &self.milestones
    }

    /// Apply the miss policy to the users of `issues` and ask the operator
    /// to go ahead. With a `root` key only that issue and the issues it
    /// references are counted.
    pub fn confirm_import(
        &mut self,
        issues: &[SourceIssue],
        root: Option<&str>,
        confirmer: &impl Confirmer,
    ) -> Result<(), ImportError> {
        let selected = match root {
            Some(key) => dependency_closure(issues, find_issue(issues, key)?),
            None => issues.iter().collect(),
        };
        if selected.is_empty() {
            warn!("no Jira issues to import");
            return Err(ImportError::NothingToImport);
        }

        self.check_issue_users(&selected, confirmer)?;

        let prompt = format!(
            "Import {} Jira issue(s) into GitLab project '{}'?",
            selected.len(),
            self.project.name
        );
        if confirmer.confirm(&prompt) {
            Ok(())
        } else {
            info!("import declined");
            Err(ImportError::Declined)
        }
    }

    /// Apply the miss policy to the reporters and assignees of `issues`
    /// that were not among the project's assignable users.
    pub fn check_issue_users(
        &mut self,
        issues: &[&SourceIssue],
        confirmer: &impl Confirmer,
    ) -> Result<(), ImportError> {
        let mut users: Vec<SourceUser> = Vec::new();
        for user in issues
            .iter()
            .flat_map(|&i| std::iter::once(&i.reporter).chain(i.assignee.as_ref()))
        {
            if !self.checked_users.contains(&user.display_name)
                && !users.iter().any(|u| u.display_name == user.display_name)
            {
                users.push(user.clone());
            }
        }
        if users.is_empty() {
            return Ok(());
        }

        debug!(count = users.len(), "checking users found on issues");
        self.identity
            .check(&users, self.config.identity.on_missing, confirmer)?;
        self.checked_users
            .extend(users.into_iter().map(|u| u.display_name));
        Ok(())
    }

    /// Import every issue of `issues`, dependencies first.
    #[instrument(skip_all, fields(count = issues.len()))]
    pub async fn import_all(&mut self, issues: &[SourceIssue]) -> ImportStats {
        let index = index_issues(issues);
        let mut stats = ImportStats::default();
        for issue in issues {
            self.import_tree(issue.id, &index, &mut stats).await;
        }
        info!(
            imported = stats.imported,
            failed = stats.failed,
            warnings = stats.warnings,
            "issue import finished"
        );
        stats
    }

    /// Import the issue with the given key (`PROJ-12`) or numeric id
    /// together with the issues it references, then link them.
    pub async fn import_one(
        &mut self,
        issues: &[SourceIssue],
        key_or_id: &str,
    ) -> Result<(ImportStats, LinkStats), ImportError> {
        let root = find_issue(issues, key_or_id)?;

        let index = index_issues(issues);
        let mut stats = ImportStats::default();
        self.import_tree(root.id, &index, &mut stats).await;

        let visited: Vec<SourceIssue> = issues
            .iter()
            .filter(|i| self.mapping.is_visited(i.id))
            .cloned()
            .collect();
        let links = self.link_all(&visited).await;
        Ok((stats, links))
    }

    /// Create GitLab links for the parent and issue links of `issues`.
    /// Links with an endpoint that was not imported are skipped.
    #[instrument(skip_all, fields(count = issues.len()))]
    pub async fn link_all(&self, issues: &[SourceIssue]) -> LinkStats {
        let mut stats = LinkStats::default();
        let destination = self.destination;

        for issue in issues {
            for (target, kind) in link_triples(issue) {
                let (Some(from), Some(to)) =
                    (self.mapping.resolved(issue.id), self.mapping.resolved(target))
                else {
                    debug!(key = %issue.key, target, %kind, "link endpoint not imported, skipping");
                    stats.skipped_unresolved += 1;
                    continue;
                };

                let link = NewLink {
                    target_project_id: self.project.id,
                    target_issue_iid: to,
                    link_type: if self.config.gitlab.premium {
                        kind
                    } else {
                        LinkKind::RelatesTo
                    },
                };
                let link = &link;
                match self
                    .retry
                    .run("create link", move || async move {
                        destination.create_link(from, link).await
                    })
                    .await
                {
                    Ok(()) => stats.created += 1,
                    Err(e) => {
                        warn!(key = %issue.key, from, to, kind = %link.link_type, error = %e, "failed to link issues");
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            created = stats.created,
            skipped = stats.skipped_unresolved,
            failed = stats.failed,
            "link pass finished"
        );
        stats
    }

    /// Import `root` and, before it, every unvisited issue it references.
    async fn import_tree(
        &mut self,
        root: SourceIssueId,
        index: &HashMap<SourceIssueId, &SourceIssue>,
        stats: &mut ImportStats,
    ) {
        let mut stack = vec![Frame::Enter(root)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    let Some(issue) = index.get(&id) else {
                        debug!(id, "referenced issue is not part of the import, ignoring");
                        continue;
                    };
                    if !self.mapping.begin(id) {
                        continue;
                    }
                    stack.push(Frame::Create(id));
                    for reference in issue.references().into_iter().rev() {
                        if index.contains_key(&reference) && !self.mapping.is_visited(reference) {
                            stack.push(Frame::Enter(reference));
                        }
                    }
                }
                Frame::Create(id) => {
                    let Some(issue) = index.get(&id) else {
                        continue;
                    };
                    match self.create(issue, stats).await {
                        Some(iid) => {
                            self.mapping.complete(id, iid);
                            stats.imported += 1;
                        }
                        None => {
                            self.mapping.fail(id);
                            stats.failed += 1;
                        }
                    }
                }
            }
        }
    }

    /// Create one issue with its attachments, time tracking, state and
    /// comments. Returns `None` if the issue itself could not be created.
    #[instrument(skip_all, fields(key = %issue.key, id = issue.id))]
    async fn create(&mut self, issue: &SourceIssue, stats: &mut ImportStats) -> Option<IssueIid> {
        info!("importing Jira issue");
        let source = self.source;
        let destination = self.destination;
        let sudo = self.config.gitlab.sudo;

        let details = match self
            .retry
            .run("fetch issue details", move || async move {
                source.issue_details(issue).await
            })
            .await
        {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to fetch issue details");
                return None;
            }
        };
        if !details.missing_attachments.is_empty() {
            warn!(
                files = %details.missing_attachments.join(", "),
                "attachments could not be downloaded and are left out"
            );
            stats.warnings += details.missing_attachments.len();
        }

        let mut substitutions = Substitutions::new();
        let mut relocated = Vec::with_capacity(details.attachments.len());
        for attachment in &details.attachments {
            let uploader = sudo.then(|| attribute(&self.identity, &attachment.author, stats).login.as_str());
            if let Some(r) = self
                .relocator
                .relocate(destination, &self.retry, attachment, uploader)
                .await
            {
                substitutions.insert(r.substitution.clone());
                relocated.push(r);
            }
        }
        let substitutions = self.mentions.merged(&substitutions);

        let mut description = self
            .translator
            .translate(issue.description.as_deref(), &substitutions);
        description.push_str(&self.footer(issue, &relocated));

        let mut milestone_id = None;
        for milestone in &issue.milestones {
            match self
                .milestones
                .resolve(destination, &self.retry, milestone)
                .await
            {
                Ok(id) => milestone_id = Some(id),
                Err(e) => {
                    warn!(milestone = %milestone.name, error = %e, "failed to resolve milestone");
                    stats.warnings += 1;
                }
            }
        }

        let reporter = attribute(&self.identity, &issue.reporter, stats).login.clone();
        if !sudo {
            description = format!("Issue by {}\n\n{}", reporter, description);
        }

        let new_issue = NewIssue {
            title: issue.summary.clone(),
            description,
            labels: issue_labels(issue, &self.config.import),
            assignee_id: issue
                .assignee
                .as_ref()
                .map(|a| attribute(&self.identity, a, stats).id),
            milestone_id,
            issue_type: issue_kind(issue, &self.config.import),
            due_date: issue.due_date,
            weight: issue.time_estimate,
            created_at: Some(issue.created),
        };

        let act_as = sudo.then_some(reporter.as_str());
        let payload = &new_issue;
        let marker = origin_marker(&issue.key);
        let marker = marker.as_str();
        let attempts = &Cell::new(0u32);
        let created = match self
            .retry
            .run("create issue", move || async move {
                attempts.set(attempts.get() + 1);
                // An earlier attempt may have created the issue without us
                // seeing the response.
                if attempts.get() > 1 {
                    if let Some(existing) = find_by_origin(destination, marker).await? {
                        warn!(iid = existing.iid, "issue was created by an earlier attempt, reusing it");
                        return Ok(existing);
                    }
                }
                destination.create_issue(payload, act_as).await
            })
            .await
        {
            Ok(created) => created,
            Err(e) => {
                error!(error = %e, "failed to create GitLab issue");
                return None;
            }
        };
        let iid = created.iid;
        info!(iid, "created GitLab issue");

        if let Some(seconds) = issue.time_spent.filter(|s| *s > 0) {
            self.follow_up("add spent time", stats, move || async move {
                destination.add_spent_time(iid, seconds).await
            })
            .await;
        }
        if let Some(seconds) = issue.time_estimate.filter(|s| *s > 0) {
            self.follow_up("set time estimate", stats, move || async move {
                destination.set_time_estimate(iid, seconds).await
            })
            .await;
        }
        if issue.status == self.config.import.done_status {
            self.follow_up("close issue", stats, move || async move {
                destination.close_issue(iid).await
            })
            .await;
        }

        for comment in &details.comments {
            let author = attribute(&self.identity, &comment.author, stats).login.as_str();
            let mut body = self.translator.translate(comment.body.as_str(), &substitutions);
            if !sudo {
                body = format!("Comment by {}\n\n{}", author, body);
            }
            let note = NewNote {
                body,
                created_at: Some(comment.created),
            };
            let note = &note;
            let act_as = sudo.then_some(author);
            self.follow_up("create note", stats, move || async move {
                destination.create_note(iid, note, act_as).await
            })
            .await;
        }

        debug!(
            attachments = details.attachments.len(),
            comments = details.comments.len(),
            "issue import completed"
        );
        Some(iid)
    }

    /// Run a step on an already created issue; failures become warnings.
    async fn follow_up<T, F, Fut>(&self, what: &str, stats: &mut ImportStats, op: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitLabError>>,
    {
        if let Err(e) = self.retry.run(what, op).await {
            warn!(what, error = %e, "step failed after issue creation");
            stats.warnings += 1;
        }
    }

    /// Attachment list, origin link, timestamps and links to already
    /// imported related issues.
    fn footer(&self, issue: &SourceIssue, attachments: &[RelocatedAttachment]) -> String {
        let mut footer = String::new();

        if !attachments.is_empty() {
            footer.push_str("  \n  \n---  \n**Attachments:**  \n");
            for a in attachments {
                footer.push_str(&format!("- {}  \n", a.markdown.trim_start_matches('!')));
            }
        }

        footer.push_str(&format!(
            "  \n  \n---  \n<small>Jira link: [{key}]({url})  \nCreated/updated: {created}/{updated}</small>  \n",
            key = issue.key,
            url = self.config.jira.browse_url(&issue.key),
            created = issue.created.format(TIMESTAMP_FORMAT),
            updated = issue.updated.format(TIMESTAMP_FORMAT),
        ));

        if let Some(iid) = issue.parent.and_then(|p| self.mapping.resolved(p)) {
            footer.push_str(&format!(
                "<small>Parent issue: {}</small>  \n",
                self.project.issue_url(iid)
            ));
        }
        let blocked_by = self.issue_urls(&issue.inward);
        if !blocked_by.is_empty() {
            footer.push_str(&format!("<small>Blocked by: {}</small>  \n", blocked_by));
        }
        let related = self.issue_urls(&issue.outward);
        if !related.is_empty() {
            footer.push_str(&format!("<small>Related to: {}</small>  \n", related));
        }

        footer
    }

    /// Space separated URLs of the imported issues among `ids`.
    fn issue_urls(&self, ids: &[SourceIssueId]) -> String {
        ids.iter()
            .filter_map(|id| self.mapping.resolved(*id))
            .map(|iid| self.project.issue_url(iid))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn index_issues(issues: &[SourceIssue]) -> HashMap<SourceIssueId, &SourceIssue> {
    issues.iter().map(|i| (i.id, i)).collect()
}

/// The issue with the given key (`PROJ-12`) or numeric id.
fn find_issue<'i>(issues: &'i [SourceIssue], key_or_id: &str) -> Result<&'i SourceIssue, ImportError> {
    issues
        .iter()
        .find(|i| i.key == key_or_id || i.id.to_string() == key_or_id)
        .ok_or_else(|| ImportError::UnknownIssue(key_or_id.to_string()))
}

/// `root` and every issue of `issues` it references, directly or not.
fn dependency_closure<'i>(issues: &'i [SourceIssue], root: &'i SourceIssue) -> Vec<&'i SourceIssue> {
    let index = index_issues(issues);
    let mut seen = HashSet::from([root.id]);
    let mut stack = vec![root];
    let mut closure = Vec::new();
    while let Some(issue) = stack.pop() {
        closure.push(issue);
        for reference in issue.references() {
            if let Some(&next) = index.get(&reference) {
                if seen.insert(reference) {
                    stack.push(next);
                }
            }
        }
    }
    closure
}

/// The member `user` maps to. Unmapped users fall back to the default
/// user and are counted.
fn attribute<'m>(
    identity: &'m IdentityMapper,
    user: &SourceUser,
    stats: &mut ImportStats,
) -> &'m DestinationUser {
    match identity.lookup(&user.display_name) {
        Some(member) => member,
        None => {
            warn!(
                jira_user = %user.display_name,
                fallback = %identity.default_user().login,
                "unmapped Jira user attributed to the default user"
            );
            stats.fallback_users += 1;
            identity.default_user()
        }
    }
}

/// Footer text that identifies the GitLab issue created for `key`.
fn origin_marker(key: &str) -> String {
    format!("Jira link: [{}](", key)
}

async fn find_by_origin<D: IssueDestination>(
    destination: &D,
    marker: &str,
) -> Result<Option<DestinationIssue>, GitLabError> {
    Ok(destination
        .list_issues()
        .await?
        .into_iter()
        .find(|i| i.description.as_deref().is_some_and(|d| d.contains(marker))))
}

/// Links of one issue in creation order: parent, inward, outward.
fn link_triples(issue: &SourceIssue) -> Vec<(SourceIssueId, LinkKind)> {
    issue
        .parent
        .iter()
        .map(|&p| (p, LinkKind::Blocks))
        .chain(issue.inward.iter().map(|&i| (i, LinkKind::IsBlockedBy)))
        .chain(issue.outward.iter().map(|&o| (o, LinkKind::RelatesTo)))
        .collect()
}

/// Jira labels plus scoped `status::`, `priority::` and `type::` labels.
pub fn issue_labels(issue: &SourceIssue, rules: &ImportConfig) -> Vec<String> {
    let mut labels = issue.labels.clone();
    if !issue.status.is_empty() {
        labels.push(format!("status::{}", issue.status.to_lowercase()));
    }
    if let Some(priority) = issue.priority.as_deref().filter(|p| !p.is_empty()) {
        labels.push(format!("priority::{}", priority.to_lowercase()));
    }
    if !issue.issue_type.is_empty() {
        let kind = rules
            .type_map
            .get(&issue.issue_type)
            .map(String::as_str)
            .unwrap_or(&issue.issue_type);
        labels.push(format!("type::{}", kind));
    }
    labels
}

pub fn issue_kind(issue: &SourceIssue, rules: &ImportConfig) -> IssueKind {
    if rules.incident_types.contains(&issue.issue_type) {
        IssueKind::Incident
    } else {
        IssueKind::Issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceUser;
    use chrono::DateTime;

    fn issue(id: SourceIssueId) -> SourceIssue {
        let created = DateTime::parse_from_rfc3339("2024-03-01T10:15:30+01:00").unwrap();
        SourceIssue {
            id,
            key: format!("PROJ-{id}"),
            self_url: String::new(),
            issue_type: "Story".into(),
            status: "In Progress".into(),
            priority: Some("High".into()),
            summary: "summary".into(),
            description: None,
            reporter: SourceUser {
                display_name: "Jane Roe".into(),
                account_id: "5b10a".into(),
            },
            assignee: None,
            parent: None,
            inward: vec![],
            outward: vec![],
            labels: vec!["backend".into()],
            milestones: vec![],
            time_spent: None,
            time_estimate: None,
            due_date: None,
            created,
            updated: created,
        }
    }

    #[test]
    fn test_labels() {
        let labels = issue_labels(&issue(1), &ImportConfig::default());
        assert_eq!(
            labels,
            vec!["backend", "status::in progress", "priority::high", "type::story"]
        );
    }

    #[test]
    fn test_unmapped_type_uses_raw_name() {
        let mut i = issue(1);
        i.issue_type = "Research".into();
        i.priority = None;
        let labels = issue_labels(&i, &ImportConfig::default());
        assert_eq!(labels, vec!["backend", "status::in progress", "type::Research"]);
    }

    #[test]
    fn test_issue_kind() {
        let rules = ImportConfig::default();
        let mut i = issue(1);
        assert_eq!(issue_kind(&i, &rules), IssueKind::Issue);
        i.issue_type = "Bug".into();
        assert_eq!(issue_kind(&i, &rules), IssueKind::Incident);
    }

    #[test]
    fn test_dependency_closure_survives_cycles() {
        let mut a = issue(1);
        a.outward = vec![2];
        let mut b = issue(2);
        b.parent = Some(1);
        b.inward = vec![3, 404];
        let issues = vec![a, b, issue(3), issue(4)];

        let mut ids: Vec<_> = dependency_closure(&issues, &issues[0])
            .iter()
            .map(|i| i.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_origin_marker_is_key_exact() {
        let marker = origin_marker("PROJ-1");
        assert!("Jira link: [PROJ-1](https://x/browse/PROJ-1)".contains(&marker));
        assert!(!"Jira link: [PROJ-10](https://x/browse/PROJ-10)".contains(&marker));
    }

    #[test]
    fn test_link_triples_order() {
        let mut i = issue(1);
        i.parent = Some(2);
        i.inward = vec![3];
        i.outward = vec![4, 5];
        assert_eq!(
            link_triples(&i),
            vec![
                (2, LinkKind::Blocks),
                (3, LinkKind::IsBlockedBy),
                (4, LinkKind::RelatesTo),
                (5, LinkKind::RelatesTo),
            ]
        );
    }
}
