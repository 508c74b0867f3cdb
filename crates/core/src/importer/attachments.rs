//! Re-hosting of Jira attachments on GitLab.

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::markup::Substitution;
use crate::models::SourceAttachment;
use crate::retry::RetryPolicy;
use crate::tracker::IssueDestination;

/// An attachment that now lives on GitLab.
#[derive(Debug, Clone)]
pub struct RelocatedAttachment {
    pub filename: String,
    /// Markdown reference to the uploaded file.
    pub markdown: String,
    /// Rewrites `!filename|options!` embeds to [`Self::markdown`].
    pub substitution: Substitution,
}

/// Uploads attachments and yields the substitutions that point their
/// placeholders at the uploaded copies.
#[derive(Debug, Clone)]
pub struct AttachmentRelocator {
    media_extensions: Vec<String>,
}

impl AttachmentRelocator {
    pub fn new(media_extensions: &[String]) -> Self {
        Self {
            media_extensions: media_extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Whether `filename` is embedded as an image rather than linked.
    pub fn is_media(&self, filename: &str) -> bool {
        extension(filename).is_some_and(|ext| self.media_extensions.contains(&ext))
    }

    /// Fresh upload name: a UUID v4 with the lower-cased original extension.
    pub fn upload_name(filename: &str) -> String {
        match extension(filename) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        }
    }

    /// Markdown for an uploaded file.
    pub fn markdown(&self, filename: &str, url: &str) -> String {
        if self.is_media(filename) {
            format!("![{}]({})", filename, url)
        } else {
            format!("[{}]({})", filename, url)
        }
    }

    /// Upload one attachment, acting as `uploader` when given. Failures are
    /// logged and yield `None`, which leaves the placeholder untranslated.
    pub async fn relocate<D: IssueDestination>(
        &self,
        destination: &D,
        retry: &RetryPolicy,
        attachment: &SourceAttachment,
        uploader: Option<&str>,
    ) -> Option<RelocatedAttachment> {
        let upload_name = Self::upload_name(&attachment.filename);
        let name = upload_name.as_str();
        let content = attachment.content.as_slice();
        let uploaded = retry
            .run("upload attachment", move || async move {
                destination.upload_file(name, content, uploader).await
            })
            .await;

        let uploaded = match uploaded {
            Ok(u) => u,
            Err(e) => {
                warn!(
                    filename = %attachment.filename,
                    kib = attachment.content.len() / 1024,
                    error = %e,
                    "attachment upload failed"
                );
                return None;
            }
        };

        let markdown = self.markdown(&attachment.filename, &uploaded.url);
        let pattern = format!("!{}[^!]*!", regex_lite::escape(&attachment.filename));
        let substitution = match Substitution::regex(&pattern, markdown.clone()) {
            Ok(s) => s,
            Err(e) => {
                warn!(filename = %attachment.filename, error = %e, "cannot build attachment substitution");
                return None;
            }
        };

        info!(filename = %attachment.filename, url = %uploaded.url, "relocated attachment");
        Some(RelocatedAttachment {
            filename: attachment.filename.clone(),
            markdown,
            substitution,
        })
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;

    fn relocator() -> AttachmentRelocator {
        AttachmentRelocator::new(&ImportConfig::default().media_extensions)
    }

    #[test]
    fn test_upload_name_keeps_lowercased_extension() {
        let name = AttachmentRelocator::upload_name("Screen Shot.PNG");
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 36 + 4);
        assert_ne!(name, AttachmentRelocator::upload_name("Screen Shot.PNG"));

        let bare = AttachmentRelocator::upload_name("README");
        assert_eq!(bare.len(), 36);
    }

    #[test]
    fn test_media_detection() {
        let r = relocator();
        assert!(r.is_media("a.JPG"));
        assert!(r.is_media("clip.mkv"));
        assert!(!r.is_media("log.txt"));
        assert!(!r.is_media("noext"));
    }

    #[test]
    fn test_markdown_forms() {
        let r = relocator();
        assert_eq!(r.markdown("shot.png", "/uploads/x/a.png"), "![shot.png](/uploads/x/a.png)");
        assert_eq!(r.markdown("log.txt", "/uploads/x/b.txt"), "[log.txt](/uploads/x/b.txt)");
    }
}
