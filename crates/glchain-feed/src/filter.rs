//! Author allow/deny filtering of detected commits

use glchain_client::Commit;
use glchain_config::MonitorProject;

/// Matches commit authors by name or email, case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl AuthorFilter {
    pub fn new(allow: &[String], deny: &[String]) -> Self {
        let normalize = |list: &[String]| -> Vec<String> {
            list.iter().map(|a| a.trim().to_lowercase()).collect()
        };
        Self {
            allow: normalize(allow),
            deny: normalize(deny),
        }
    }

    /// Deny wins over allow; an empty allow list admits everyone
    pub fn allows(&self, commit: &Commit) -> bool {
        let name = commit.author_name.to_lowercase();
        let email = commit.author_email.to_lowercase();
        let matches = |author: &String| *author == name || *author == email;

        if self.deny.iter().any(matches) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(matches)
    }
}

impl From<&MonitorProject> for AuthorFilter {
    fn from(project: &MonitorProject) -> Self {
        Self::new(&project.author_allow, &project.author_deny)
    }
}
