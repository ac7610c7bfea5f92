//! Commits of a git repository, delivered as a gzipped tarball.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const TYPE: &str = "git";
pub const GITHUB_TYPE: &str = "gitHub";

/// Transport scheme serving repository tarballs.
pub const SCHEME: &str = "git";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    pub repo_url: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl GitAccessSpec {
    pub fn new(repo_url: impl Into<String>, commit: impl Into<String>) -> Self {
        GitAccessSpec {
            type_name: super::versioned(TYPE),
            repo_url: repo_url.into(),
            reference: None,
            commit: Some(commit.into()),
        }
    }

    /// A spec following `reference` (a branch or tag) instead of a commit.
    pub fn for_ref(repo_url: impl Into<String>, reference: impl Into<String>) -> Self {
        GitAccessSpec {
            type_name: super::versioned(TYPE),
            repo_url: repo_url.into(),
            reference: Some(reference.into()),
            commit: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.repo_url.is_empty() {
            return Err(AccessError::invalid("git access", "repoUrl is required"));
        }
        match (self.commit.as_deref(), self.reference.as_deref()) {
            (Some(commit), _) if !is_commit_id(commit) => Err(AccessError::invalid(
                "git access",
                format!("commit {commit:?} is not a SHA-1 commit id"),
            )),
            (None, None) => Err(AccessError::invalid("git access", "ref or commit is required")),
            _ => Ok(()),
        }
    }

    pub fn locator(&self) -> Locator {
        let mut locator = Locator::new(SCHEME, &self.repo_url);
        if let Some(reference) = &self.reference {
            locator = locator.with_attribute("ref", reference);
        }
        if let Some(commit) = &self.commit {
            locator = locator.with_attribute("commit", commit);
        }
        locator
    }
}

fn is_commit_id(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl AccessSpec for GitAccessSpec {
    fn kind(&self) -> &str {
        if self.type_name.starts_with(GITHUB_TYPE) {
            GITHUB_TYPE
        } else {
            TYPE
        }
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        match (&self.commit, &self.reference) {
            (Some(commit), _) => format!("git commit {commit}[{}]", self.repo_url),
            (None, Some(reference)) => format!("git ref {reference}[{}]", self.repo_url),
            (None, None) => format!("git repository {}", self.repo_url),
        }
    }

    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        let pin = self.commit.as_ref().or(self.reference.as_ref())?;
        Some(format!("{}@{pin}", self.repo_url))
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        self.validate()?;
        let ctx = cv.context().clone();
        let locator = self.locator();
        Ok(AccessMethod::new(self.clone_box(), mime::MIME_TGZ, false, move || {
            Ok(super::transport_blob(&ctx, locator.clone(), mime::MIME_TGZ, None))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::testing;
    use serde_json::json;

    const COMMIT: &str = "7b1445755ee2527f0bf80ef9eeb59a5d2e6e3e1f";

    #[test]
    fn github_alias_keeps_kind() {
        let spec: GitAccessSpec = serde_json::from_value(json!({
            "type": "gitHub/v1",
            "repoUrl": "https://github.com/acme/app",
            "commit": COMMIT,
        }))
        .unwrap();
        assert_eq!(spec.kind(), GITHUB_TYPE);
        assert_eq!(spec.version(), Some("v1"));
        assert_eq!(GitAccessSpec::new("u", COMMIT).kind(), TYPE);
        assert_eq!(
            spec.locator().to_string(),
            format!("https://github.com/acme/app?commit={COMMIT}")
        );
    }

    #[test]
    fn validation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        assert!(GitAccessSpec::new("https://x/y", "abc").access_method(&cv).is_err());
        let mut neither = GitAccessSpec::for_ref("https://x/y", "main");
        neither.reference = None;
        assert!(neither.access_method(&cv).is_err());

        let method = GitAccessSpec::for_ref("https://x/y", "refs/tags/v1")
            .access_method(&cv)
            .unwrap();
        assert_eq!(method.mime_type(), mime::MIME_TGZ);
        // no transport registered for git
        assert!(matches!(method.get(), Err(AccessError::NotSupported { .. })));
    }

    #[test]
    fn reference_hint_pins_commit() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        let spec = GitAccessSpec::new("https://github.com/acme/app", COMMIT);
        assert_eq!(
            spec.reference_hint(&cv),
            Some(format!("https://github.com/acme/app@{COMMIT}"))
        );
    }
}
