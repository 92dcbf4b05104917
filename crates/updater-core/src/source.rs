//! Remote source references
//!
//! Accepted spellings:
//!
//! - `github:<owner>/<repo>` or `github:<owner>/<repo>@<branch>`
//! - `https://github.com/<owner>/<repo>` (branch `main`)
//! - any other `http://` or `https://` URL, taken as a direct zip archive
//! - `file://<path>`, a local directory mirror of the tree

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_BRANCH: &str = "main";
const GITHUB_PREFIX: &str = "github:";
const GITHUB_HOSTS: [&str; 2] = ["https://github.com/", "http://github.com/"];
const FILE_PREFIX: &str = "file://";

/// Where the reference tree is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceRef {
    /// A direct URL to a zip archive of the tree
    Archive { url: String },
    /// A hosted repository branch, downloaded as its zip archive
    Hosted {
        owner: String,
        repo: String,
        branch: String,
    },
    /// A local directory holding the tree
    Directory { path: PathBuf },
}

impl SourceRef {
    /// A hosted repository branch.
    pub fn hosted(owner: &str, repo: &str, branch: &str) -> Result<Self> {
        let input = format!("{owner}/{repo}@{branch}");
        for (label, value) in [("owner", owner), ("repository", repo), ("branch", branch)] {
            if !is_valid_name(value, label == "branch") {
                return Err(Error::InvalidSource {
                    input,
                    reason: format!("invalid {label} name {value:?}"),
                });
            }
        }

        Ok(Self::Hosted {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    /// The URL of the zip archive to download, `None` for local sources.
    pub fn archive_url(&self) -> Option<String> {
        match self {
            Self::Archive { url } => Some(url.clone()),
            Self::Hosted {
                owner,
                repo,
                branch,
            } => Some(format!(
                "https://github.com/{owner}/{repo}/archive/refs/heads/{branch}.zip"
            )),
            Self::Directory { .. } => None,
        }
    }

    /// Whether fetching this source goes over the network.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Directory { .. })
    }
}

fn is_valid_name(value: &str, allow_slash: bool) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.starts_with('/')
        && !value.ends_with('/')
        && !value.contains("..")
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') || (allow_slash && c == '/')
        })
}

fn parse_owner_repo(input: &str, owner_repo: &str) -> Result<SourceRef> {
    let (repo_part, branch) = match owner_repo.split_once('@') {
        Some((repo_part, branch)) => (repo_part, branch),
        None => (owner_repo, DEFAULT_BRANCH),
    };

    let repo_part = repo_part.trim_end_matches('/');
    let repo_part = repo_part.strip_suffix(".git").unwrap_or(repo_part);

    match repo_part.split_once('/') {
        Some((owner, repo)) if !repo.contains('/') => SourceRef::hosted(owner, repo, branch),
        _ => Err(Error::InvalidSource {
            input: input.to_string(),
            reason: "expected <owner>/<repo>".into(),
        }),
    }
}

impl FromStr for SourceRef {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if let Some(owner_repo) = trimmed.strip_prefix(GITHUB_PREFIX) {
            return parse_owner_repo(input, owner_repo);
        }

        if let Some(path) = trimmed.strip_prefix(FILE_PREFIX) {
            if path.is_empty() {
                return Err(Error::InvalidSource {
                    input: input.to_string(),
                    reason: "empty directory path".into(),
                });
            }
            return Ok(Self::Directory {
                path: PathBuf::from(path),
            });
        }

        for host in GITHUB_HOSTS {
            if let Some(rest) = trimmed.strip_prefix(host) {
                // Bare repository URLs map to the branch archive; anything
                // longer is already a direct download link.
                let rest = rest.trim_end_matches('/');
                let rest = rest.strip_suffix(".git").unwrap_or(rest);
                if rest.matches('/').count() == 1 {
                    return parse_owner_repo(input, rest);
                }
            }
        }

        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            return Ok(Self::Archive {
                url: trimmed.to_string(),
            });
        }

        Err(Error::InvalidSource {
            input: input.to_string(),
            reason: "expected github:<owner>/<repo>, an http(s) URL or file://<path>".into(),
        })
    }
}

impl TryFrom<String> for SourceRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SourceRef> for String {
    fn from(source: SourceRef) -> Self {
        source.to_string()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive { url } => f.write_str(url),
            Self::Hosted {
                owner,
                repo,
                branch,
            } => write!(f, "{GITHUB_PREFIX}{owner}/{repo}@{branch}"),
            Self::Directory { path } => write!(f, "{FILE_PREFIX}{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("github:king/launcher", "king", "launcher", "main")]
    #[case("github:king/launcher@dev", "king", "launcher", "dev")]
    #[case("github:king/launcher@release/1.2", "king", "launcher", "release/1.2")]
    #[case("https://github.com/king/launcher", "king", "launcher", "main")]
    #[case("https://github.com/king/launcher.git", "king", "launcher", "main")]
    #[case("https://github.com/king/launcher/", "king", "launcher", "main")]
    fn parses_hosted(
        #[case] input: &str,
        #[case] owner: &str,
        #[case] repo: &str,
        #[case] branch: &str,
    ) {
        let source: SourceRef = input.parse().unwrap();
        assert_eq!(source, SourceRef::hosted(owner, repo, branch).unwrap());
    }

    #[test]
    fn hosted_archive_url() {
        let source: SourceRef = "github:king/launcher-gts".parse().unwrap();
        assert_eq!(
            source.archive_url().unwrap(),
            "https://github.com/king/launcher-gts/archive/refs/heads/main.zip"
        );
    }

    #[test]
    fn direct_archive_url() {
        let url = "https://github.com/king/launcher/archive/refs/heads/main.zip";
        let source: SourceRef = url.parse().unwrap();
        assert_eq!(source, SourceRef::Archive { url: url.into() });
        assert_eq!(source.archive_url().unwrap(), url);
    }

    #[test]
    fn directory_source() {
        let source: SourceRef = "file:///srv/mirror".parse().unwrap();
        assert_eq!(
            source,
            SourceRef::Directory {
                path: PathBuf::from("/srv/mirror")
            }
        );
        assert!(source.archive_url().is_none());
        assert!(!source.is_remote());
    }

    #[rstest]
    #[case("")]
    #[case("ftp://example.com/tree.zip")]
    #[case("github:just-owner")]
    #[case("github:owner/repo/extra")]
    #[case("github:../repo")]
    #[case("github:owner/repo@../../x")]
    #[case("file://")]
    fn rejects_invalid(#[case] input: &str) {
        let err = input.parse::<SourceRef>().unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }), "got {err:?}");
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "github:king/launcher@dev",
            "https://example.com/tree.zip",
            "file:///srv/mirror",
        ] {
            let source: SourceRef = input.parse().unwrap();
            assert_eq!(source.to_string(), input);
            assert_eq!(source.to_string().parse::<SourceRef>().unwrap(), source);
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let source = SourceRef::hosted("king", "launcher", "main").unwrap();
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, "\"github:king/launcher@main\"");
        let back: SourceRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }
}
