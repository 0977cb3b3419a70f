//! Caches one shallow clone per remote repository and hands out disposable
//! checkouts of individual commits from it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use regex::Regex;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::process::run;

const REPO_CACHE_ROOT: &str = "/tmp/gitops/repocache";

fn sha_re() -> &'static Regex {
    static SHA_RE: OnceLock<Regex> = OnceLock::new();
    SHA_RE.get_or_init(|| Regex::new(r"^[a-f0-9]{4,40}$").unwrap())
}

/// Per-process cache of one lock per remote URL, so the first clone of a
/// given repo is serialized while independent repos clone in parallel.
fn clone_locks() -> &'static DashMap<String, Arc<Mutex<()>>> {
    static CLONE_LOCKS: OnceLock<DashMap<String, Arc<Mutex<()>>>> = OnceLock::new();
    CLONE_LOCKS.get_or_init(DashMap::new)
}

/// A disposable checkout of one commit. The backing directory is removed
/// when this value is dropped.
pub struct Checkout {
    dir: TempDir,
}

impl Checkout {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Credentials used while cloning. Never logged: `url_with_credentials`
/// embeds the token directly into the clone URL (`https://TOKEN@host/...`)
/// and is only ever passed to the subprocess, never written to a log line.
#[derive(Clone, Default)]
pub struct RepoCacheConfig {
    pub github_oauth_token: Option<String>,
    pub git_crypt_key_file: Option<String>,
}

impl RepoCacheConfig {
    fn url_with_credentials(&self, url: &str) -> String {
        match (&self.github_oauth_token, url.strip_prefix("https://")) {
            (Some(token), Some(rest)) => format!("https://{token}@{rest}"),
            _ => url.to_string(),
        }
    }
}

fn cache_dir_for(url: &str) -> PathBuf {
    let basename = url
        .trim_end_matches(".git")
        .rsplit('/')
        .next()
        .unwrap_or("repo");
    Path::new(REPO_CACHE_ROOT).join(basename)
}

/// Check out `git_ref` of `url` into a fresh temp directory.
///
/// A 4-40 character lowercase hex string is treated as a commit SHA and
/// served from the long-lived cache (cloning it once, reusing it for every
/// later checkout). Anything else is treated as a branch name and always
/// gets a fresh shallow clone, bypassing the cache -- branches move, so
/// caching them would risk serving a stale tip.
pub async fn checkout(config: &RepoCacheConfig, url: &str, git_ref: &str) -> Result<Checkout> {
    if sha_re().is_match(git_ref) {
        checkout_from_cache(config, url, git_ref).await
    } else {
        checkout_branch(config, url, git_ref).await
    }
}

async fn checkout_from_cache(config: &RepoCacheConfig, url: &str, sha: &str) -> Result<Checkout> {
    let cache_dir = cache_dir_for(url);
    ensure_cloned(config, url, &cache_dir).await?;

    let dir = TempDir::new()?;
    run(&format!("cp -r {}/. {}", cache_dir.display(), dir.path().display()), false).await?;
    run(&format!("cd {} && git fetch --depth=100 origin {sha}", dir.path().display()), false).await?;
    run(&format!("cd {} && git checkout {sha}", dir.path().display()), false).await?;

    Ok(Checkout { dir })
}

async fn checkout_branch(config: &RepoCacheConfig, url: &str, branch: &str) -> Result<Checkout> {
    let dir = TempDir::new()?;
    let auth_url = config.url_with_credentials(url);
    run(
        &format!(
            "git clone --depth=1 --branch {branch} {} {}",
            auth_url,
            dir.path().display()
        ),
        false,
    )
    .await?;
    decrypt_if_configured(config, dir.path()).await?;
    Ok(Checkout { dir })
}

async fn ensure_cloned(config: &RepoCacheConfig, url: &str, cache_dir: &Path) -> Result<()> {
    let lock = clone_locks()
        .entry(url.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    if cache_dir.is_dir() {
        return Ok(());
    }

    info!(url, "cloning repository into cache for the first time");
    if let Some(parent) = cache_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let auth_url = config.url_with_credentials(url);
    run(
        &format!("git clone --depth=100 {} {}", auth_url, cache_dir.display()),
        false,
    )
    .await?;
    decrypt_if_configured(config, cache_dir).await?;
    Ok(())
}

async fn decrypt_if_configured(config: &RepoCacheConfig, dir: &Path) -> Result<()> {
    let Some(keyfile) = &config.git_crypt_key_file else {
        return Ok(());
    };
    debug!(dir = %dir.display(), "unlocking git-crypt repository");
    run(&format!("cd {} && git-crypt unlock {keyfile}", dir.display()), false).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_regex_accepts_hex_and_rejects_branch_names() {
        assert!(sha_re().is_match("deadbeef"));
        assert!(sha_re().is_match("9f03ac80f3"));
        assert!(!sha_re().is_match("master"));
        assert!(!sha_re().is_match("release/1.0"));
    }

    #[test]
    fn cache_dir_strips_dot_git_suffix() {
        let dir = cache_dir_for("https://github.com/uptick/workforce.git");
        assert_eq!(dir.file_name().unwrap(), "workforce");
    }

    #[test]
    fn credentials_are_injected_only_for_https_urls() {
        let config = RepoCacheConfig {
            github_oauth_token: Some("ghp_secret".to_string()),
            git_crypt_key_file: None,
        };
        assert_eq!(
            config.url_with_credentials("https://github.com/uptick/workforce"),
            "https://ghp_secret@github.com/uptick/workforce"
        );
        assert_eq!(
            config.url_with_credentials("git@github.com:uptick/workforce.git"),
            "git@github.com:uptick/workforce.git"
        );
    }
}
