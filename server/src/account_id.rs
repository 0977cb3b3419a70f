//! Process-wide, lazily-initialized cloud account id.
//!
//! Read once, from whichever source resolves first: the `ACCOUNT_ID`
//! environment variable, falling back to a pluggable cloud identity call for
//! deployments that don't set it explicitly.

use async_trait::async_trait;
use tokio::sync::OnceCell;

static ACCOUNT_ID: OnceCell<String> = OnceCell::const_new();

/// Resolves the account id when it isn't available as an environment
/// variable. The real implementation (an IAM/STS call) is out of scope here;
/// tests and most deployments just set `ACCOUNT_ID`.
#[async_trait]
pub trait AccountIdResolver: Send + Sync {
    async fn resolve(&self) -> String;
}

/// Resolver that always returns an empty string, used when no cloud identity
/// call is configured.
pub struct NoopResolver;

#[async_trait]
impl AccountIdResolver for NoopResolver {
    async fn resolve(&self) -> String {
        String::new()
    }
}

/// Get the cached account id, resolving and caching it on first use.
pub async fn get(env_value: &str, resolver: &dyn AccountIdResolver) -> String {
    ACCOUNT_ID
        .get_or_init(|| async {
            if !env_value.is_empty() {
                env_value.to_string()
            } else {
                resolver.resolve().await
            }
        })
        .await
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(&'static str);

    #[async_trait]
    impl AccountIdResolver for FixedResolver {
        async fn resolve(&self) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn env_value_wins_when_present() {
        let id = get("111122223333", &FixedResolver("999900001111")).await;
        assert_eq!(id, "111122223333");
    }
}
