//! Identity provider abstraction and the process-wide client handle.

use async_trait::async_trait;
use rstore_gateway_access::{IdentityError, OidcConfig};
use rstore_gateway_core::{TokenSet, UserInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::oidc::OidcClient;

/// Operations the gateway needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies an access token and returns the user it belongs to.
    ///
    /// Fails with [`IdentityError::Unauthorized`] if the provider rejects the token.
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdentityError>;

    /// Exchanges the refresh token in `current` for a new token set.
    ///
    /// Fails with [`IdentityError::RefreshFailed`] if the provider rejects the token
    /// or cannot be reached. Never retries.
    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, IdentityError>;

    /// Builds the redirect URL that starts the authorization-code flow.
    async fn authorization_url(&self) -> Result<AuthorizationRequest, IdentityError>;

    /// Completes the authorization-code flow.
    async fn exchange_code(&self, code: &str, state: &AuthState)
    -> Result<TokenSet, IdentityError>;

    /// Resource-owner password grant used by the form login.
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenSet, IdentityError>;
}

/// Constructs a provider client from configuration.
#[async_trait]
pub trait Connect: Sized + Send + Sync {
    async fn connect(config: &OidcConfig) -> Result<Self, IdentityError>;
}

/// Data needed to complete the login callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("csrf_token", &self.csrf_token)
            .field("pkce_verifier", &"[redacted]")
            .field("nonce", &"[redacted]")
            .finish()
    }
}

/// Redirect target plus the state to keep until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: AuthState,
}

/// Lazily connected, process-lifetime provider client.
///
/// The first call to [`IdentityHandle::client`] runs discovery. Concurrent
/// first calls wait on the same initialization. A failed initialization is
/// not stored, so the next call tries again.
pub struct IdentityHandle<C = OidcClient> {
    config: OidcConfig,
    client: OnceCell<C>,
}

impl<C: Connect> IdentityHandle<C> {
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Returns the connected client, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns the connection error; it is not cached.
    pub async fn client(&self) -> Result<&C, IdentityError> {
        self.client
            .get_or_try_init(|| async {
                info!(authority = %self.config.authority_url(), "connecting to identity provider");
                C::connect(&self.config).await.inspect_err(|e| {
                    warn!(error = %e, "identity provider initialization failed");
                })
            })
            .await
    }
}

#[async_trait]
impl<C> IdentityProvider for IdentityHandle<C>
where
    C: Connect + IdentityProvider,
{
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdentityError> {
        self.client().await?.userinfo(access_token).await
    }

    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, IdentityError> {
        self.client().await?.refresh(current).await
    }

    async fn authorization_url(&self) -> Result<AuthorizationRequest, IdentityError> {
        self.client().await?.authorization_url().await
    }

    async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<TokenSet, IdentityError> {
        self.client().await?.exchange_code(code, state).await
    }

    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenSet, IdentityError> {
        self.client().await?.password_grant(username, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> OidcConfig {
        OidcConfig::new(
            "http://idp.test".to_string(),
            "rstore-ui".to_string(),
            "secret".to_string(),
            "http://app.test/api/login/callback".to_string(),
        )
    }

    fn tokens() -> TokenSet {
        TokenSet::new("accessToken", "idToken", "refreshToken").expect("complete")
    }

    macro_rules! stub_provider {
        ($name:ident) => {
            #[async_trait]
            impl IdentityProvider for $name {
                async fn userinfo(&self, _access_token: &str) -> Result<UserInfo, IdentityError> {
                    Ok(UserInfo::new("user-1"))
                }

                async fn refresh(&self, _current: &TokenSet) -> Result<TokenSet, IdentityError> {
                    Ok(tokens())
                }

                async fn authorization_url(&self) -> Result<AuthorizationRequest, IdentityError> {
                    Err(IdentityError::Provider {
                        reason: "unused".to_string(),
                    })
                }

                async fn exchange_code(
                    &self,
                    _code: &str,
                    _state: &AuthState,
                ) -> Result<TokenSet, IdentityError> {
                    Ok(tokens())
                }

                async fn password_grant(
                    &self,
                    _username: &str,
                    _password: &str,
                ) -> Result<TokenSet, IdentityError> {
                    Ok(tokens())
                }
            }
        };
    }

    static SLOW_CONNECTS: AtomicUsize = AtomicUsize::new(0);

    struct SlowClient;

    #[async_trait]
    impl Connect for SlowClient {
        async fn connect(_config: &OidcConfig) -> Result<Self, IdentityError> {
            SLOW_CONNECTS.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(SlowClient)
        }
    }

    stub_provider!(SlowClient);

    static FLAKY_CONNECTS: AtomicUsize = AtomicUsize::new(0);

    struct FlakyClient;

    #[async_trait]
    impl Connect for FlakyClient {
        async fn connect(_config: &OidcConfig) -> Result<Self, IdentityError> {
            if FLAKY_CONNECTS.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(IdentityError::Provider {
                    reason: "discovery unavailable".to_string(),
                });
            }
            Ok(FlakyClient)
        }
    }

    stub_provider!(FlakyClient);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_construct_once() {
        let handle = Arc::new(IdentityHandle::<SlowClient>::new(config()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.userinfo("token").await })
            })
            .collect();

        for task in tasks {
            let user = task.await.expect("join").expect("userinfo");
            assert_eq!(user.sub, "user-1");
        }

        assert_eq!(SLOW_CONNECTS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialization_is_retried() {
        let handle = IdentityHandle::<FlakyClient>::new(config());

        let err = handle.client().await.err().expect("first connect fails");
        assert!(matches!(err, IdentityError::Provider { .. }));
        assert_eq!(FLAKY_CONNECTS.load(Ordering::SeqCst), 1);

        let refreshed = handle
            .refresh(&tokens())
            .await
            .expect("second connect succeeds");
        assert_eq!(refreshed, tokens());
        assert_eq!(FLAKY_CONNECTS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn auth_state_debug_hides_secrets() {
        let state = AuthState {
            csrf_token: "csrf".to_string(),
            pkce_verifier: "verifier-secret".to_string(),
            nonce: "nonce-secret".to_string(),
        };
        let debug = format!("{state:?}");
        assert!(!debug.contains("verifier-secret"));
        assert!(!debug.contains("nonce-secret"));
    }
}
