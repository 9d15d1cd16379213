//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreErrorResponseType, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, HttpClientError, IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, StandardErrorResponse, TokenResponse,
};
use reqwest::StatusCode;
use rstore_gateway_access::{IdentityError, OidcConfig};
use rstore_gateway_core::{TokenSet, UserInfo};
use std::fmt;
use tracing::{debug, instrument, warn};

use super::identity::{AuthState, AuthorizationRequest, Connect, IdentityProvider};

type ConfiguredClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

type TokenRequestError = RequestTokenError<
    HttpClientError<reqwest::Error>,
    StandardErrorResponse<CoreErrorResponseType>,
>;

/// Client for the configured OIDC provider.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: OidcConfig,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid settings and `Provider` when
    /// discovery fails.
    #[instrument(skip_all, fields(authority = %config.authority_url()))]
    pub async fn discover(config: OidcConfig) -> Result<Self, IdentityError> {
        config.validate()?;

        let issuer_url = IssuerUrl::new(config.authority_url().to_string())
            .map_err(|e| configuration(format!("invalid authority URL: {e}")))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| configuration(format!("invalid redirect URI: {e}")))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| configuration(format!("failed to create HTTP client: {e}")))?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| IdentityError::Provider {
                reason: format!("failed to discover provider: {e}"),
            })?;

        debug!(
            has_userinfo = provider_metadata.userinfo_endpoint().is_some(),
            "provider discovered"
        );

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            http_client,
            config,
        })
    }

    fn client(&self) -> ConfiguredClient {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = self.client();
        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        // The authorization-code flow always sends openid.
        for scope in self.config.scopes().into_iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            state: AuthState {
                csrf_token: csrf_token.secret().clone(),
                pkce_verifier: pkce_verifier.secret().clone(),
                nonce: nonce.secret().clone(),
            },
        }
    }
}

#[async_trait]
impl Connect for OidcClient {
    async fn connect(config: &OidcConfig) -> Result<Self, IdentityError> {
        Self::discover(config.clone()).await
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    #[instrument(skip_all)]
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdentityError> {
        let endpoint = self
            .provider_metadata
            .userinfo_endpoint()
            .ok_or_else(|| configuration("provider has no userinfo endpoint"))?;

        let response = self
            .http_client
            .get(endpoint.url().as_str())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                debug!("access token rejected by userinfo endpoint");
                Err(IdentityError::Unauthorized)
            }
            status if status.is_success() => {
                response.json::<UserInfo>().await.map_err(|e| IdentityError::Provider {
                    reason: format!("invalid userinfo response: {e}"),
                })
            }
            status => Err(IdentityError::Provider {
                reason: format!("userinfo endpoint returned {status}"),
            }),
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, IdentityError> {
        let client = self.client();
        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(current.refresh_token().to_string()))
            .map_err(|e| configuration(format!("token endpoint error: {e}")))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    warn!(error = %response, "refresh token rejected");
                    refresh_failed(response.to_string())
                }
                other => refresh_failed(token_request_error(other)),
            })?;

        // Providers may omit tokens that did not rotate.
        let id_token = raw_id_token(&token_response)?
            .unwrap_or_else(|| current.id_token().to_string());
        let refresh_token = token_response
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| current.refresh_token().to_string());

        TokenSet::new(
            token_response.access_token().secret().clone(),
            id_token,
            refresh_token,
        )
        .map_err(refresh_failed)
    }

    async fn authorization_url(&self) -> Result<AuthorizationRequest, IdentityError> {
        Ok(self.authorization_request())
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<TokenSet, IdentityError> {
        let client = self.client();
        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| configuration(format!("token endpoint error: {e}")))?
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => IdentityError::CallbackFailed {
                    reason: format!("code exchange rejected: {response}"),
                },
                other => token_request_error(other),
            })?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| callback_failed("no ID token in response"))?;

        let nonce = Nonce::new(state.nonce.clone());
        let claims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| callback_failed(format!("ID token validation failed: {e}")))?;
        debug!(subject = %claims.subject().as_str(), "authorization code exchanged");

        let raw = raw_id_token(&token_response)?
            .ok_or_else(|| callback_failed("no ID token in response"))?;
        let refresh_token = token_response
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_default();

        TokenSet::new(
            token_response.access_token().secret().clone(),
            raw,
            refresh_token,
        )
        .map_err(|e| callback_failed(e.to_string()))
    }

    #[instrument(skip_all)]
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenSet, IdentityError> {
        let username = ResourceOwnerUsername::new(username.to_string());
        let password = ResourceOwnerPassword::new(password.to_string());

        let client = self.client();
        let token_response = client
            .exchange_password(&username, &password)
            .map_err(|e| configuration(format!("token endpoint error: {e}")))?
            .add_scope(Scope::new("openid".to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    debug!(error = %response, "credentials rejected");
                    IdentityError::Unauthorized
                }
                other => token_request_error(other),
            })?;

        let id_token = raw_id_token(&token_response)?.unwrap_or_default();
        let refresh_token = token_response
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_default();

        Ok(TokenSet::new(
            token_response.access_token().secret().clone(),
            id_token,
            refresh_token,
        )?)
    }
}

/// Reads the compact ID token string from a token response.
fn raw_id_token<TR>(token_response: &TR) -> Result<Option<String>, IdentityError>
where
    TR: serde::Serialize,
{
    let response_json = serde_json::to_value(token_response).map_err(|e| IdentityError::Provider {
        reason: format!("failed to serialize token response: {e}"),
    })?;

    Ok(response_json
        .get("id_token")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

fn configuration(reason: impl Into<String>) -> IdentityError {
    IdentityError::Configuration {
        reason: reason.into(),
    }
}

fn refresh_failed(reason: impl fmt::Display) -> IdentityError {
    IdentityError::RefreshFailed {
        reason: reason.to_string(),
    }
}

fn callback_failed(reason: impl Into<String>) -> IdentityError {
    IdentityError::CallbackFailed {
        reason: reason.into(),
    }
}

fn transport_error(e: reqwest::Error) -> IdentityError {
    if e.is_timeout() {
        warn!("identity provider request timed out");
    }
    IdentityError::Provider {
        reason: e.to_string(),
    }
}

fn token_request_error(e: TokenRequestError) -> IdentityError {
    warn!(error = %e, "token endpoint request failed");
    IdentityError::Provider {
        reason: e.to_string(),
    }
}
