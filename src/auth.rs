//! Credential resolution (spec §4.I, §6 "Environment variables").
//!
//! The [`Authenticator`] holds only the *names* of two environment
//! variables, never the resolved value — re-resolution happens on every
//! [`Authenticator::resolve`] call so that rotating the underlying secret
//! between sessions (e.g. a sidecar rewriting the env file) takes effect on
//! the next reconnect without restarting the process.

use std::env;

/// Default names used when a sinker isn't configured with explicit envvar
/// names (spec §6).
pub const DEFAULT_API_TOKEN_ENVVAR: &str = "SUBSTREAMS_API_TOKEN";
pub const DEFAULT_API_KEY_ENVVAR: &str = "SUBSTREAMS_API_KEY";
/// Legacy alias for the token envvar, accepted but deprecated (spec §6).
pub const LEGACY_API_TOKEN_ENVVAR: &str = "SF_API_TOKEN";

/// Which kind of credential was resolved; drives the gRPC metadata header
/// name the transport attaches to each request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    /// Carried in an `x-api-key` header.
    ApiKey,
    /// Carried as `authorization: Bearer <token>`.
    Jwt,
    /// No credential configured; requests go out unauthenticated.
    None,
}

#[derive(Clone, Debug)]
pub struct Credential {
    pub value: String,
    pub kind: CredentialKind,
}

/// Resolves a `(token, kind)` pair from two configured environment variable
/// *names* at each session start. The API key envvar wins over the token
/// envvar when both are present (spec §4.I).
#[derive(Clone, Debug)]
pub struct Authenticator {
    api_key_envvar: String,
    api_token_envvar: String,
}

impl Authenticator {
    pub fn new(api_key_envvar: impl Into<String>, api_token_envvar: impl Into<String>) -> Self {
        Authenticator {
            api_key_envvar: api_key_envvar.into(),
            api_token_envvar: api_token_envvar.into(),
        }
    }

    pub fn default_names() -> Self {
        Authenticator::new(DEFAULT_API_KEY_ENVVAR, DEFAULT_API_TOKEN_ENVVAR)
    }

    /// Re-reads both environment variables and returns the winning
    /// credential. Called at each `Sinker::Run` / session start, not cached.
    pub fn resolve(&self) -> Credential {
        if let Ok(key) = env::var(&self.api_key_envvar) {
            if !key.is_empty() {
                return Credential { value: key, kind: CredentialKind::ApiKey };
            }
        }

        if let Ok(token) = env::var(&self.api_token_envvar) {
            if !token.is_empty() {
                return Credential { value: token, kind: CredentialKind::Jwt };
            }
        }

        if let Ok(token) = env::var(LEGACY_API_TOKEN_ENVVAR) {
            if !token.is_empty() {
                tracing::warn!(
                    envvar = LEGACY_API_TOKEN_ENVVAR,
                    "using deprecated environment variable for API token, prefer SUBSTREAMS_API_TOKEN"
                );
                return Credential { value: token, kind: CredentialKind::Jwt };
            }
        }

        Credential { value: String::new(), kind: CredentialKind::None }
    }
}

impl CredentialKind {
    /// The gRPC metadata header name carrying the credential.
    pub fn header_name(&self) -> Option<&'static str> {
        match self {
            CredentialKind::ApiKey => Some("x-api-key"),
            CredentialKind::Jwt => Some("authorization"),
            CredentialKind::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var mutates global process state; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn api_key_wins_over_token() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TEST_AUTH_KEY", "key-value");
        std::env::set_var("TEST_AUTH_TOKEN", "token-value");

        let auth = Authenticator::new("TEST_AUTH_KEY", "TEST_AUTH_TOKEN");
        let cred = auth.resolve();
        assert_eq!(cred.kind, CredentialKind::ApiKey);
        assert_eq!(cred.value, "key-value");

        std::env::remove_var("TEST_AUTH_KEY");
        std::env::remove_var("TEST_AUTH_TOKEN");
    }

    #[test]
    fn falls_back_to_token_then_none() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("TEST_AUTH_KEY2");
        std::env::remove_var("TEST_AUTH_TOKEN2");

        let auth = Authenticator::new("TEST_AUTH_KEY2", "TEST_AUTH_TOKEN2");
        assert_eq!(auth.resolve().kind, CredentialKind::None);

        std::env::set_var("TEST_AUTH_TOKEN2", "tok");
        assert_eq!(auth.resolve().kind, CredentialKind::Jwt);
        std::env::remove_var("TEST_AUTH_TOKEN2");
    }

    #[test]
    fn header_names_match_kind() {
        assert_eq!(CredentialKind::ApiKey.header_name(), Some("x-api-key"));
        assert_eq!(CredentialKind::Jwt.header_name(), Some("authorization"));
        assert_eq!(CredentialKind::None.header_name(), None);
    }
}
