//! Shared auth state handed to handlers through an axum extension.

use super::engine::AuthEngine;

pub const DEFAULT_COOKIE_PATH: &str = "/api/v1/auth";

/// Boundary configuration that is not owned by the engine or the signer.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    cookie_path: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: String) -> Self {
        self.cookie_path = path;
        self
    }

    #[must_use]
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthState {
    engine: AuthEngine,
    config: AuthConfig,
}

impl AuthState {
    pub fn new(engine: AuthEngine, config: AuthConfig) -> Self {
        Self { engine, config }
    }

    #[must_use]
    pub fn engine(&self) -> &AuthEngine {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_path_default_and_override() {
        let config = AuthConfig::new();
        assert_eq!(config.cookie_path(), "/api/v1/auth");

        let config = config.with_cookie_path("/auth".to_string());
        assert_eq!(config.cookie_path(), "/auth");
    }
}
