//! Server application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use orrery_state::{LeadershipChecker, State};
use orrery_store::DocumentStore;

use crate::auth::TokenRegistry;
use crate::config::ServerConfig;

/// Shared application state for the API server.
pub struct ServerState<S: DocumentStore> {
    /// The model state.
    pub state: Arc<State<S>>,
    /// Hands out leadership tokens for unit callers.
    pub leadership: Arc<dyn LeadershipChecker>,
    /// Agent credentials.
    pub tokens: Arc<TokenRegistry>,
    /// Server configuration.
    pub config: ServerConfig,
}

impl<S: DocumentStore> ServerState<S> {
    /// Create a new server state.
    #[must_use]
    pub fn new(
        state: Arc<State<S>>,
        leadership: Arc<dyn LeadershipChecker>,
        tokens: TokenRegistry,
        config: ServerConfig,
    ) -> Self {
        Self {
            state,
            leadership,
            tokens: Arc::new(tokens),
            config,
        }
    }
}

impl<S: DocumentStore> Clone for ServerState<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            leadership: Arc::clone(&self.leadership),
            tokens: Arc::clone(&self.tokens),
            config: self.config.clone(),
        }
    }
}
