//! Caller identity and access checks.
//!
//! Every request carries `Authorization: Bearer <token>`. The
//! [`TokenRegistry`] maps tokens to the entity tag the caller acts as, and
//! the [`Caller`] extractor turns that into an [`Authorizer`] for the
//! facades.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use orrery_core::{Kind, Tag};
use orrery_store::DocumentStore;

use crate::config::ConfigError;
use crate::error::ApiError;
use crate::state::ServerState;

/// What the authenticated caller is.
pub trait Authorizer: Send + Sync {
    /// The tag the caller authenticated as.
    fn auth_tag(&self) -> &Tag;

    /// Returns true if the caller is a machine agent.
    fn auth_machine_agent(&self) -> bool {
        self.auth_tag().kind() == Kind::Machine
    }

    /// Returns true if the caller is a unit agent.
    fn auth_unit_agent(&self) -> bool {
        self.auth_tag().kind() == Kind::Unit
    }

    /// Returns true if the caller is an application agent.
    fn auth_application_agent(&self) -> bool {
        self.auth_tag().kind() == Kind::Application
    }

    /// Returns true if the caller is the controller.
    fn auth_controller(&self) -> bool {
        self.auth_tag().kind() == Kind::Controller
    }

    /// Returns true if the caller is `tag`.
    fn auth_owner(&self, tag: &Tag) -> bool {
        self.auth_tag() == tag
    }
}

/// An authorizer for a fixed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAuthorizer {
    tag: Tag,
}

impl AgentAuthorizer {
    /// Authorize as `tag`.
    #[must_use]
    pub const fn new(tag: Tag) -> Self {
        Self { tag }
    }
}

impl Authorizer for AgentAuthorizer {
    fn auth_tag(&self) -> &Tag {
        &self.tag
    }
}

/// Decides whether the caller may access an entity.
pub type AuthFunc = Box<dyn Fn(&Tag) -> bool + Send + Sync>;

/// Machine access for a machine agent or the controller.
///
/// The controller may access any machine. A machine agent may only access
/// its own machine.
#[must_use]
pub fn auth_func_for_machine_agent(authorizer: &dyn Authorizer) -> AuthFunc {
    if authorizer.auth_controller() {
        return Box::new(|tag| tag.kind() == Kind::Machine);
    }
    let own = authorizer.auth_tag().clone();
    Box::new(move |tag| tag.kind() == Kind::Machine && *tag == own)
}

/// Access to any entity of `kind`.
#[must_use]
pub fn auth_func_for_tag_kind(kind: Kind) -> AuthFunc {
    Box::new(move |tag| tag.kind() == kind)
}

/// Static bearer tokens and the tags they authenticate as.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, Tag>,
}

impl TokenRegistry {
    /// Parse `token=tag[,token=tag...]`. Whitespace around entries is
    /// ignored and empty entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an entry has no `=` or names an
    /// invalid tag.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut tokens = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, tag) = entry.split_once('=').ok_or_else(|| ConfigError::Invalid {
                name: "AGENT_TOKENS",
                reason: format!("entry {entry:?} is not token=tag"),
            })?;
            let tag = Tag::parse(tag.trim()).map_err(|err| ConfigError::Invalid {
                name: "AGENT_TOKENS",
                reason: err.to_string(),
            })?;
            tokens.insert(token.trim().to_string(), tag);
        }
        Ok(Self { tokens })
    }

    /// Register `token` for `tag`.
    pub fn insert(&mut self, token: impl Into<String>, tag: Tag) {
        self.tokens.insert(token.into(), tag);
    }

    /// The tag `token` authenticates as.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<&Tag> {
        self.tokens.get(token)
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Arc<AgentAuthorizer>);

impl Caller {
    /// The caller as a shareable authorizer.
    #[must_use]
    pub fn authorizer(&self) -> Arc<dyn Authorizer> {
        Arc::clone(&self.0) as Arc<dyn Authorizer>
    }
}

#[async_trait]
impl<S> FromRequestParts<Arc<ServerState<S>>> for Caller
where
    S: DocumentStore + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let tag = state.tokens.lookup(token).ok_or_else(|| {
            tracing::debug!("Rejected unknown agent token");
            ApiError::Unauthorized
        })?;

        Ok(Self(Arc::new(AgentAuthorizer::new(tag.clone()))))
    }
}
