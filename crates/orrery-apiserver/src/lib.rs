//! HTTP facades for the orrery control plane.
//!
//! This crate exposes the agent-facing API over the state layer. It handles:
//!
//! - Bearer-token authentication of machine, unit and application agents
//! - Versioned facades with per-version capability sets
//! - Per-item error results for bulk calls
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Agents                             │
//! │                     (HTTP + bearer)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     orrery-apiserver                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Caller    │ │   Router    │ │  Facades v1 / v2    │    │
//! │  │  Extractor  │ │  + Handlers │ │  (shared core)      │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌───────────────────┐
//!                    │   orrery-state    │
//!                    └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use orrery_apiserver::{create_router, ServerConfig, ServerState, TokenRegistry};
//! use orrery_state::{LeaseLeadershipChecker, State};
//! use orrery_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/orrery")?);
//! let state = Arc::new(State::with_defaults(store, uuid::Uuid::new_v4()));
//!
//! let tokens = TokenRegistry::parse("secret=machine-0")?;
//! let server = ServerState::new(
//!     state,
//!     Arc::new(LeaseLeadershipChecker),
//!     tokens,
//!     ServerConfig::default(),
//! );
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:17070").await?;
//! axum::serve(listener, create_router(server)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod facades;
pub mod handlers;
pub mod params;
pub mod routes;
pub mod state;

pub use auth::{AgentAuthorizer, Authorizer, Caller, TokenRegistry};
pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ServerError};
pub use routes::create_router;
pub use state::ServerState;
