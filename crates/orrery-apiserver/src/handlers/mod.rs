//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the facade API.

pub mod caasoperator;
pub mod health;
pub mod upgradesteps;
