//! Transactional state operations for the orrery control plane.
//!
//! Every change to the model goes through the same path: an [`Operation`]
//! reads what it needs and proposes a batch of conditional writes, the
//! [`TxnRunner`] submits it, and on conflict the operation is rebuilt from
//! fresh reads. A [`LeadershipGate`] can sit in between to tie the batch to
//! a leadership lease.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Facades (apiserver)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          State                              │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │ Operations  │ │ Leadership  │ │   Config split      │    │
//! │  │             │ │ Gate        │ │                     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! │                    TxnRunner (retry)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌───────────────────┐
//!                    │  DocumentStore    │
//!                    │ (memory/RocksDB)  │
//!                    └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use orrery_core::{ApplicationTag, Life};
//! use orrery_state::State;
//! use orrery_store::MemoryStore;
//!
//! let state = State::with_defaults(Arc::new(MemoryStore::new()), uuid::Uuid::new_v4());
//! let app = ApplicationTag::new("gitlab").unwrap();
//!
//! state.add_application(&app, None).unwrap();
//! state.set_pod_spec(&app, Some("containers: []".into()), None).unwrap();
//! assert_eq!(state.pod_spec(&app).unwrap().upgrade_counter, 0);
//!
//! state.set_application_life(&app, Life::Dying).unwrap();
//! assert!(state.set_pod_spec(&app, None, None).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod application;
pub mod config;
pub mod entity;
pub mod error;
pub mod keys;
pub mod leadership;
pub mod machine;
pub mod state;
pub mod txn;
pub mod unit;

pub use application::{
    AddApplicationOperation, PodSpec, SetApplicationLifeOperation, SetPodSpecOperation,
};
pub use config::{
    split_controller_config, split_model_config, ConfigSet, ControllerAttributes,
    SaveModelConfigOperation,
};
pub use entity::{Application, Charm, Entity, EntityFinder, Machine, StatusInfo, Unit};
pub use error::{Result, StateError};
pub use leadership::{
    CheckerToken, ClaimLeaseOperation, Lease, LeaseChecker, LeaseLeadershipChecker, LeaseToken,
    LeadershipChecker, LeadershipGate, RevokeLeaseOperation, Token,
};
pub use machine::{
    AddMachineOperation, ResetModificationStatusIdleOperation, SetMachineLifeOperation,
    SetMachineModificationStatusOperation,
};
pub use state::{State, StateConfig};
pub use txn::{Operation, RunnerConfig, TxnRunner};
pub use unit::{AddUnitOperation, SetUnitStateOperation};
