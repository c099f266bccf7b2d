//! Versioned API facades.
//!
//! A facade is created per call for the authenticated caller, checks what
//! that caller may touch, and turns each item of a bulk request into a
//! state operation.

pub mod caasoperator;
pub mod upgradesteps;

pub use caasoperator::{CaasOperatorFacade, CaasOperatorState};
pub use upgradesteps::{
    UpgradeStepsApi, UpgradeStepsFacadeV1, UpgradeStepsFacadeV2, UpgradeStepsState,
    UpgradeStepsV1, UpgradeStepsV2,
};
