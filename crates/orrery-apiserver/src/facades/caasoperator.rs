//! The CAAS operator facade.
//!
//! Application and unit agents set the pod spec of their own application.
//! A unit must also be the application's leader: its write is gated on a
//! leadership token so it only lands while the lease is held.

use std::sync::Arc;

use orrery_core::{ApplicationTag, Tag};
use orrery_state::{LeadershipChecker, Result as StateResult, State, Token};
use orrery_store::DocumentStore;

use crate::auth::Authorizer;
use crate::error::{ApiError, ServerError};
use crate::params::{ErrorResult, ErrorResults, PodSpecArg, SetPodSpecArgs};

/// State access needed by the CAAS operator facade.
pub trait CaasOperatorState: Send + Sync {
    /// Set an application's pod spec, gated on `token` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the application cannot take a pod spec or the
    /// token is no longer valid.
    fn set_pod_spec(
        &self,
        tag: &ApplicationTag,
        spec: Option<String>,
        token: Option<Arc<dyn Token>>,
    ) -> StateResult<()>;
}

impl<S: DocumentStore> CaasOperatorState for State<S> {
    fn set_pod_spec(
        &self,
        tag: &ApplicationTag,
        spec: Option<String>,
        token: Option<Arc<dyn Token>>,
    ) -> StateResult<()> {
        Self::set_pod_spec(self, tag, spec, token)
    }
}

/// Pod spec management for application operators.
pub struct CaasOperatorFacade {
    state: Arc<dyn CaasOperatorState>,
    authorizer: Arc<dyn Authorizer>,
    leadership: Arc<dyn LeadershipChecker>,
}

impl CaasOperatorFacade {
    /// Create the facade for `authorizer`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Permission` unless the caller is an application
    /// or unit agent.
    pub fn new(
        state: Arc<dyn CaasOperatorState>,
        authorizer: Arc<dyn Authorizer>,
        leadership: Arc<dyn LeadershipChecker>,
    ) -> Result<Self, ApiError> {
        if !authorizer.auth_application_agent() && !authorizer.auth_unit_agent() {
            return Err(ApiError::Permission);
        }
        Ok(Self {
            state,
            authorizer,
            leadership,
        })
    }

    /// Set the pod spec for each listed application.
    ///
    /// Every item gets its own result; a failing item does not stop the
    /// others.
    #[must_use]
    pub fn set_pod_spec(&self, args: SetPodSpecArgs) -> ErrorResults {
        let mut results = ErrorResults::with_len(args.specs.len());
        for (slot, arg) in results.results.iter_mut().zip(args.specs) {
            *slot = ErrorResult::from_outcome(self.set_one(arg));
        }
        results
    }

    fn caller_application(&self) -> Option<ApplicationTag> {
        match self.authorizer.auth_tag() {
            Tag::Application(app) => Some(app.clone()),
            Tag::Unit(unit) => Some(unit.application()),
            _ => None,
        }
    }

    fn set_one(&self, arg: PodSpecArg) -> Result<(), ServerError> {
        let tag: ApplicationTag = arg.tag.parse()?;
        if self.caller_application().as_ref() != Some(&tag) {
            return Err(ApiError::Permission.into());
        }

        let token = match self.authorizer.auth_tag() {
            Tag::Unit(unit) => Some(self.leadership.leadership_check(tag.id(), unit.id())),
            _ => None,
        };

        tracing::info!(
            application = %tag.id(),
            caller = %self.authorizer.auth_tag(),
            "Setting pod spec"
        );
        self.state.set_pod_spec(&tag, arg.spec, token)?;
        Ok(())
    }
}
