//! Command dispatcher
//!
//! Resolves a method by name, checks the caller against the method's
//! preconditions, validates arguments against its parameter list and only
//! then runs the handler. Rejections happen before any handler side effect.

#![warn(missing_docs)]

use crate::context::{ServiceContext, Session};
use crate::params::{validate_arguments, Preconditions};
use crate::registry::MethodRegistry;
use crate::wallet::{BroadcastError, WalletError};
use namechain_name_index::IndexError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Unmet precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionFailure {
    /// Caller is not authenticated
    #[error("authentication required")]
    AuthenticationRequired,
    /// Wallet is not open
    #[error("wallet not open")]
    WalletNotOpen,
    /// Wallet is locked
    #[error("wallet locked")]
    WalletLocked,
}

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No method with this name
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Caller or wallet state does not satisfy the method
    #[error("{method} rejected: {failure}")]
    Precondition {
        /// Method name
        method: String,
        /// First unmet precondition
        failure: PreconditionFailure,
    },

    /// Arguments do not match the parameter list
    #[error("Invalid parameters for {method}: {reason}")]
    InvalidParameters {
        /// Method name
        method: String,
        /// What did not match
        reason: String,
    },

    /// Name has no entry
    #[error("Name not found: {name}")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// Wallet refused the operation
    #[error("{operation} failed: {source}")]
    Wallet {
        /// Failing operation
        operation: &'static str,
        /// Underlying error
        #[source]
        source: WalletError,
    },

    /// Network client refused the transaction
    #[error("{operation} broadcast failed: {source}")]
    Broadcast {
        /// Failing operation
        operation: &'static str,
        /// Underlying error
        #[source]
        source: BroadcastError,
    },

    /// Name index failure
    #[error("{operation} failed: {source}")]
    Index {
        /// Failing operation
        operation: &'static str,
        /// Underlying error
        #[source]
        source: IndexError,
    },

    /// Result could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownMethod(_) => "unknown_method",
            DispatchError::Precondition { failure, .. } => match failure {
                PreconditionFailure::AuthenticationRequired => "authentication_required",
                PreconditionFailure::WalletNotOpen => "wallet_not_open",
                PreconditionFailure::WalletLocked => "wallet_locked",
            },
            DispatchError::InvalidParameters { .. } => "invalid_parameters",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::Wallet { .. } => "wallet_error",
            DispatchError::Broadcast { .. } => "broadcast_error",
            DispatchError::Index { .. } => "index_error",
            DispatchError::Serialization(_) => "serialization_error",
        }
    }

    /// True if the request never reached its handler
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownMethod(_)
                | DispatchError::Precondition { .. }
                | DispatchError::InvalidParameters { .. }
        )
    }

    /// Unmet precondition, if that is why the request was rejected
    pub fn precondition(&self) -> Option<PreconditionFailure> {
        match self {
            DispatchError::Precondition { failure, .. } => Some(*failure),
            _ => None,
        }
    }

    /// Wrap a wallet error, lifting missing names into `NotFound`
    pub fn wallet(operation: &'static str, name: &str, source: WalletError) -> Self {
        match source {
            WalletError::NameNotFound { .. } => DispatchError::NotFound {
                name: name.to_string(),
            },
            WalletError::Index(e) if e.is_not_found() => DispatchError::NotFound {
                name: name.to_string(),
            },
            source => DispatchError::Wallet { operation, source },
        }
    }

    /// Wrap an index error, lifting missing names into `NotFound`
    pub fn index(operation: &'static str, name: &str, source: IndexError) -> Self {
        if source.is_not_found() {
            DispatchError::NotFound {
                name: name.to_string(),
            }
        } else {
            DispatchError::Index { operation, source }
        }
    }
}

/// Structured error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind, see [`DispatchError::kind`]
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl From<&DispatchError> for ErrorResponse {
    fn from(err: &DispatchError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted from the transport
    Received,
    /// Method resolved and preconditions satisfied
    PreconditionChecked,
    /// Handler invoked
    Dispatched,
    /// Handler returned a result
    Completed,
    /// Unknown method, unmet precondition or bad arguments
    Rejected,
    /// Handler returned an error
    Failed,
}

impl RequestState {
    /// True for states a request never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Rejected | RequestState::Failed
        )
    }
}

/// Dispatch counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchMetrics {
    /// Requests received
    pub requests_total: u64,
    /// Requests whose handler returned a result
    pub completed_total: u64,
    /// Requests rejected before reaching a handler
    pub rejected_total: u64,
    /// Requests whose handler returned an error
    pub failed_total: u64,
}

/// Routes named requests to registered handlers
#[derive(Debug)]
pub struct CommandDispatcher {
    registry: MethodRegistry,
    metrics: Mutex<DispatchMetrics>,
}

impl CommandDispatcher {
    /// Dispatcher over a fully built registry
    pub fn new(registry: MethodRegistry) -> Self {
        info!(methods = registry.len(), "Command dispatcher ready");
        Self {
            registry,
            metrics: Mutex::new(DispatchMetrics::default()),
        }
    }

    /// The method table
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn record(&self, state: RequestState) {
        if let Ok(mut metrics) = self.metrics.lock() {
            match state {
                RequestState::Received => metrics.requests_total += 1,
                RequestState::Completed => metrics.completed_total += 1,
                RequestState::Rejected => metrics.rejected_total += 1,
                RequestState::Failed => metrics.failed_total += 1,
                RequestState::PreconditionChecked | RequestState::Dispatched => {}
            }
        }
    }

    fn transition(&self, method: &str, state: RequestState) {
        debug!(method, ?state, "Request state");
        self.record(state);
    }

    /// Check `session` and wallet state against `required`, in the order
    /// authentication, wallet open, wallet unlocked.
    fn check_preconditions(
        required: Preconditions,
        session: &Session,
        ctx: &ServiceContext<'_>,
    ) -> Result<(), PreconditionFailure> {
        if required.contains(Preconditions::AUTHENTICATED) && !session.authenticated {
            return Err(PreconditionFailure::AuthenticationRequired);
        }
        if required.contains(Preconditions::WALLET_OPEN) && !ctx.wallet.is_open() {
            return Err(PreconditionFailure::WalletNotOpen);
        }
        if required.contains(Preconditions::WALLET_UNLOCKED) && !ctx.wallet.is_unlocked() {
            return Err(PreconditionFailure::WalletLocked);
        }
        Ok(())
    }

    /// Run `method` with `args` on behalf of `session`
    ///
    /// # Returns
    /// The handler's result unchanged, or the first reason the request was
    /// rejected or failed.
    pub fn dispatch(
        &self,
        session: &Session,
        ctx: &ServiceContext<'_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        self.transition(method, RequestState::Received);

        let result = self.run(session, ctx, method, args);

        match &result {
            Ok(_) => self.transition(method, RequestState::Completed),
            Err(e) if e.is_rejection() => {
                warn!(method, kind = e.kind(), error = %e, "Request rejected");
                self.transition(method, RequestState::Rejected);
            }
            Err(e) => {
                warn!(method, kind = e.kind(), error = %e, "Request failed");
                self.transition(method, RequestState::Failed);
            }
        }

        result
    }

    fn run(
        &self,
        session: &Session,
        ctx: &ServiceContext<'_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let descriptor = self
            .registry
            .get(method)
            .ok_or_else(|| DispatchError::UnknownMethod(method.to_string()))?;

        Self::check_preconditions(descriptor.preconditions(), session, ctx).map_err(
            |failure| DispatchError::Precondition {
                method: method.to_string(),
                failure,
            },
        )?;
        self.transition(method, RequestState::PreconditionChecked);

        validate_arguments(descriptor.params(), args).map_err(|reason| {
            DispatchError::InvalidParameters {
                method: method.to_string(),
                reason,
            }
        })?;

        self.transition(method, RequestState::Dispatched);
        descriptor.invoke(ctx, args)
    }
}
