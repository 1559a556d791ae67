//! Name service command routing for namechain
//!
//! This crate provides the self-describing method table the RPC transport
//! exposes. It handles:
//! - Method descriptors with parameter schemas and return types
//! - Precondition flags (authenticated caller, wallet open, wallet unlocked)
//! - Dispatch with precondition and argument checks ahead of the handler
//! - The six name service methods
//!
//! # Architecture
//!
//! Requests flow through the following pipeline:
//! 1. Transport decodes the method name and a JSON argument list
//! 2. `CommandDispatcher` resolves the `MethodDescriptor`
//! 3. Preconditions are checked against the `Session` and the wallet
//! 4. Arguments are checked against the parameter list
//! 5. The handler runs with a `ServiceContext` of injected collaborators
//!
//! # Examples
//!
//! ```no_run
//! use namechain_rpc::{name_service_registry, CommandDispatcher, ServiceContext, Session};
//! # fn run(ctx: ServiceContext<'_>) -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = CommandDispatcher::new(name_service_registry()?);
//! let record = dispatcher.dispatch(
//!     &Session::authenticated(),
//!     &ctx,
//!     "lookup_domain_record",
//!     &[serde_json::json!("example")],
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod dispatcher;
pub mod handlers;
pub mod params;
pub mod registry;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use context::{ServiceContext, Session};
pub use dispatcher::{
    CommandDispatcher, DispatchError, DispatchMetrics, ErrorResponse, PreconditionFailure,
    RequestState,
};
pub use handlers::name_service_registry;
pub use params::{ParamDescriptor, Preconditions, ValueType};
pub use registry::{Handler, MethodDescriptor, MethodInfo, MethodRegistry, RegistryError};
pub use wallet::{BroadcastError, NameWallet, TransactionBroadcaster, WalletError};
