//! Method descriptors and the registry that owns them
//!
//! The registry is filled once at startup and then handed to the
//! [`CommandDispatcher`](crate::CommandDispatcher), which only reads it.

#![warn(missing_docs)]

use crate::context::ServiceContext;
use crate::dispatcher::DispatchError;
use crate::params::{ParamDescriptor, Preconditions, ValueType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Bound handler: raw argument list in, structured result out
pub type Handler =
    Box<dyn Fn(&ServiceContext<'_>, &[Value]) -> Result<Value, DispatchError> + Send + Sync>;

/// Registration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A method with this name already exists
    #[error("Method already registered: {0}")]
    DuplicateMethod(String),
}

/// A named operation with its schema, preconditions and handler
pub struct MethodDescriptor {
    name: &'static str,
    description: &'static str,
    params: Vec<ParamDescriptor>,
    returns: ValueType,
    preconditions: Preconditions,
    handler: Handler,
}

impl MethodDescriptor {
    /// Descriptor with no parameters, no preconditions, returning `bool`
    pub fn new<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&ServiceContext<'_>, &[Value]) -> Result<Value, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            description: "",
            params: Vec::new(),
            returns: ValueType::Bool,
            preconditions: Preconditions::empty(),
            handler: Box::new(handler),
        }
    }

    /// Set the help text
    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Set the declared return type
    pub fn returns(mut self, returns: ValueType) -> Self {
        self.returns = returns;
        self
    }

    /// Set the precondition mask
    pub fn requires(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = preconditions;
        self
    }

    /// Method name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared parameters in order
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Precondition mask
    pub fn preconditions(&self) -> Preconditions {
        self.preconditions
    }

    /// Declared return type
    pub fn return_type(&self) -> ValueType {
        self.returns
    }

    pub(crate) fn invoke(
        &self,
        ctx: &ServiceContext<'_>,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        (self.handler)(ctx, args)
    }

    /// One-line usage: `name <p1:type> [p2:type]`
    pub fn usage(&self) -> String {
        let mut usage = self.name.to_string();
        for param in &self.params {
            usage.push(' ');
            usage.push_str(&param.usage());
        }
        usage
    }

    /// Serializable view for help and discovery
    pub fn info(&self) -> MethodInfo {
        MethodInfo {
            name: self.name,
            description: self.description,
            params: self.params.clone(),
            returns: self.returns.as_str(),
            preconditions: self.preconditions,
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("preconditions", &self.preconditions)
            .finish_non_exhaustive()
    }
}

/// Descriptor table entry as exposed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// Method name
    pub name: &'static str,
    /// Help text
    pub description: &'static str,
    /// Declared parameters
    pub params: Vec<ParamDescriptor>,
    /// Return type tag
    pub returns: &'static str,
    /// Required caller state, as flag names
    pub preconditions: Preconditions,
}

/// Table of registered methods keyed by name
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<&'static str, MethodDescriptor>,
}

impl MethodRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `descriptor` under its name
    pub fn register(&mut self, descriptor: MethodDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name;
        if self.methods.contains_key(name) {
            return Err(RegistryError::DuplicateMethod(name.to_string()));
        }

        debug!(method = name, "Registered method");
        self.methods.insert(name, descriptor);
        Ok(())
    }

    /// Descriptor for `name`
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// True if `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Method names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Every descriptor as a serializable entry, sorted by name
    pub fn describe(&self) -> Vec<MethodInfo> {
        self.methods.values().map(MethodDescriptor::info).collect()
    }

    /// Usage line for `name`
    pub fn help(&self, name: &str) -> Option<String> {
        self.get(name).map(MethodDescriptor::usage)
    }
}
