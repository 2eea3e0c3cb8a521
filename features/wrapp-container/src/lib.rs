//! Wrapp Container builds object graphs from a registry of bindings.
//!
//! It is split into two layers:
//! 1. Container: registers bindings and resolves tokens into instances, handling
//!    scopes and reference cycles
//! 2. Modules: units of bindings with an explicit import/export contract, loaded
//!    into a shared container by the ModuleRegistry
//!
//! # Examples
//!
//! ```rust
//! use wrapp_container::{Container, LazyRef, Token};
//!
//! struct ServiceA {
//!     b: LazyRef<ServiceB>,
//! }
//! struct ServiceB {
//!     a: LazyRef<ServiceA>,
//! }
//! impl ServiceA {
//!     fn value(&self) -> &'static str {
//!         "A"
//!     }
//! }
//!
//! let container = Container::new();
//! let a = Token::<ServiceA>::named("ServiceA");
//! let b = Token::<ServiceB>::named("ServiceB");
//!
//! let b_dep = b.clone();
//! container.register(&a, move |r| Ok(ServiceA { b: r.build_deps(&b_dep)? })).unwrap();
//! let a_dep = a.clone();
//! container.register(&b, move |r| Ok(ServiceB { a: r.build_deps(&a_dep)? })).unwrap();
//!
//! // ServiceB received a forward reference which is filled once ServiceA is built
//! let service_a = container.resolve(&a).unwrap();
//! assert_eq!(service_a.b.a.value(), "A");
//! ```
//!
//! Wrapp Container consists of the following components:
//!
//! 1. Token & Binding - naming and describing constructible things
//! 2. Container & Resolver - resolution, scopes and cycle handling
//! 3. Validator - static check that singletons never capture scoped instances
//! 4. Module, ModuleRegistry & ModuleView - modules, their load order and encapsulation
//! 5. Controller - route metadata and dispatch for transport adapters

pub mod binding;
pub mod container;
pub mod controller;
pub mod encapsulation;
pub mod errors;
pub mod lazy;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod token;
pub mod types;

mod context;
mod validator;

pub use binding::{Binding, BindingHandle, Provider, Scope};
pub use container::Container;
pub use controller::{Controller, ControllerDef, Method, Request, Response, RouteDefinition, RouteTable};
pub use encapsulation::ModuleView;
pub use errors::{
    ModuleError, ResolveError, ScopeValidationError, ScopeViolation, UnverifiedBinding,
    VisibilityDenial,
};
pub use lazy::LazyRef;
pub use module::{Module, ModuleDescriptor, ModuleId, ModuleRef};
pub use registry::{ModuleRegistry, RegistryOptions};
pub use resolver::{Dependencies, Resolver};
pub use token::{Token, TokenKey};
pub use types::{DynError, Injectable, Instance, TypeInfo};
