use thiserror::Error;

use crate::{
    binding::Scope,
    token::{join_keys, TokenKey},
    types::DynError,
};

/// Errors while resolving or registering bindings
///
/// Apart from [ResolveError::Factory] these all point at a wiring mistake,
/// retrying will not make them go away.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Nothing is bound to the token anywhere in the scope chain
    #[error("No binding registered for '{token}' (resolution path: {}; visible tokens: {})", join_keys(.path, " -> "), join_keys(.visible, ", "))]
    TokenNotFound {
        token: TokenKey,
        /// Path under construction, ending with the missing token
        path: Vec<TokenKey>,
        /// Tokens the requester could have resolved instead
        visible: Vec<TokenKey>,
    },

    /// The token is already bound on this container
    #[error("'{token}' is already bound, bindings can not be overwritten")]
    TokenCollision { token: TokenKey },

    /// The token exists but belongs to a module which does not share it with the requester
    #[error("'{token}' belongs to module '{owner}' and {reason}, accessible tokens: {}", join_keys(.accessible, ", "))]
    NonExportedToken {
        token: TokenKey,
        owner: &'static str,
        reason: VisibilityDenial,
        accessible: Vec<TokenKey>,
    },

    /// A strict resolve re-entered a token which is still under construction
    #[error("Circular dependency on '{token}' through {} - Consider using `resolve_ref`", join_keys(.path, " -> "))]
    CircularDependency { token: TokenKey, path: Vec<TokenKey> },

    #[error("Failed to downcast '{token}', required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        token: TokenKey,
        required_type: &'static str,
        actual_type: &'static str,
    },

    /// The scope of a binding can only change before its first construction
    #[error("The scope of '{token}' is locked to {scope:?}, it has already been resolved")]
    ScopeLocked { token: TokenKey, scope: Scope },

    #[error("Can not register '{token}' in a child scope, register it on the root container")]
    ChildScopeRegistration { token: TokenKey },

    /// A factory failed with its own error
    #[error(transparent)]
    Factory(DynError),
}

impl ResolveError {
    /// Recovers a [ResolveError] which travelled through a factory as a [DynError]
    pub(crate) fn from_factory(error: DynError) -> Self {
        match error.downcast::<ResolveError>() {
            Ok(resolve_error) => *resolve_error,
            Err(other) => ResolveError::Factory(other),
        }
    }
}

/// Why a module can not see a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityDenial {
    /// The owning module does not export it
    NotExported,
    /// The owning module exports it, but the requester does not import that module
    NotImported,
}
impl std::fmt::Display for VisibilityDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisibilityDenial::NotExported => f.write_str("is not exported"),
            VisibilityDenial::NotImported => {
                f.write_str("is exported, but its module is not imported by the requester")
            }
        }
    }
}

/// A singleton which can reach a scoped binding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Singleton '{singleton}' depends on scoped '{scoped}' through {}", join_keys(.chain, " -> "))]
pub struct ScopeViolation {
    pub singleton: TokenKey,
    pub scoped: TokenKey,
    pub chain: Vec<TokenKey>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeValidationError {
    #[error("Scopes can only be validated on the root container")]
    NotRoot,
    #[error("{}", display_violations(.0))]
    Violations(Vec<ScopeViolation>),
    /// No violation was found, but some factories failed before all of their
    /// dependencies were known
    #[error("{}", display_unverified(.0))]
    Unverified(Vec<UnverifiedBinding>),
}

/// A binding whose factory failed while its dependencies were traced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{token}' could not be verified: {reason}")]
pub struct UnverifiedBinding {
    pub token: TokenKey,
    pub reason: String,
}

fn display_unverified(unverified: &[UnverifiedBinding]) -> String {
    let mut display = Vec::new();
    display.push("Scope validation could not trace every dependency:".to_string());
    for binding in unverified {
        display.push(format!("- {}", binding));
    }
    display.join("\n")
}

fn display_violations(violations: &[ScopeViolation]) -> String {
    let mut display = Vec::new();
    display.push("Scope validation found one or more errors:".to_string());
    for violation in violations {
        display.push(format!("- {}", violation));
    }
    display.join("\n")
}

/// Errors while loading or tearing down modules
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Module '{module}' exports '{token}' which it does not provide")]
    InvalidExport {
        module: &'static str,
        token: TokenKey,
    },

    #[error(transparent)]
    ScopeValidation(#[from] ScopeValidationError),

    /// A lifecycle hook failed with its own error
    #[error(transparent)]
    Hook(DynError),
}
