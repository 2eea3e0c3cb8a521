use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    binding::{Binding, Scope},
    container::Container,
    context::{DiscoveredDependency, ResolutionContext},
    errors::{ResolveError, ScopeValidationError, ScopeViolation, UnverifiedBinding},
    resolver::Resolver,
    token::TokenKey,
};

/// Proves that no singleton can capture a scoped instance
///
/// Factories are run with a discovering resolver which records every requested token.
/// References are placeholders, strict dependencies are built detached so the
/// factory can go on. Dependencies requested only on a branch the factory does not
/// take are not seen. A factory which fails leaves its binding unverified.
pub(crate) struct ScopeValidator<'c> {
    container: &'c Container,
    discovered: HashMap<TokenKey, Vec<DiscoveredDependency>>,
    unverified: Vec<UnverifiedBinding>,
}

impl<'c> ScopeValidator<'c> {
    pub fn new(container: &'c Container) -> Self {
        ScopeValidator {
            container,
            discovered: HashMap::new(),
            unverified: Vec::new(),
        }
    }

    pub fn validate(mut self) -> Result<(), ScopeValidationError> {
        let singletons: Vec<Arc<Binding>> = self
            .container
            .bindings()
            .into_iter()
            .filter(|binding| binding.scope() == Scope::Singleton)
            .collect();

        tracing::debug!("Validating scopes of {} singleton(s)", singletons.len());

        let mut violations = Vec::new();
        for singleton in &singletons {
            let mut chain = vec![singleton.token().clone()];
            let mut visited = HashSet::from([singleton.token().clone()]);
            self.check_recurse(
                singleton.token(),
                singleton,
                &mut chain,
                &mut visited,
                &mut violations,
            );
        }

        if !violations.is_empty() {
            return Err(ScopeValidationError::Violations(violations));
        }
        if !self.unverified.is_empty() {
            return Err(ScopeValidationError::Unverified(self.unverified));
        }

        Ok(())
    }

    fn check_recurse(
        &mut self,
        singleton: &TokenKey,
        binding: &Binding,
        chain: &mut Vec<TokenKey>,
        visited: &mut HashSet<TokenKey>,
        violations: &mut Vec<ScopeViolation>,
    ) {
        for dependency in self.dependencies(binding) {
            let Some(next) = self.container.binding(&dependency.token) else {
                if !dependency.optional {
                    tracing::warn!(
                        "'{}' depends on '{}' which is not bound",
                        binding.token(),
                        dependency.token
                    );
                }
                continue;
            };

            chain.push(dependency.token.clone());
            match next.scope() {
                Scope::Scoped => violations.push(ScopeViolation {
                    singleton: singleton.clone(),
                    scoped: dependency.token.clone(),
                    chain: chain.clone(),
                }),
                Scope::Singleton | Scope::Transient => {
                    if visited.insert(dependency.token.clone()) {
                        self.check_recurse(singleton, &next, chain, visited, violations);
                    }
                }
            }
            chain.pop();
        }
    }

    /// Direct dependencies of a binding, each factory is traced once per validation
    fn dependencies(&mut self, binding: &Binding) -> Vec<DiscoveredDependency> {
        if let Some(discovered) = self.discovered.get(binding.token()) {
            return discovered.clone();
        }

        let context = ResolutionContext::discovery();
        context.enter(binding.token());
        let outcome = {
            let resolver = Resolver::new(self.container, &context, binding.owner().map(Arc::as_ref));
            (binding.factory)(&resolver)
        };
        context.leave(binding.token(), None);

        if let Err(error) = outcome {
            let error = ResolveError::from_factory(error);
            tracing::debug!("Tracing '{}' failed: {}", binding.token(), error);
            self.unverified.push(UnverifiedBinding {
                token: binding.token().clone(),
                reason: error.to_string(),
            });
        }

        let discovered = context.into_discovered();
        self.discovered
            .insert(binding.token().clone(), discovered.clone());
        discovered
    }
}
