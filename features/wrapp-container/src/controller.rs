//! Transport independent contract between controllers and the container
//!
//! A controller is an ordinary binding which additionally carries route metadata. An
//! adapter (HTTP or otherwise) mounts controllers through a [RouteTable], which
//! resolves each controller once and dispatches requests to its named handlers.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use crate::{
    binding::Provider,
    container::Container,
    errors::ResolveError,
    resolver::Resolver,
    token::{Token, TokenKey},
    types::{DynError, Injectable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Static route metadata of a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub method: Method,
    pub path: &'static str,
    /// Name of the handler on the controller instance
    pub handler: &'static str,
}

impl RouteDefinition {
    pub fn new(method: Method, path: &'static str, handler: &'static str) -> Self {
        RouteDefinition {
            method,
            path,
            handler,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: Option<Method>,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            method: Some(method),
            path: path.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found(body: impl Into<String>) -> Self {
        Response {
            status: 404,
            body: body.into(),
        }
    }

    pub fn server_error(body: impl Into<String>) -> Self {
        Response {
            status: 500,
            body: body.into(),
        }
    }
}

/// A binding exposing request handlers
pub trait Controller: Injectable {
    /// Routes served by this controller
    fn routes() -> Vec<RouteDefinition>
    where
        Self: Sized;

    /// Invokes the named handler, `None` if the controller has no such handler
    fn handle(&self, handler: &str, request: &Request) -> Option<Result<Response, DynError>>;
}

type MountFn = Arc<dyn Fn(&Container) -> Result<Arc<dyn Controller>, ResolveError> + Send + Sync>;

/// A controller provider together with its route metadata
#[derive(Clone)]
pub struct ControllerDef {
    provider: Provider,
    name: &'static str,
    routes: Vec<RouteDefinition>,
    mount: MountFn,
}

impl ControllerDef {
    pub fn new<C, F>(token: &Token<C>, factory: F) -> Self
    where
        C: Controller,
        F: Fn(&Resolver<'_>) -> Result<C, DynError> + Send + Sync + 'static,
    {
        let mount_token = token.clone();
        ControllerDef {
            provider: Provider::factory(token, factory),
            name: std::any::type_name::<C>(),
            routes: C::routes(),
            mount: Arc::new(move |container: &Container| {
                let controller: Arc<dyn Controller> = container.resolve(&mount_token)?;
                Ok(controller)
            }),
        }
    }

    pub fn token(&self) -> &TokenKey {
        self.provider.token()
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }
}

impl Debug for ControllerDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDef")
            .field("controller", &self.name)
            .field("routes", &self.routes)
            .finish()
    }
}

struct MountedRoute {
    route: RouteDefinition,
    controller_name: &'static str,
    controller: Arc<dyn Controller>,
}

/// Routes of all mounted controllers
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<MountedRoute>,
}

impl RouteTable {
    /// Resolves every controller once and collects its routes
    pub fn mount<'d>(
        container: &Container,
        controllers: impl IntoIterator<Item = &'d ControllerDef>,
    ) -> Result<Self, ResolveError> {
        let mut table = RouteTable::default();
        for def in controllers {
            let controller = (def.mount)(container)?;
            for route in &def.routes {
                tracing::debug!(
                    "Mounted {:?} {} -> {}::{}",
                    route.method,
                    route.path,
                    def.name,
                    route.handler
                );
                table.routes.push(MountedRoute {
                    route: route.clone(),
                    controller_name: def.name,
                    controller: controller.clone(),
                });
            }
        }
        Ok(table)
    }

    pub fn routes(&self) -> Vec<&RouteDefinition> {
        self.routes.iter().map(|mounted| &mounted.route).collect()
    }

    /// Dispatches a request to the handler of the first matching route
    pub fn dispatch(&self, request: &Request) -> Response {
        let Some(mounted) = self.routes.iter().find(|mounted| {
            Some(mounted.route.method) == request.method && mounted.route.path == request.path
        }) else {
            return Response::not_found(format!("No route for {:?} {}", request.method, request.path));
        };

        let handler = mounted.route.handler;
        match mounted.controller.handle(handler, request) {
            Some(Ok(response)) => response,
            Some(Err(error)) => {
                tracing::error!(
                    "Handler '{}' of '{}' failed: {}",
                    handler,
                    mounted.controller_name,
                    error
                );
                Response::server_error(format!(
                    "Handler '{}' of '{}' failed: {}",
                    handler, mounted.controller_name, error
                ))
            }
            None => {
                tracing::error!(
                    "Handler '{}' is not defined on '{}'",
                    handler,
                    mounted.controller_name
                );
                Response::server_error(format!(
                    "Handler '{}' is not defined on '{}'",
                    handler, mounted.controller_name
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct HealthController {
        status: String,
    }

    impl Controller for HealthController {
        fn routes() -> Vec<RouteDefinition> {
            vec![
                RouteDefinition::new(Method::Get, "/health", "status"),
                RouteDefinition::new(Method::Post, "/health", "reset"),
                RouteDefinition::new(Method::Delete, "/health", "crash"),
            ]
        }

        fn handle(&self, handler: &str, _request: &Request) -> Option<Result<Response, DynError>> {
            match handler {
                "status" => Some(Ok(Response::ok(self.status.clone()))),
                "crash" => Some(Err("disk on fire".into())),
                _ => None,
            }
        }
    }

    fn table() -> (RouteTable, Arc<AtomicUsize>) {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        let container = Container::new();
        let status = Token::<String>::named("status");
        container.register_value(&status, "up".to_string()).unwrap();

        let def = ControllerDef::new(&Token::<HealthController>::of_type(), move |r| {
            counter.fetch_add(1, Ordering::SeqCst);
            let status = r.resolve(&status)?;
            Ok(HealthController {
                status: status.to_string(),
            })
        });
        container.provide(def.provider()).unwrap();
        let table = RouteTable::mount(&container, [&def]).unwrap();
        (table, constructed)
    }

    #[test]
    fn controllers_are_resolved_once_and_dispatched() {
        let (table, constructed) = table();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(table.routes().len(), 3);

        let response = table.dispatch(&Request::new(Method::Get, "/health"));
        assert_eq!(response, Response::ok("up"));
        table.dispatch(&Request::new(Method::Get, "/health"));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_and_failing_handlers_are_server_errors() {
        let (table, _) = table();

        let missing = table.dispatch(&Request::new(Method::Post, "/health"));
        assert_eq!(missing.status, 500);
        assert!(missing.body.contains("'reset' is not defined"));

        let failing = table.dispatch(&Request::new(Method::Delete, "/health"));
        assert_eq!(failing.status, 500);
        assert!(failing.body.contains("disk on fire"));

        let unknown = table.dispatch(&Request::new(Method::Get, "/nope"));
        assert_eq!(unknown.status, 404);
    }
}
