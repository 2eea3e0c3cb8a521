use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::executor::block_on;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use wrapp_container::{
    Container, DynError, Module, ModuleDescriptor, ModuleError, ModuleRegistry, ModuleView,
    Provider, RegistryOptions, ResolveError, ScopeValidationError, Token, VisibilityDenial,
};

const CONNECTION: Token<String> = Token::constant("connection");
const SECRET: Token<String> = Token::constant("secret");
const REPORT: Token<String> = Token::constant("report");

fn name_of<M>() -> &'static str {
    std::any::type_name::<M>()
}

#[derive(Default)]
struct DatabaseModule;
impl Module for DatabaseModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .provider(Provider::value(&SECRET, "hunter2".to_string()))
            .provider(
                Provider::factory(&CONNECTION, |r| {
                    Ok(format!("postgres://admin:{}@db", r.resolve(&SECRET)?))
                })
                .singleton(),
            )
            .export(&CONNECTION)
    }
}

#[derive(Default)]
struct ReportModule;
impl Module for ReportModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import::<DatabaseModule>()
            .provider(Provider::factory(&REPORT, |r| {
                Ok(format!("report over {}", r.resolve(&CONNECTION)?))
            }))
            .export(&REPORT)
    }
}

#[test]
fn imports_are_loaded_before_their_importers() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<ReportModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(
        registry.loaded_modules(),
        vec![name_of::<DatabaseModule>(), name_of::<ReportModule>()]
    );
    assert!(registry.is_loaded::<DatabaseModule>());
    assert_eq!(
        container.resolve(&REPORT).unwrap().as_str(),
        "report over postgres://admin:hunter2@db"
    );
}

#[test]
fn registration_order_of_modules_does_not_matter() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<ReportModule>().register::<DatabaseModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(
        registry.loaded_modules(),
        vec![name_of::<DatabaseModule>(), name_of::<ReportModule>()]
    );
}

#[test]
fn bindings_belong_to_their_module() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<ReportModule>();
    block_on(registry.load_modules(&container)).unwrap();

    let binding = container.get_binding(&SECRET).unwrap();
    assert_eq!(binding.owner_name(), Some(name_of::<DatabaseModule>()));
    // The root container sees everything
    assert_eq!(container.resolve(&SECRET).unwrap().as_str(), "hunter2");
}

#[derive(Default)]
struct SnoopingModule;
impl Module for SnoopingModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import::<DatabaseModule>()
            .provider(Provider::factory(&Token::<String>::named("snoop"), |r| {
                Ok(r.resolve(&SECRET)?.as_ref().clone())
            }))
    }

    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError> {
        assert!(module.has(&CONNECTION));
        assert!(!module.has(&SECRET));
        assert!(module.accessible_tokens().contains(CONNECTION.key()));
        assert!(!module.accessible_tokens().contains(SECRET.key()));
        Ok(())
    }
}

#[test]
fn private_tokens_are_hidden_from_importers() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<SnoopingModule>();
    block_on(registry.load_modules(&container)).unwrap();

    match container.resolve(&Token::<String>::named("snoop")) {
        Err(ResolveError::NonExportedToken {
            token,
            owner,
            reason,
            accessible,
        }) => {
            assert_eq!(token, SECRET.key().clone());
            assert_eq!(owner, name_of::<DatabaseModule>());
            assert_eq!(reason, VisibilityDenial::NotExported);
            assert!(accessible.contains(CONNECTION.key()));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(value) => panic!("resolved private token: {value}"),
    }
}

#[derive(Default)]
struct FacadeModule;
impl Module for FacadeModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import::<ReportModule>()
            .provider(Provider::factory(&Token::<String>::named("facade"), |r| {
                Ok(r.resolve(&CONNECTION)?.as_ref().clone())
            }))
    }
}

#[test]
fn exports_are_not_transitive() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<FacadeModule>();
    block_on(registry.load_modules(&container)).unwrap();

    let err = container
        .resolve(&Token::<String>::named("facade"))
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::NonExportedToken {
            reason: VisibilityDenial::NotImported,
            ..
        }
    ));
}

static BASE_INITS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct BaseModule;
impl Module for BaseModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
    }

    async fn on_module_init(&self) -> Result<(), DynError> {
        BASE_INITS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct LeftModule;
impl Module for LeftModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<BaseModule>()
    }
}

#[derive(Default)]
struct RightModule;
impl Module for RightModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<BaseModule>()
    }
}

#[derive(Default)]
struct TopModule;
impl Module for TopModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import::<LeftModule>()
            .import::<RightModule>()
    }
}

#[test]
fn diamond_imports_load_the_shared_module_once() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<TopModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(BASE_INITS.load(Ordering::SeqCst), 1);
    assert_eq!(
        registry.loaded_modules(),
        vec![
            name_of::<BaseModule>(),
            name_of::<LeftModule>(),
            name_of::<RightModule>(),
            name_of::<TopModule>(),
        ]
    );
}

#[derive(Default)]
struct PingModule;
impl Module for PingModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<PongModule>()
    }
}

#[derive(Default)]
struct PongModule;
impl Module for PongModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<PingModule>()
    }
}

#[test]
fn cyclic_imports_terminate() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<PingModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(
        registry.loaded_modules(),
        vec![name_of::<PongModule>(), name_of::<PingModule>()]
    );
}

#[derive(Default)]
struct BrokenExportModule;
impl Module for BrokenExportModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().export(&Token::<String>::named("nowhere"))
    }
}

#[test]
fn exports_must_be_provided() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<BrokenExportModule>();

    match block_on(registry.load_modules(&container)) {
        Err(ModuleError::InvalidExport { module, token }) => {
            assert_eq!(module, name_of::<BrokenExportModule>());
            assert_eq!(token.to_string(), "nowhere");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

static LIFECYCLE: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

#[derive(Default)]
struct StorageModule;
impl Module for StorageModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
    }

    async fn on_module_init(&self) -> Result<(), DynError> {
        LIFECYCLE.lock().push("storage init");
        Ok(())
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        LIFECYCLE.lock().push("storage destroy");
        Ok(())
    }
}

#[derive(Default)]
struct ApiModule;
impl Module for ApiModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<StorageModule>()
    }

    async fn on_module_init(&self) -> Result<(), DynError> {
        LIFECYCLE.lock().push("api init");
        Ok(())
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        LIFECYCLE.lock().push("api destroy");
        Ok(())
    }
}

#[test]
fn hooks_run_in_load_order_and_destroy_in_reverse() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<ApiModule>();
    block_on(registry.load_modules(&container)).unwrap();
    block_on(registry.clear()).unwrap();

    assert_eq!(
        *LIFECYCLE.lock(),
        vec!["storage init", "api init", "api destroy", "storage destroy"]
    );
    assert!(!registry.is_loaded::<ApiModule>());
    assert!(registry.loaded_modules().is_empty());
}

#[derive(Default)]
struct FailingInitModule;
impl Module for FailingInitModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
    }

    async fn on_module_init(&self) -> Result<(), DynError> {
        Err("no disk space".into())
    }
}

#[test]
fn failing_hooks_abort_loading() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<FailingInitModule>();

    let err = block_on(registry.load_modules(&container)).unwrap_err();
    assert!(matches!(err, ModuleError::Hook(_)));
    assert_eq!(err.to_string(), "no disk space");
}

struct RequestContext;
struct Cache(#[allow(dead_code)] Arc<RequestContext>);

#[derive(Default)]
struct LeakyModule;
impl Module for LeakyModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .provider(Provider::factory(&Token::<RequestContext>::of_type(), |_| Ok(RequestContext)).scoped())
            .provider(
                Provider::factory(&Token::<Cache>::of_type(), |r| {
                    Ok(Cache(r.resolve(&Token::<RequestContext>::of_type())?))
                })
                .singleton(),
            )
    }
}

#[test]
fn scope_validation_can_run_after_loading() {
    let container = Container::new();
    let mut registry = ModuleRegistry::with_options(RegistryOptions {
        validate_scopes: true,
    });
    registry.register::<LeakyModule>();

    match block_on(registry.load_modules(&container)) {
        Err(ModuleError::ScopeValidation(ScopeValidationError::Violations(violations))) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].singleton, Token::<Cache>::of_type().key().clone());
            assert_eq!(
                violations[0].scoped,
                Token::<RequestContext>::of_type().key().clone()
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Without the option the same modules load fine
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<LeakyModule>();
    block_on(registry.load_modules(&container)).unwrap();
}

#[test]
fn pre_bound_tokens_override_module_providers() {
    let container = Container::new();
    container
        .register_value(&SECRET, "from test".to_string())
        .unwrap();

    let mut registry = ModuleRegistry::new();
    registry.register::<DatabaseModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(
        container.resolve(&CONNECTION).unwrap().as_str(),
        "postgres://admin:from test@db"
    );
    assert_eq!(container.get_binding(&SECRET).unwrap().owner_name(), None);
}

#[derive(Default)]
struct ImperativeModule;
impl Module for ImperativeModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import::<DatabaseModule>()
            .export(&Token::<usize>::named("length"))
    }

    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError> {
        let connection = module.resolve(&CONNECTION)?;
        module
            .register(&Token::<usize>::named("length"), move |_| Ok(connection.len()))?
            .as_singleton()?;
        Ok(())
    }
}

#[test]
fn modules_can_register_imperatively() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<ImperativeModule>();
    block_on(registry.load_modules(&container)).unwrap();

    assert_eq!(
        *container.resolve(&Token::<usize>::named("length")).unwrap(),
        "postgres://admin:hunter2@db".len()
    );
}

#[derive(Default)]
struct PartialModule;
impl Module for PartialModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .provider(Provider::value(&Token::<u8>::named("partial"), 1))
            .export(&Token::<u8>::named("missing"))
    }
}

#[test]
fn failed_registration_is_rolled_back() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<PartialModule>();

    let err = block_on(registry.load_modules(&container)).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidExport { .. }));
    assert!(!registry.is_loaded::<PartialModule>());
    assert!(registry.loaded_modules().is_empty());
    assert!(!container.has(&Token::<u8>::named("partial")));
    assert!(container.tokens().is_empty());

    // Retrying fails the same way instead of finding the module loaded
    let err = block_on(registry.load_modules(&container)).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidExport { .. }));
}

const SHARED: Token<String> = Token::constant("shared");

#[derive(Default)]
struct FirstOwnerModule;
impl Module for FirstOwnerModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().provider(Provider::value(&SHARED, "first".to_string()))
    }
}

#[derive(Default)]
struct SecondOwnerModule;
impl Module for SecondOwnerModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .provider(Provider::value(&SHARED, "second".to_string()))
            .export(&SHARED)
    }
}

#[test]
fn tokens_of_other_modules_can_not_be_exported() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<FirstOwnerModule>();
    registry.register::<SecondOwnerModule>();

    match block_on(registry.load_modules(&container)) {
        Err(ModuleError::InvalidExport { module, token }) => {
            assert_eq!(module, name_of::<SecondOwnerModule>());
            assert_eq!(token, SHARED.key().clone());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        container.get_binding(&SHARED).unwrap().owner_name(),
        Some(name_of::<FirstOwnerModule>())
    );
    assert!(!registry.is_loaded::<SecondOwnerModule>());
}

static DESTROY_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct CountedModule;
impl Module for CountedModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        DESTROY_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn modules_are_destroyed_once() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<CountedModule>();
    block_on(registry.load_modules(&container)).unwrap();

    block_on(registry.destroy_modules()).unwrap();
    block_on(registry.destroy_modules()).unwrap();
    block_on(registry.clear()).unwrap();
    assert_eq!(DESTROY_CALLS.load(Ordering::SeqCst), 1);
}

static TEARDOWN: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

#[derive(Default)]
struct QueueModule;
impl Module for QueueModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        TEARDOWN.lock().push("queue");
        Ok(())
    }
}

#[derive(Default)]
struct WorkerModule;
impl Module for WorkerModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<QueueModule>()
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        TEARDOWN.lock().push("worker");
        Err("worker did not stop".into())
    }
}

#[test]
fn failing_destroy_hooks_do_not_stop_the_others() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<WorkerModule>();
    block_on(registry.load_modules(&container)).unwrap();

    let err = block_on(registry.clear()).unwrap_err();
    assert!(matches!(err, ModuleError::Hook(_)));
    assert_eq!(err.to_string(), "worker did not stop");
    assert_eq!(*TEARDOWN.lock(), vec!["worker", "queue"]);

    // Cleared even though a hook failed
    assert!(!registry.is_loaded::<WorkerModule>());
    assert!(registry.loaded_modules().is_empty());
    assert!(registry.controllers().next().is_none());
}
