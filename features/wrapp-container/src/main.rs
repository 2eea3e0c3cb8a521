use std::sync::Arc;

use wrapp_container::{
    Container, DynError, LazyRef, Module, ModuleDescriptor, ModuleRegistry, ModuleView, Provider,
    ResolveError, Token,
};

const GREETING: Token<String> = Token::constant("greeting");

fn main() {
    let container = Container::new();
    let mut registry = ModuleRegistry::new();
    registry.register::<AppModule>();

    futures::executor::block_on(registry.load_modules(&container)).unwrap();
    println!("Loaded {:?}", registry.loaded_modules());
    println!("{:?}", container);

    let app = container.resolve(&Token::<App>::of_type()).unwrap();
    println!("{}", app.greet());

    futures::executor::block_on(registry.clear()).unwrap();
}

struct ServiceA {
    b: LazyRef<ServiceB>,
}
impl ServiceA {
    fn value(&self) -> &'static str {
        "A"
    }
}

struct ServiceB {
    a: LazyRef<ServiceA>,
}
impl ServiceB {
    fn value(&self) -> &'static str {
        "B"
    }
}

struct App {
    greeting: Arc<String>,
    a: Arc<ServiceA>,
}
impl App {
    fn greet(&self) -> String {
        // a -> b -> a goes around the cycle once
        format!(
            "{} from {}, {} and {} again",
            self.greeting,
            self.a.value(),
            self.a.b.value(),
            self.a.b.a.value()
        )
    }
}

#[derive(Default)]
struct GreetingModule;
impl Module for GreetingModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new()
            .provider(Provider::value(&GREETING, "Hello".to_string()))
            .export(&GREETING)
    }

    async fn on_module_init(&self) -> Result<(), DynError> {
        println!("GreetingModule initialized");
        Ok(())
    }
}

#[derive(Default)]
struct AppModule;
impl Module for AppModule {
    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new().import::<GreetingModule>()
    }

    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError> {
        let a = Token::<ServiceA>::of_type();
        let b = Token::<ServiceB>::of_type();

        let b_dep = b.clone();
        module
            .register(&a, move |r| Ok(ServiceA { b: r.build_deps(&b_dep)? }))?
            .as_singleton()?;
        let a_dep = a.clone();
        module
            .register(&b, move |r| Ok(ServiceB { a: r.build_deps(&a_dep)? }))?
            .as_singleton()?;

        module.register(&Token::<App>::of_type(), move |r| {
            Ok(App {
                greeting: r.resolve(&GREETING)?,
                a: r.resolve(&a)?,
            })
        })?;
        Ok(())
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        println!("AppModule destroyed");
        Ok(())
    }
}
