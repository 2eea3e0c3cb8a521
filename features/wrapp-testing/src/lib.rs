//! Wrapp Testing compiles modules into an isolated container for tests.
//!
//! Every [TestingModule] owns a fresh root container. Providers can be overridden
//! before the imported modules are loaded, which is how real dependencies get swapped
//! for fakes.
//!
//! # Examples
//!
//! ```rust
//! use wrapp_container::{Module, ModuleDescriptor, Provider, Token};
//! use wrapp_testing::TestingModule;
//!
//! const GREETING: Token<String> = Token::constant("greeting");
//!
//! #[derive(Default)]
//! struct GreetingModule;
//! impl Module for GreetingModule {
//!     fn descriptor() -> ModuleDescriptor {
//!         ModuleDescriptor::new()
//!             .provider(Provider::value(&GREETING, "hello".to_string()))
//!             .export(&GREETING)
//!     }
//! }
//!
//! let module = futures::executor::block_on(
//!     TestingModule::builder()
//!         .import::<GreetingModule>()
//!         .override_provider(Provider::value(&GREETING, "hi from a test".to_string()))
//!         .compile(),
//! )
//! .unwrap();
//!
//! assert_eq!(module.get(&GREETING).unwrap().as_str(), "hi from a test");
//! ```

pub mod builder;
pub mod module;

pub use builder::TestingModuleBuilder;
pub use module::TestingModule;
