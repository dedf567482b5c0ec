//! Promptgate — policy-driven prompt/response pipeline core with TCOL
//! command routing.
//!
//! The platform core in four layers:
//!
//! - `tcol-core`: the TCOL language front-end (lexer, parser, AST,
//!   visitors)
//! - `policy-core`: typed policies, the handler chain, and the two-phase
//!   pipeline engine
//! - `service-fabric`: discovery, circuit breakers, and the resilient
//!   service client
//! - this crate: structured logging with an audit channel, the object
//!   registry, the TCOL executor, the engine facade, and the prompt
//!   gateway
//!
//! Control flow for a prompt: `prompt → Pre phase → backend via the
//! service client → Post phase → outcome + audit log`. Control flow for
//! a TCOL command: `string → parse → executor → service client →
//! ExecutionResult`.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod permission;
pub mod prompt;
pub mod registry;
pub mod testing;

pub use config::PromptgateConfig;
pub use engine::{Engine, EngineConfig, ExecutionResult};
pub use error::EngineError;
pub use executor::{serialize_filter, ExecutionContext, TcolExecutor};
pub use logging::{Level, LogEntry, LogFormat, Logger, LoggerConfig, Timer};
pub use permission::{AllowAll, PermissionChecker, StaticPermissions};
pub use prompt::{PromptOutcome, PromptRoute, PromptService};
pub use registry::{
    FieldDefinition, MethodDefinition, ObjectDefinition, Registry, INTERNAL_SERVICE,
};

// The member crates are re-exported whole for downstream wiring.
pub use policy_core;
pub use service_fabric;
pub use tcol_core;
