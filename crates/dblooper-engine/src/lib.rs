//! Core of dblooper: compile a statement template once, then execute it for
//! every input row against a single database session.

pub mod assembler;
pub mod binder;
pub mod config;
pub mod errors;
pub mod jsonl;
pub mod looper;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub(crate) mod router;
pub mod sink;
pub mod source;
pub mod template;
pub mod variables;

// Re-export public API for convenience
pub use errors::{ConfigurationError, LoopError, RowError, TemplateError};
pub use looper::{AbortReason, CancellationToken, LoopState, LoopSummary, Looper};
pub use orchestrator::{check_job, compile_job, run_job};
pub use result::{CheckReport, JobReport};
pub use sink::{CollectingSink, RowSink};
pub use source::{RowSource, VecSource};
pub use template::{compile, CompileOptions, CompiledStatement};
pub use variables::{VariableResolver, VariableValue};
