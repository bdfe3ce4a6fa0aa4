//! Safe wrappers over the marshaling core
//!
//! Owned objects (contexts, modules, builders, engines) release themselves
//! exactly once. Everything else is a copyable handle that borrows its owner:
//! types and constants borrow the context, while functions, parameters, blocks
//! and instructions borrow their module. The borrow checker keeps them from
//! outliving what releases them.

pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
mod ir;
pub mod module;
pub mod passes;
pub mod types;
pub mod values;

pub use builder::Builder;
pub use context::{AsContext, Context, GlobalContext};
pub use engine::{ExecutionEngine, JitOptions};
pub use error::{NativeError, NativeResult};
pub use module::Module;
pub use passes::PassOptions;
pub use types::Type;
pub use values::{BasicBlock, Value};
