//! The middle-end: the type system, the value/instruction model, module and
//! scope management, AST -> IR lowering, and the textual IR printer.

pub mod errors;
pub mod ir;
pub mod lower;
pub mod module;
pub mod printer;
pub mod types;
pub mod value;

pub use errors::CompileError;
pub use ir::{Function, Instruction};
pub use lower::lower_program;
pub use module::Module;
pub use printer::print_module;
pub use types::Type;
pub use value::Value;
