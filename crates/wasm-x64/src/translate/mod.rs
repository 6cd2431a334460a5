mod codegen;
mod control;
mod conv;
mod float;
mod integer;
mod memory;
mod regalloc;
mod stack;
mod table;
mod vector;

pub use codegen::{compile, compile_host_stub, CompiledFunction, SourceOffset};

#[cfg(any(test, feature = "test-harness"))]
pub(crate) use codegen::compile_function;
