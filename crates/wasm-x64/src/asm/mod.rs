mod assembler;
mod inst;
mod reg;

pub use assembler::{Assembler, FinalizedCode, Label};
pub use inst::Mnemonic;
pub use reg::{Cond, Reg};
