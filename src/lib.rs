//! Sluice: front-end code generation for a pipelined-datapath HDL.
//!
//! Sluice programs describe pipelined, speculatively executed transactional
//! datapaths. This crate is the code-generation core of the compiler: it
//! translates a type-checked AST into an SSA-form basic-block IR ready for
//! the Verilog-generation backend.
//!
//! Pipeline position:
//!
//! ```text
//! source → Lexer → Parser → [Ast] → TypeCheck → Desugar
//!   → generate() (this crate) → [IrProgram] → PassManager → Verilog backend
//! ```
//!
//! The stages before `generate()` and the backend after the passes live in
//! sibling crates; this crate consumes a fully type-annotated [`ast::Ast`]
//! and produces an [`ir::IrProgram`].
//!
//! Passes:
//! 1. `PrunePass`    - drop unreachable blocks and stale phi inputs
//!    (run automatically at the end of `generate()`)
//! 2. `ValidatePass` - structural SSA invariants

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod lower;
pub mod pass;

pub use diagnostics::{Diagnostic, ErrorCollector, Severity};
pub use error::{CodegenError, Halted, PassError};
pub use lower::generate;
