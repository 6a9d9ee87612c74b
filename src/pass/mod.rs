pub mod prune;
pub mod validate;

pub use prune::PrunePass;
pub use validate::ValidatePass;

use crate::error::PassError;
use crate::ir::program::IrProgram;

/// A pass that operates on an `IrProgram` in place.
///
/// Passes must be deterministic: given the same program, the transformed
/// output must be identical across runs (no global mutable state, no
/// randomness).
pub trait Pass {
    /// Human-readable name, used in error messages and diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass on the program.
    ///
    /// On success, the program is in a valid state for the next pass.
    /// On error, the program state is unspecified; the pipeline aborts.
    fn run(&mut self, prog: &mut IrProgram) -> Result<(), PassError>;
}

/// Manages and executes an ordered sequence of passes.
///
/// Passes run in the order they were registered. The pipeline aborts at the
/// first error.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    /// If set, dumps IR text to stderr after the pass with this name completes.
    dump_after: Option<String>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Configures the manager to dump IR to stderr after the named pass.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    /// Runs all passes in registration order on `prog`.
    ///
    /// Returns `Err((pass_name, error))` at the first failure.
    pub fn run(&mut self, prog: &mut IrProgram) -> Result<(), (String, PassError)> {
        for pass in &mut self.passes {
            pass.run(prog).map_err(|e| (pass.name().to_owned(), e))?;
            if let Some(ref target) = self.dump_after {
                if pass.name() == target.as_str() {
                    if let Ok(text) = crate::ir::print::emit_ir_text(prog) {
                        eprintln!("--- IR after {} ---\n{}", pass.name(), text);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the names of all registered passes in pipeline order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}
