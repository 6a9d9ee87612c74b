use thiserror::Error;

/// Errors the code generator can report while walking the AST.
///
/// Every variant is fatal for the compilation: the walker reports the
/// diagnostic to the [`ErrorCollector`](crate::diagnostics::ErrorCollector)
/// and aborts the walk with [`Halted`]. The partially built program must be
/// discarded by the caller.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Port/array/reg value expected but cannot trace back to def statically.")]
    EntityNotStatic,

    #[error("Cannot assign to non-variable, non-array-slot, non-field-slot lvalue.")]
    BadLvalue,

    #[error("Write to something not a port or chan")]
    WriteNotPortOrChan,

    #[error("Read from something not a port or chan")]
    ReadNotPortOrChan,

    #[error("Cannot use a defined name on a chan: chans must be anonymous.")]
    NamedChan,

    #[error(
        "Expression contains a potential side-effect (possibly a statement-block \
         expression or an array read), which is not allowed in a kill-if condition. \
         Such conditions may only contain simple port/chan reads, variable \
         references, and computations on those values."
    )]
    KillIfSideEffect,

    #[error(
        "'stage' statement appears outside of a timing {{}} block. Staging barriers \
         can occur only inside the context of a timing {{}} block."
    )]
    StageOutsideTiming,

    #[error("Break/continue with unknown label '{label}'")]
    UnknownLoopLabel { label: String },

    #[error("Break/continue not in loop")]
    BreakOutsideLoop,

    #[error("Statement-block expr where last stmt is not an expression statement.")]
    StmtBlockNotExpr,

    #[error(
        "If/else reassigns value without underlying IR representation. This usually \
         occurs when attempting to reassign port variables."
    )]
    IfJoinWithoutIr,

    #[error(
        "Attempt to reassign a value without an IR representation inside a while \
         loop. This usually occurs when attempting to reassign port variables."
    )]
    LoopJoinWithoutIr,

    #[error("Aggregate field access must be desugared before code generation.")]
    FieldRefNotDesugared,
}

/// Token returned when the walk is aborted. The diagnostics explaining the
/// abort live in the collector the walker was given; this type carries no
/// payload of its own.
#[derive(Debug, Error)]
#[error("code generation halted; diagnostics were reported to the collector")]
pub struct Halted;

/// Errors raised by IR passes.
///
/// A pass failure means a structural invariant of the program was violated;
/// the pipeline aborts and the program state is unspecified.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("value number %{value} is defined more than once")]
    DuplicateValueNumber { value: u32 },

    #[error("value numbers in block '{block}' are not strictly increasing")]
    NonIncreasingValueNumbers { block: String },

    #[error("non-entry block '{block}' has no predecessor")]
    OrphanBlock { block: String },

    #[error("phi %{value} in block '{block}' has mismatched operand/target lists")]
    PhiArityMismatch { block: String, value: u32 },

    #[error("phi %{value} in block '{block}' names '{pred}' which is not a direct predecessor")]
    PhiNonPredecessor {
        block: String,
        value: u32,
        pred: String,
    },

    #[error("phi %{value} in block '{block}' names predecessor '{pred}' more than once")]
    PhiDuplicatePredecessor {
        block: String,
        value: u32,
        pred: String,
    },

    #[error("block '{block}' does not end with a terminator")]
    MissingTerminator { block: String },
}
