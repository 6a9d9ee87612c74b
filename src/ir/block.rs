use std::fmt;

use crate::ir::stmt::IrStmtId;

/// An opaque index identifying a basic block within an `IrProgram`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BbId(pub u32);

impl fmt::Display for BbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block.
///
/// Statements are stored in the program's arena; the block holds their ids in
/// program order. Successors are implied by the targets of the block's
/// branch statements, not stored separately.
#[derive(Debug, Clone)]
pub struct IrBb {
    pub id: BbId,
    /// Unique label, minted by the code generator's symbol generator (entry
    /// blocks are renamed after their function).
    pub label: String,
    pub is_entry: bool,
    pub stmts: Vec<IrStmtId>,
}

impl IrBb {
    pub fn new(id: BbId, label: String) -> Self {
        IrBb {
            id,
            label,
            is_entry: false,
            stmts: Vec::new(),
        }
    }
}
