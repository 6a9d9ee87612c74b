use std::collections::HashMap;

use crate::ir::block::{BbId, IrBb};
use crate::ir::stmt::{IrStmt, IrStmtId, IrStmtKind, TimeVarId, ValNum};

/// Width in bits of the transaction id produced by a `Spawn` statement.
pub const TXN_ID_WIDTH: u32 = 32;

/// A timing variable: a named anchor that `TimingBarrier` statements pin
/// pipeline-stage offsets to.
#[derive(Debug, Clone)]
pub struct IrTimeVar {
    pub id: TimeVarId,
    pub name: String,
    /// Every barrier statement referencing this variable.
    pub uses: Vec<IrStmtId>,
}

/// The output of code generation: basic blocks over a program-scoped
/// statement arena, plus the entry-point list and timing-variable table.
///
/// Invariants:
/// - `BbId(n)` indexes `bbs[n]` and `IrStmtId(n)` indexes `stmts[n]`.
/// - Value numbers are unique across the program; `next_valnum` is strictly
///   greater than every minted number.
/// - Blocks exclusively own their statements: each arena statement id appears
///   in exactly one block's `stmts` list.
#[derive(Debug, Default)]
pub struct IrProgram {
    pub bbs: Vec<IrBb>,
    pub(crate) stmts: Vec<IrStmt>,
    pub entries: Vec<BbId>,
    pub timevars: Vec<IrTimeVar>,
    pub(crate) timevar_index: HashMap<String, TimeVarId>,
    pub next_valnum: u32,
    /// Value of the `timing_model` pragma, if the unit carried one.
    pub timing_model: Option<String>,
}

impl IrProgram {
    pub fn new() -> Self {
        IrProgram {
            next_valnum: 1,
            ..IrProgram::default()
        }
    }

    /// Allocates a new block with the given label and appends it to the
    /// program. The block is not made current anywhere; that is the code
    /// generator's cursor to move.
    pub fn add_bb(&mut self, label: String) -> BbId {
        let id = BbId(self.bbs.len() as u32);
        self.bbs.push(IrBb::new(id, label));
        id
    }

    pub fn bb(&self, id: BbId) -> &IrBb {
        &self.bbs[id.0 as usize]
    }

    pub fn bb_mut(&mut self, id: BbId) -> &mut IrBb {
        &mut self.bbs[id.0 as usize]
    }

    /// Appends `stmt` to `bb`, transferring it into the arena.
    pub fn add_stmt(&mut self, bb: BbId, mut stmt: IrStmt) -> IrStmtId {
        let id = IrStmtId(self.stmts.len() as u32);
        stmt.id = id;
        self.stmts.push(stmt);
        self.bbs[bb.0 as usize].stmts.push(id);
        id
    }

    pub fn stmt(&self, id: IrStmtId) -> &IrStmt {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: IrStmtId) -> &mut IrStmt {
        &mut self.stmts[id.0 as usize]
    }

    /// Claims the next value number.
    pub fn claim_valnum(&mut self) -> ValNum {
        let n = self.next_valnum;
        self.next_valnum += 1;
        ValNum(n)
    }

    /// Records `bb` as a program entry point.
    pub fn add_entry(&mut self, bb: BbId) {
        self.entries.push(bb);
    }

    /// Allocates a timing variable under `name`.
    pub fn add_timevar(&mut self, name: String) -> TimeVarId {
        let id = TimeVarId(self.timevars.len() as u32);
        self.timevar_index.insert(name.clone(), id);
        self.timevars.push(IrTimeVar {
            id,
            name,
            uses: Vec::new(),
        });
        id
    }

    pub fn timevar(&self, id: TimeVarId) -> &IrTimeVar {
        &self.timevars[id.0 as usize]
    }

    pub fn timevar_mut(&mut self, id: TimeVarId) -> &mut IrTimeVar {
        &mut self.timevars[id.0 as usize]
    }

    pub fn timevar_by_name(&self, name: &str) -> Option<&IrTimeVar> {
        let id = self.timevar_index.get(name)?;
        Some(&self.timevars[id.0 as usize])
    }

    /// Blocks reachable from `bb` in one step through its branch statements
    /// (`If`/`Jmp`). `Spawn` targets are roots of their own paths and are not
    /// successors of the spawning block.
    pub fn succs(&self, bb: BbId) -> Vec<BbId> {
        let mut out = Vec::new();
        for &sid in &self.bbs[bb.0 as usize].stmts {
            let stmt = &self.stmts[sid.0 as usize];
            if matches!(stmt.kind, IrStmtKind::If | IrStmtKind::Jmp) {
                out.extend(stmt.targets.iter().copied());
            }
        }
        out
    }

    /// Iterates a block's statements in program order.
    pub fn block_stmts(&self, bb: BbId) -> impl Iterator<Item = &IrStmt> + '_ {
        self.bbs[bb.0 as usize]
            .stmts
            .iter()
            .map(move |&id| &self.stmts[id.0 as usize])
    }
}
