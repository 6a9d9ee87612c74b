//! Mutable state of a single translation.

use std::collections::HashMap;

use crate::ast::ExprId;
use crate::ir::block::BbId;
use crate::ir::program::IrProgram;
use crate::ir::stmt::{IrStmt, IrStmtId, ValNum};
use crate::lower::bindings::BindingEnv;

/// The growing IR program plus the cursors and tables codegen threads through
/// every visit: the current insertion block, the symbol and value-number
/// mints, the expression→statement map, the minted-entity-name side table,
/// and the binding environment.
#[derive(Debug)]
pub struct CodeGenContext {
    pub prog: IrProgram,
    pub bindings: BindingEnv,
    cur_bb: Option<BbId>,
    gensym: u32,
    expr_map: HashMap<ExprId, IrStmtId>,
    /// Names minted for anonymous `PortDef`/`RegInit`/`ArrayInit`/`BypassDef`
    /// nodes, keyed by the defining expression. Kept out of the AST so the
    /// input tree is never rewritten.
    entity_names: HashMap<ExprId, String>,
}

impl CodeGenContext {
    pub fn new() -> Self {
        CodeGenContext {
            prog: IrProgram::new(),
            bindings: BindingEnv::new(),
            cur_bb: None,
            gensym: 1,
            expr_map: HashMap::new(),
            entity_names: HashMap::new(),
        }
    }

    /// Returns a unique symbol: `<prefix>_<n>` with the given prefix, or the
    /// bare `__codegen_gensym__<n>` form without one. The counter is shared
    /// across all mints and monotonically increasing, so names are stable for
    /// a given AST input order.
    pub fn gensym(&mut self, prefix: Option<&str>) -> String {
        let n = self.gensym;
        self.gensym += 1;
        match prefix {
            Some(p) => format!("{}_{}", p, n),
            None => format!("__codegen_gensym__{}", n),
        }
    }

    /// Claims the next value number.
    pub fn valnum(&mut self) -> ValNum {
        self.prog.claim_valnum()
    }

    /// Allocates a new block with a freshly minted label. Does not move the
    /// insertion cursor.
    pub fn add_bb(&mut self, label_prefix: Option<&str>) -> BbId {
        let label = self.gensym(label_prefix);
        self.prog.add_bb(label)
    }

    /// The block new statements are emitted into.
    pub fn cur_bb(&self) -> BbId {
        self.cur_bb
            .expect("CodeGenContext: no current block set")
    }

    pub fn set_cur_bb(&mut self, bb: BbId) {
        self.cur_bb = Some(bb);
    }

    /// Appends `stmt` to `bb`.
    pub fn add_ir_stmt(&mut self, bb: BbId, stmt: IrStmt) -> IrStmtId {
        self.prog.add_stmt(bb, stmt)
    }

    /// Appends `stmt` to `bb` and records it as the IR value of `expr`.
    pub fn add_ir_stmt_for(&mut self, bb: BbId, stmt: IrStmt, expr: ExprId) -> IrStmtId {
        let id = self.prog.add_stmt(bb, stmt);
        self.expr_map.insert(expr, id);
        id
    }

    /// Records an additional expression mapping to an already-emitted
    /// statement. Used to propagate values through `Var` uses, `Cast`, and
    /// statement-block expressions.
    pub fn map_expr(&mut self, expr: ExprId, stmt: IrStmtId) {
        self.expr_map.insert(expr, stmt);
    }

    /// The statement currently representing `expr`'s value. `None` for
    /// expressions with no IR representation (e.g. a port identifier).
    pub fn ir_stmt(&self, expr: ExprId) -> Option<IrStmtId> {
        self.expr_map.get(&expr).copied()
    }

    /// Records a minted name for a defining expression.
    pub fn set_entity_name(&mut self, def: ExprId, name: String) {
        self.entity_names.insert(def, name);
    }

    pub fn minted_entity_name(&self, def: ExprId) -> Option<&str> {
        self.entity_names.get(&def).map(String::as_str)
    }

    /// Appends an argument reference (statement id plus its value number) to
    /// a statement under construction.
    pub fn push_arg(&self, stmt: &mut IrStmt, arg: IrStmtId) {
        stmt.args.push(arg);
        stmt.arg_nums.push(self.prog.stmt(arg).valnum);
    }

    /// Appends a target reference (block id plus its label) to a statement
    /// under construction.
    pub fn push_target(&self, stmt: &mut IrStmt, bb: BbId) {
        stmt.targets.push(bb);
        stmt.target_labels.push(self.prog.bb(bb).label.clone());
    }
}

impl Default for CodeGenContext {
    fn default() -> Self {
        Self::new()
    }
}
