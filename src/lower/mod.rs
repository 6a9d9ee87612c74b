//! AST → IR code generation.
//!
//! Single forward pass over the type-checked AST, constructing SSA-form
//! basic blocks with on-the-fly phi insertion. The walker keeps a layered
//! [`BindingEnv`] mapping each `let` to the expression currently acting as
//! its value; control-flow constructs fork the environment, generate each
//! path, and merge the per-path overlays into phi nodes at the join block.
//!
//! Loop headers pre-seed a phi for every live binding with an IR value before
//! the body is generated. This trades redundant phis (elided downstream) for
//! a strict single-pass algorithm with no fix-ups: `break`/`continue` edges
//! record a binding snapshot when they leave the loop, and the snapshots are
//! folded into the header and footer phis when the loop closes.
//!
//! Failure discipline: hooks report a diagnostic to the [`ErrorCollector`]
//! and return `Err(Halted)`, which unwinds the whole walk. No recovery is
//! attempted; a collector with error entries means the program must be
//! discarded.

pub mod bindings;
pub mod context;

pub use bindings::{BindingEnv, Overlay};
pub use context::CodeGenContext;

use std::collections::BTreeMap;

use crate::ast::{Ast, AstExprKind, AstOp, AstStmtKind, ExprId, Span, StmtId};
use crate::diagnostics::ErrorCollector;
use crate::error::{CodegenError, Halted};
use crate::ir::block::BbId;
use crate::ir::program::{IrProgram, TXN_ID_WIDTH};
use crate::ir::stmt::{ExprOp, IrStmt, IrStmtId, IrStmtKind, TimeVarId};
use crate::pass::prune;

/// Generates the IR program for a translation unit.
///
/// Diagnostics go to `errors`; on `Err(Halted)` the collector holds at least
/// one error-severity entry and the partial program has been discarded.
/// After the walk, unreachable blocks are pruned and phi inputs from pruned
/// predecessors dropped.
pub fn generate(ast: &mut Ast, errors: &mut ErrorCollector) -> Result<IrProgram, Halted> {
    let mut walker = CodeGen {
        ast,
        errors,
        ctx: CodeGenContext::new(),
        funcs: Vec::new(),
    };
    walker.walk()?;
    let mut prog = walker.ctx.prog;
    prune::prune(&mut prog);
    Ok(prog)
}

/// Primitive kinds the entity resolver can trace back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Reg,
    Array,
    Port,
    Bypass,
}

/// An open `timing {}` block: its variable and the last `stage` offset seen.
#[derive(Debug, Clone, Copy)]
struct TimingFrame {
    timevar: TimeVarId,
    last_stage: i64,
}

/// An open `while` loop.
///
/// `continue_edges`/`break_edges` map each block that leaves the loop to the
/// binding overlay captured at that point; the loop folds them into header
/// and footer phis when it closes.
#[derive(Debug)]
struct LoopFrame {
    label: Option<String>,
    /// Binding level at loop entry.
    depth: usize,
    header: BbId,
    footer: BbId,
    continue_edges: Vec<(BbId, Overlay)>,
    break_edges: Vec<(BbId, Overlay)>,
}

/// Per-function walker state. Nested entry functions get a fresh context so
/// their cleanup blocks, loops and timing blocks never leak into the host.
#[derive(Debug)]
struct FunctionCtx {
    /// Cloned `on-kill-younger` bodies, re-generated at each `killyounger`.
    on_kill_youngers: Vec<StmtId>,
    loop_frames: Vec<LoopFrame>,
    timing_stack: Vec<TimingFrame>,
    /// Where the enclosing function was emitting when a nested function
    /// started; restored when it ends.
    saved_cur_bb: Option<BbId>,
}

impl FunctionCtx {
    fn new(saved_cur_bb: Option<BbId>) -> Self {
        FunctionCtx {
            on_kill_youngers: Vec::new(),
            loop_frames: Vec::new(),
            timing_stack: Vec::new(),
            saved_cur_bb,
        }
    }
}

struct CodeGen<'a> {
    ast: &'a mut Ast,
    errors: &'a mut ErrorCollector,
    ctx: CodeGenContext,
    funcs: Vec<FunctionCtx>,
}

impl From<AstOp> for ExprOp {
    fn from(op: AstOp) -> ExprOp {
        match op {
            AstOp::Add => ExprOp::Add,
            AstOp::Sub => ExprOp::Sub,
            AstOp::Mul => ExprOp::Mul,
            AstOp::Div => ExprOp::Div,
            AstOp::Rem => ExprOp::Rem,
            AstOp::And => ExprOp::And,
            AstOp::Or => ExprOp::Or,
            AstOp::Not => ExprOp::Not,
            AstOp::Xor => ExprOp::Xor,
            AstOp::Lsh => ExprOp::Lsh,
            AstOp::Rsh => ExprOp::Rsh,
            AstOp::Sel => ExprOp::Select,
            AstOp::Bitslice => ExprOp::Bitslice,
            AstOp::Concat => ExprOp::Concat,
            AstOp::Eq => ExprOp::CmpEq,
            AstOp::Ne => ExprOp::CmpNe,
            AstOp::Le => ExprOp::CmpLe,
            AstOp::Lt => ExprOp::CmpLt,
            AstOp::Ge => ExprOp::CmpGe,
            AstOp::Gt => ExprOp::CmpGt,
        }
    }
}

impl<'a> CodeGen<'a> {
    // --- small helpers -----------------------------------------------------

    fn err(&mut self, span: Span, error: CodegenError) -> Halted {
        self.errors.report(span, error);
        Halted
    }

    fn fctx(&mut self) -> &mut FunctionCtx {
        self.funcs
            .last_mut()
            .expect("walker: active function context")
    }

    /// A fresh statement claiming the next value number.
    fn new_stmt(&mut self, kind: IrStmtKind, width: u32) -> IrStmt {
        IrStmt::new(kind, self.ctx.valnum(), width)
    }

    fn emit_in_cur(&mut self, stmt: IrStmt) -> IrStmtId {
        let bb = self.ctx.cur_bb();
        self.ctx.add_ir_stmt(bb, stmt)
    }

    /// The IR value of an already-generated expression. Expressions that are
    /// used as values are guaranteed one by the upstream type checker.
    fn ir_of(&self, expr: ExprId) -> IrStmtId {
        self.ctx
            .ir_stmt(expr)
            .expect("type-checked expression has an IR value after generation")
    }

    /// The wire name of a resolved defining expression: the source-given name
    /// of an exported port, or the name minted when the definition was
    /// visited.
    fn entity_name(&self, def: ExprId) -> String {
        if let AstExprKind::PortDef { name: Some(n), .. } = &self.ast.expr(def).kind {
            return n.clone();
        }
        self.ctx
            .minted_entity_name(def)
            .expect("entity name minted before first use")
            .to_owned()
    }

    /// Traces `expr` back to its defining primitive through `let` bindings.
    /// Anything other than a direct chain of `Var`s is a front-end error:
    /// primitives reached through computation cannot be resolved statically.
    fn find_entity_def(
        &mut self,
        expr: ExprId,
        kind: EntityKind,
        origin: ExprId,
    ) -> Result<ExprId, Halted> {
        let matches = match (&self.ast.expr(expr).kind, kind) {
            (AstExprKind::RegInit, EntityKind::Reg) => true,
            (AstExprKind::ArrayInit, EntityKind::Array) => true,
            (AstExprKind::PortDef { .. }, EntityKind::Port) => true,
            (AstExprKind::BypassDef, EntityKind::Bypass) => true,
            _ => false,
        };
        if matches {
            return Ok(expr);
        }
        let var_def = match &self.ast.expr(expr).kind {
            AstExprKind::Var { def } => Some(*def),
            _ => None,
        };
        if let Some(def) = var_def {
            if let Some(binding) = self.ctx.bindings.get(def) {
                return self.find_entity_def(binding, kind, origin);
            }
        }
        let span = self.ast.expr(origin).span;
        Err(self.err(span, CodegenError::EntityNotStatic))
    }

    // --- driver ------------------------------------------------------------

    fn walk(&mut self) -> Result<(), Halted> {
        for i in 0..self.ast.functions.len() {
            let func = self.ast.functions[i].clone();
            // Non-entry functions are not code-generated at all.
            if !func.is_entry {
                continue;
            }

            self.funcs.push(FunctionCtx::new(None));

            // The entry block is named after the function itself.
            let bb = self.ctx.add_bb(None);
            self.ctx.prog.bb_mut(bb).label = func.name.clone();
            self.ctx.prog.bb_mut(bb).is_entry = true;
            self.ctx.prog.add_entry(bb);
            self.ctx.set_cur_bb(bb);

            self.walk_stmt(func.body)?;

            // Implicit 'done' in case the body did not end the transaction.
            let done = self.new_stmt(IrStmtKind::Done, 0);
            self.emit_in_cur(done);

            self.funcs.pop();
        }
        Ok(())
    }

    fn walk_stmt(&mut self, id: StmtId) -> Result<(), Halted> {
        let span = self.ast.stmt(id).span;
        match self.ast.stmt(id).kind.clone() {
            AstStmtKind::Block { stmts } => {
                for s in stmts {
                    self.walk_stmt(s)?;
                }
                Ok(())
            }
            AstStmtKind::Let { init, .. } => {
                self.walk_expr(init)?;
                self.ctx.bindings.set(id, init);
                Ok(())
            }
            AstStmtKind::Assign { lhs, rhs } => self.gen_assign(lhs, rhs, span),
            AstStmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.gen_if(cond, then_body, else_body, span),
            AstStmtKind::While { label, cond, body } => self.gen_while(label, cond, body, span),
            AstStmtKind::Break { label } => self.gen_break_continue(label, true, span),
            AstStmtKind::Continue { label } => self.gen_break_continue(label, false, span),
            AstStmtKind::Write { port, value } => {
                self.walk_expr(port)?;
                self.walk_expr(value)?;
                self.gen_write(port, value, span)
            }
            AstStmtKind::Spawn { body } => self.gen_spawn(body),
            AstStmtKind::Kill => {
                let stmt = self.new_stmt(IrStmtKind::Kill, 0);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstStmtKind::KillYounger => self.gen_kill_younger(),
            AstStmtKind::KillIf { cond } => {
                self.walk_expr(cond)?;
                self.verify_no_side_effects(cond)?;
                let cond_ir = self.ir_of(cond);
                let mut stmt = self.new_stmt(IrStmtKind::KillIf, 0);
                self.ctx.push_arg(&mut stmt, cond_ir);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstStmtKind::OnKillYounger { body } => {
                // Clone the block now; each later killyounger re-generates the
                // clone with the bindings live at that site. The definition
                // site itself emits nothing.
                let clone = self.ast.deep_clone_stmt(body);
                self.fctx().on_kill_youngers.push(clone);
                Ok(())
            }
            AstStmtKind::Timing { body } => self.gen_timing(body),
            AstStmtKind::Stage { offset } => self.gen_stage(offset, span),
            AstStmtKind::BypassStart { bypass, index } => {
                self.walk_expr(bypass)?;
                self.walk_expr(index)?;
                let def = self.find_entity_def(bypass, EntityKind::Bypass, bypass)?;
                let index_ir = self.ir_of(index);
                let mut stmt = self.new_stmt(IrStmtKind::BypassStart, 0);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, index_ir);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstStmtKind::BypassEnd { bypass } => {
                self.walk_expr(bypass)?;
                let def = self.find_entity_def(bypass, EntityKind::Bypass, bypass)?;
                let mut stmt = self.new_stmt(IrStmtKind::BypassEnd, 0);
                stmt.port_name = Some(self.entity_name(def));
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstStmtKind::BypassWrite { bypass, value } => {
                self.walk_expr(bypass)?;
                self.walk_expr(value)?;
                let def = self.find_entity_def(bypass, EntityKind::Bypass, bypass)?;
                let value_ir = self.ir_of(value);
                let width = self.ctx.prog.stmt(value_ir).width;
                let mut stmt = self.new_stmt(IrStmtKind::BypassWrite, width);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, value_ir);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstStmtKind::NestedFunc { body } => self.gen_nested_func(body),
            AstStmtKind::Expr { expr } => self.walk_expr(expr),
            AstStmtKind::Pragma { key, value } => {
                if key == "timing_model" {
                    self.ctx.prog.timing_model = Some(value);
                }
                Ok(())
            }
        }
    }

    fn walk_expr(&mut self, id: ExprId) -> Result<(), Halted> {
        let span = self.ast.expr(id).span;
        let ty = self.ast.expr(id).ty;
        match self.ast.expr(id).kind.clone() {
            AstExprKind::Op { op, args } => {
                for &a in &args {
                    self.walk_expr(a)?;
                }
                let mut stmt = self.new_stmt(IrStmtKind::Expr(op.into()), ty.width);
                for &a in &args {
                    let arg_ir = self.ir_of(a);
                    self.ctx.push_arg(&mut stmt, arg_ir);
                }
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::Const(value) => {
                let mut stmt = self.new_stmt(IrStmtKind::Expr(ExprOp::Const), ty.width);
                stmt.imm = Some(value);
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::Var { def } => {
                // Pass the current binding's value through. Bindings without
                // an IR value (ports, chans) contribute no mapping; their
                // uses are resolved through the entity tracer instead.
                if let Some(binding) = self.ctx.bindings.get(def) {
                    if let Some(ir) = self.ctx.ir_stmt(binding) {
                        self.ctx.map_expr(id, ir);
                    }
                }
                Ok(())
            }
            AstExprKind::PortDef { name, .. } => {
                match name {
                    Some(port_name) => {
                        // A source-given name means the port is exported.
                        if ty.is_chan {
                            return Err(self.err(span, CodegenError::NamedChan));
                        }
                        let mut stmt = self.new_stmt(IrStmtKind::PortExport, ty.width);
                        stmt.port_name = Some(port_name);
                        self.emit_in_cur(stmt);
                    }
                    None => {
                        // Anonymous: name it, but don't export it.
                        let minted = self.ctx.gensym(None);
                        self.ctx.set_entity_name(id, minted);
                    }
                }
                Ok(())
            }
            AstExprKind::PortRead { port } => {
                self.walk_expr(port)?;
                let def = self.find_entity_def(port, EntityKind::Port, id)?;
                let def_ty = self.ast.expr(def).ty;
                let kind = if def_ty.is_port {
                    IrStmtKind::PortRead
                } else if def_ty.is_chan {
                    IrStmtKind::ChanRead
                } else {
                    // The type checker rejects this earlier; keep the check.
                    return Err(self.err(span, CodegenError::ReadNotPortOrChan));
                };
                let mut stmt = self.new_stmt(kind, def_ty.width);
                stmt.port_name = Some(self.entity_name(def));
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::ArrayInit => {
                let minted = self.ctx.gensym(Some("array"));
                self.ctx.set_entity_name(id, minted.clone());
                let mut stmt = self.new_stmt(IrStmtKind::ArraySize, 0);
                stmt.port_name = Some(minted);
                stmt.imm = Some(ty.array_size.unwrap_or(0));
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstExprKind::ArrayRef { array, index } => {
                self.walk_expr(array)?;
                self.walk_expr(index)?;
                let def = self.find_entity_def(array, EntityKind::Array, id)?;
                let index_ir = self.ir_of(index);
                let mut stmt = self.new_stmt(IrStmtKind::ArrayRead, ty.width);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, index_ir);
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::RegInit => {
                let minted = self.ctx.gensym(Some("reg"));
                self.ctx.set_entity_name(id, minted);
                Ok(())
            }
            AstExprKind::RegRef { reg } => {
                self.walk_expr(reg)?;
                let def = self.find_entity_def(reg, EntityKind::Reg, id)?;
                let mut stmt = self.new_stmt(IrStmtKind::RegRead, ty.width);
                stmt.port_name = Some(self.entity_name(def));
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::BypassDef => {
                let minted = self.ctx.gensym(Some("bypass"));
                self.ctx.set_entity_name(id, minted);
                Ok(())
            }
            AstExprKind::BypassPresent { bypass, index }
            | AstExprKind::BypassReady { bypass, index }
            | AstExprKind::BypassRead { bypass, index } => {
                self.walk_expr(bypass)?;
                self.walk_expr(index)?;
                let def = self.find_entity_def(bypass, EntityKind::Bypass, id)?;
                let kind = match &self.ast.expr(id).kind {
                    AstExprKind::BypassPresent { .. } => IrStmtKind::BypassPresent,
                    AstExprKind::BypassReady { .. } => IrStmtKind::BypassReady,
                    _ => IrStmtKind::BypassRead,
                };
                let index_ir = self.ir_of(index);
                let mut stmt = self.new_stmt(kind, ty.width);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, index_ir);
                let bb = self.ctx.cur_bb();
                self.ctx.add_ir_stmt_for(bb, stmt, id);
                Ok(())
            }
            AstExprKind::StmtBlock { block } => {
                self.walk_stmt(block)?;
                // The block's value is the value of its final expression
                // statement.
                let last = match &self.ast.stmt(block).kind {
                    AstStmtKind::Block { stmts } => stmts.last().copied(),
                    _ => None,
                };
                let value = last.and_then(|s| match &self.ast.stmt(s).kind {
                    AstStmtKind::Expr { expr } => Some(*expr),
                    _ => None,
                });
                let Some(value) = value else {
                    return Err(self.err(span, CodegenError::StmtBlockNotExpr));
                };
                if let Some(ir) = self.ctx.ir_stmt(value) {
                    self.ctx.map_expr(id, ir);
                }
                Ok(())
            }
            AstExprKind::Cast { arg } => {
                // Widths match by construction, so a cast is only an alias.
                self.walk_expr(arg)?;
                if let Some(ir) = self.ctx.ir_stmt(arg) {
                    self.ctx.map_expr(id, ir);
                }
                Ok(())
            }
            AstExprKind::FieldRef { .. } => {
                Err(self.err(span, CodegenError::FieldRefNotDesugared))
            }
            AstExprKind::Nop => Ok(()),
        }
    }

    // --- assignment and writes ---------------------------------------------

    fn gen_assign(&mut self, lhs: ExprId, rhs: ExprId, span: Span) -> Result<(), Halted> {
        // Only the RHS is generated by traversal; generating the LHS would
        // turn the write into a read.
        self.walk_expr(rhs)?;

        match self.ast.expr(lhs).kind.clone() {
            AstExprKind::Var { def } => {
                // Rebind the let to the RHS expression.
                self.ctx.bindings.set(def, rhs);
                Ok(())
            }
            AstExprKind::RegRef { reg } => {
                let def = self.find_entity_def(reg, EntityKind::Reg, lhs)?;
                let width = self.ast.expr(def).ty.width;
                let value_ir = self.ir_of(rhs);
                let mut stmt = self.new_stmt(IrStmtKind::RegWrite, width);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, value_ir);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstExprKind::ArrayRef { array, index } => {
                // The array must be reachable as a direct variable; arrays
                // nested in other lvalues are not supported.
                let def = self.find_entity_def(array, EntityKind::Array, lhs)?;
                // The index is generated here because the LHS subtree was
                // skipped above.
                self.walk_expr(index)?;
                let index_ir = self.ir_of(index);
                let value_ir = self.ir_of(rhs);
                let width = self.ast.expr(rhs).ty.width;
                let mut stmt = self.new_stmt(IrStmtKind::ArrayWrite, width);
                stmt.port_name = Some(self.entity_name(def));
                self.ctx.push_arg(&mut stmt, index_ir);
                self.ctx.push_arg(&mut stmt, value_ir);
                self.emit_in_cur(stmt);
                Ok(())
            }
            AstExprKind::FieldRef { .. } => {
                Err(self.err(span, CodegenError::FieldRefNotDesugared))
            }
            _ => Err(self.err(span, CodegenError::BadLvalue)),
        }
    }

    fn gen_write(&mut self, port: ExprId, value: ExprId, span: Span) -> Result<(), Halted> {
        let def = self.find_entity_def(port, EntityKind::Port, port)?;
        let def_expr = self.ast.expr(def);
        let def_ty = def_expr.ty;
        let default = match &def_expr.kind {
            AstExprKind::PortDef { default, .. } => *default,
            _ => None,
        };
        let kind = if def_ty.is_port {
            IrStmtKind::PortWrite
        } else if def_ty.is_chan {
            IrStmtKind::ChanWrite
        } else {
            return Err(self.err(span, CodegenError::WriteNotPortOrChan));
        };
        let value_ir = self.ir_of(value);
        let width = self.ast.expr(value).ty.width;
        let mut stmt = self.new_stmt(kind, width);
        stmt.port_name = Some(self.entity_name(def));
        stmt.imm = default;
        self.ctx.push_arg(&mut stmt, value_ir);
        self.emit_in_cur(stmt);
        Ok(())
    }

    // --- kill family -------------------------------------------------------

    fn gen_kill_younger(&mut self) -> Result<(), Halted> {
        let stmt = self.new_stmt(IrStmtKind::KillYounger, 0);
        self.emit_in_cur(stmt);

        // Re-generate every registered cleanup block at this site, in
        // registration order, with the bindings live here.
        let cleanups = self.fctx().on_kill_youngers.clone();
        for block in cleanups {
            self.walk_stmt(block)?;
        }
        Ok(())
    }

    /// A kill-if condition may only contain computation over simple reads:
    /// statement blocks and array reads could perform side effects, which
    /// must not happen speculatively under a kill predicate.
    fn verify_no_side_effects(&mut self, expr: ExprId) -> Result<(), Halted> {
        let span = self.ast.expr(expr).span;
        match self.ast.expr(expr).kind.clone() {
            AstExprKind::StmtBlock { .. } | AstExprKind::ArrayRef { .. } => {
                Err(self.err(span, CodegenError::KillIfSideEffect))
            }
            AstExprKind::Op { args, .. } => {
                for a in args {
                    self.verify_no_side_effects(a)?;
                }
                Ok(())
            }
            AstExprKind::PortRead { port } => self.verify_no_side_effects(port),
            AstExprKind::RegRef { reg } => self.verify_no_side_effects(reg),
            AstExprKind::BypassPresent { bypass, index }
            | AstExprKind::BypassReady { bypass, index }
            | AstExprKind::BypassRead { bypass, index } => {
                self.verify_no_side_effects(bypass)?;
                self.verify_no_side_effects(index)
            }
            AstExprKind::Cast { arg } => self.verify_no_side_effects(arg),
            AstExprKind::FieldRef { base, .. } => self.verify_no_side_effects(base),
            AstExprKind::Const(_)
            | AstExprKind::Var { .. }
            | AstExprKind::PortDef { .. }
            | AstExprKind::RegInit
            | AstExprKind::ArrayInit
            | AstExprKind::BypassDef
            | AstExprKind::Nop => Ok(()),
        }
    }

    // --- if/else -----------------------------------------------------------

    fn gen_if(
        &mut self,
        cond: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
        span: Span,
    ) -> Result<(), Halted> {
        let if_bb = self.ctx.add_bb(Some("if_body"));
        let else_bb = self.ctx.add_bb(Some("else_body"));

        // Condition is generated in the head block.
        self.walk_expr(cond)?;
        let cond_ir = self.ir_of(cond);

        let mut br = self.new_stmt(IrStmtKind::If, 0);
        self.ctx.push_arg(&mut br, cond_ir);
        self.ctx.push_target(&mut br, if_bb);
        self.ctx.push_target(&mut br, else_bb);
        self.emit_in_cur(br);

        // Each side runs under its own binding layer; the overlays are the
        // raw material for the merge phis.
        let level = self.ctx.bindings.push();
        self.ctx.set_cur_bb(if_bb);
        self.walk_stmt(then_body)?;
        let if_overlay = self.ctx.bindings.overlay(level);
        self.ctx.bindings.pop_to(level);
        // The side may have ended in a different block than it started in.
        let if_end = self.ctx.cur_bb();

        let level = self.ctx.bindings.push();
        self.ctx.set_cur_bb(else_bb);
        if let Some(else_body) = else_body {
            self.walk_stmt(else_body)?;
        }
        let else_overlay = self.ctx.bindings.overlay(level);
        self.ctx.bindings.pop_to(level);
        let else_end = self.ctx.cur_bb();

        // Merge point: jump in from both sides, then phi every rebinding.
        let merge_bb = self.ctx.add_bb(Some("if_else_merge"));
        self.ctx.set_cur_bb(merge_bb);

        let mut if_jmp = self.new_stmt(IrStmtKind::Jmp, 0);
        self.ctx.push_target(&mut if_jmp, merge_bb);
        self.ctx.add_ir_stmt(if_end, if_jmp);

        let mut else_jmp = self.new_stmt(IrStmtKind::Jmp, 0);
        self.ctx.push_target(&mut else_jmp, merge_bb);
        self.ctx.add_ir_stmt(else_end, else_jmp);

        let join = self
            .ctx
            .bindings
            .join_overlays(&[if_overlay, else_overlay]);

        for (let_id, values) in join {
            let if_val = self.ctx.ir_stmt(values[0]);
            let else_val = self.ctx.ir_stmt(values[1]);
            let (if_val, else_val) = match (if_val, else_val) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(self.err(span, CodegenError::IfJoinWithoutIr)),
            };

            let width = self.ctx.prog.stmt(if_val).width;
            let mut phi = self.new_stmt(IrStmtKind::Phi, width);
            self.ctx.push_arg(&mut phi, if_val);
            self.ctx.push_arg(&mut phi, else_val);
            self.ctx.push_target(&mut phi, if_end);
            self.ctx.push_target(&mut phi, else_end);
            let phi_id = self.ctx.add_ir_stmt(merge_bb, phi);

            // Give the phi result an expression identity and rebind the let
            // to it, so later uses find the merged value.
            let ty = self.ast.expr(values[0]).ty;
            let phi_expr = self.ast.add_expr(AstExprKind::Nop, ty, Span::default());
            self.ctx.map_expr(phi_expr, phi_id);
            self.ctx.bindings.set(let_id, phi_expr);
        }

        Ok(())
    }

    // --- while / break / continue ------------------------------------------

    fn gen_while(
        &mut self,
        label: Option<String>,
        cond: ExprId,
        body: StmtId,
        span: Span,
    ) -> Result<(), Halted> {
        let fi = self.funcs.len() - 1;
        let depth = self.ctx.bindings.push();

        let prefix = label.clone().unwrap_or_else(|| "while".to_owned());
        let header = self.ctx.add_bb(Some(&format!("{}_header", prefix)));
        let footer = self.ctx.add_bb(Some(&format!("{}_footer", prefix)));

        self.funcs[fi].loop_frames.push(LoopFrame {
            label,
            depth,
            header,
            footer,
            continue_edges: Vec::new(),
            break_edges: Vec::new(),
        });

        // Enter the loop: jump from the preceding block to the header.
        let in_bb = self.ctx.cur_bb();
        let mut in_jmp = self.new_stmt(IrStmtKind::Jmp, 0);
        self.ctx.push_target(&mut in_jmp, header);
        self.ctx.add_ir_stmt(in_bb, in_jmp);

        self.ctx.set_cur_bb(header);

        // Pre-seed a phi for every live binding with an IR value. Doing this
        // up front keeps the algorithm single-pass: no pre-scan for writes,
        // no fix-ups. Redundant phis are elided downstream. Inputs from
        // continue edges are added after the body is generated.
        let mut binding_phis: BTreeMap<StmtId, IrStmtId> = BTreeMap::new();
        for let_id in self.ctx.bindings.keys() {
            let Some(binding) = self.ctx.bindings.get(let_id) else {
                continue;
            };
            // Bindings without an IR value (ports, chans) get no phi;
            // rebinding one inside the body is reported when the loop closes.
            let Some(binding_ir) = self.ctx.ir_stmt(binding) else {
                continue;
            };

            let width = self.ctx.prog.stmt(binding_ir).width;
            let mut phi = self.new_stmt(IrStmtKind::Phi, width);
            self.ctx.push_target(&mut phi, in_bb);
            self.ctx.push_arg(&mut phi, binding_ir);
            let phi_id = self.ctx.add_ir_stmt(header, phi);
            binding_phis.insert(let_id, phi_id);

            let ty = self.ast.expr(binding).ty;
            let phi_expr = self.ast.add_expr(AstExprKind::Nop, ty, Span::default());
            self.ctx.map_expr(phi_expr, phi_id);
            self.ctx.bindings.set(let_id, phi_expr);
        }

        // Loop condition lives in the header.
        self.walk_expr(cond)?;
        let cond_ir = self.ir_of(cond);

        let body_bb = self.ctx.add_bb(Some(&format!("{}_body", prefix)));

        let mut cond_br = self.new_stmt(IrStmtKind::If, 0);
        self.ctx.push_arg(&mut cond_br, cond_ir);
        self.ctx.push_target(&mut cond_br, body_bb);
        self.ctx.push_target(&mut cond_br, footer);
        self.ctx.add_ir_stmt(header, cond_br);

        // The loop-condition-false exit is an implicit break edge.
        let overlay = self.ctx.bindings.overlay(depth);
        self.funcs[fi]
            .loop_frames
            .last_mut()
            .expect("walker: loop frame open during body")
            .break_edges
            .push((header, overlay));

        self.ctx.set_cur_bb(body_bb);
        self.walk_stmt(body)?;

        // Implicit continue at the end of the body.
        let body_end = self.ctx.cur_bb();
        let mut back_jmp = self.new_stmt(IrStmtKind::Jmp, 0);
        self.ctx.push_target(&mut back_jmp, header);
        self.ctx.add_ir_stmt(body_end, back_jmp);

        let overlay = self.ctx.bindings.overlay(depth);
        self.funcs[fi]
            .loop_frames
            .last_mut()
            .expect("walker: loop frame open during body")
            .continue_edges
            .push((body_end, overlay));

        self.ctx.bindings.pop_to(depth);

        let frame = self.funcs[fi]
            .loop_frames
            .pop()
            .expect("walker: loop frame open during body");

        // Fold every continue edge into the header phis, and every break
        // edge into fresh footer phis.
        self.add_header_phi_inputs(span, &binding_phis, &frame.continue_edges)?;
        self.add_footer_phis(span, frame.footer, &frame.break_edges)?;

        self.ctx.set_cur_bb(frame.footer);
        Ok(())
    }

    fn add_header_phi_inputs(
        &mut self,
        span: Span,
        binding_phis: &BTreeMap<StmtId, IrStmtId>,
        edges: &[(BbId, Overlay)],
    ) -> Result<(), Halted> {
        let maps: Vec<Overlay> = edges.iter().map(|(_, m)| m.clone()).collect();
        let join = self.ctx.bindings.join_overlays(&maps);

        for (let_id, values) in join {
            let phi_id = match binding_phis.get(&let_id) {
                Some(&phi) => phi,
                None => {
                    // A let declared inside the body carries no value across
                    // the back edge; skip it. Anything else here is a binding
                    // that had no IR value at loop entry (a port) and was
                    // reassigned in the body.
                    if self.ctx.bindings.get(let_id).is_none() {
                        continue;
                    }
                    return Err(self.err(span, CodegenError::LoopJoinWithoutIr));
                }
            };
            for (i, value) in values.iter().enumerate() {
                let Some(in_val) = self.ctx.ir_stmt(*value) else {
                    return Err(self.err(span, CodegenError::LoopJoinWithoutIr));
                };
                let in_bb = edges[i].0;
                let in_num = self.ctx.prog.stmt(in_val).valnum;
                let width = self.ctx.prog.stmt(in_val).width;
                let label = self.ctx.prog.bb(in_bb).label.clone();
                let phi = self.ctx.prog.stmt_mut(phi_id);
                phi.args.push(in_val);
                phi.arg_nums.push(in_num);
                phi.targets.push(in_bb);
                phi.target_labels.push(label);
                phi.width = width;
            }
        }
        Ok(())
    }

    fn add_footer_phis(
        &mut self,
        span: Span,
        footer: BbId,
        edges: &[(BbId, Overlay)],
    ) -> Result<(), Halted> {
        let maps: Vec<Overlay> = edges.iter().map(|(_, m)| m.clone()).collect();
        let join = self.ctx.bindings.join_overlays(&maps);

        for (let_id, values) in join {
            // Body-local lets are out of scope past the loop.
            if self.ctx.bindings.get(let_id).is_none() {
                continue;
            }

            let mut phi = self.new_stmt(IrStmtKind::Phi, 0);
            for (i, value) in values.iter().enumerate() {
                let Some(in_val) = self.ctx.ir_stmt(*value) else {
                    return Err(self.err(span, CodegenError::LoopJoinWithoutIr));
                };
                phi.width = self.ctx.prog.stmt(in_val).width;
                self.ctx.push_arg(&mut phi, in_val);
                self.ctx.push_target(&mut phi, edges[i].0);
            }
            let phi_id = self.ctx.add_ir_stmt(footer, phi);

            let ty = self.ast.expr(values[0]).ty;
            let phi_expr = self.ast.add_expr(AstExprKind::Nop, ty, Span::default());
            self.ctx.map_expr(phi_expr, phi_id);
            self.ctx.bindings.set(let_id, phi_expr);
        }
        Ok(())
    }

    fn gen_break_continue(
        &mut self,
        label: Option<String>,
        is_break: bool,
        span: Span,
    ) -> Result<(), Halted> {
        let fi = self.funcs.len() - 1;
        let frames = &self.funcs[fi].loop_frames;
        let frame_idx = match &label {
            Some(name) => {
                match frames
                    .iter()
                    .rposition(|f| f.label.as_deref() == Some(name.as_str()))
                {
                    Some(idx) => idx,
                    None => {
                        let label = name.clone();
                        return Err(self.err(span, CodegenError::UnknownLoopLabel { label }));
                    }
                }
            }
            None => {
                if frames.is_empty() {
                    return Err(self.err(span, CodegenError::BreakOutsideLoop));
                }
                frames.len() - 1
            }
        };

        let frame = &self.funcs[fi].loop_frames[frame_idx];
        let depth = frame.depth;
        let target = if is_break { frame.footer } else { frame.header };

        // Capture the bindings at this exit point, then fork a new layer so
        // code after the break (which is unreachable) cannot disturb them.
        let snapshot = self.ctx.bindings.overlay(depth);
        self.ctx.bindings.push();

        let cur = self.ctx.cur_bb();
        let edges = if is_break {
            &mut self.funcs[fi].loop_frames[frame_idx].break_edges
        } else {
            &mut self.funcs[fi].loop_frames[frame_idx].continue_edges
        };
        edges.push((cur, snapshot));

        let mut jmp = self.new_stmt(IrStmtKind::Jmp, 0);
        self.ctx.push_target(&mut jmp, target);
        self.ctx.add_ir_stmt(cur, jmp);

        // Keep the cursor valid: anything emitted after the break lands in a
        // block the reachability pass will drop.
        let unreachable = self.ctx.add_bb(Some("unreachable"));
        self.ctx.set_cur_bb(unreachable);
        Ok(())
    }

    // --- spawn and nested functions ----------------------------------------

    fn gen_spawn(&mut self, body: StmtId) -> Result<(), Halted> {
        let cur = self.ctx.cur_bb();
        let spawn_bb = self.ctx.add_bb(Some("spawn"));

        let mut stmt = self.new_stmt(IrStmtKind::Spawn, TXN_ID_WIDTH);
        self.ctx.push_target(&mut stmt, spawn_bb);
        self.ctx.add_ir_stmt(cur, stmt);

        // The spawned path runs under its own binding layer and always ends
        // by aborting its transaction.
        self.ctx.set_cur_bb(spawn_bb);
        let level = self.ctx.bindings.push();
        self.walk_stmt(body)?;
        self.ctx.bindings.pop_to(level);

        let kill = self.new_stmt(IrStmtKind::Kill, 0);
        self.emit_in_cur(kill);

        // Generation continues on the spawning path.
        self.ctx.set_cur_bb(cur);
        Ok(())
    }

    fn gen_nested_func(&mut self, body: StmtId) -> Result<(), Halted> {
        let saved = self.ctx.cur_bb();
        self.funcs.push(FunctionCtx::new(Some(saved)));

        let entry = self.ctx.add_bb(Some("anon_func"));
        self.ctx.prog.bb_mut(entry).is_entry = true;
        self.ctx.prog.add_entry(entry);
        self.ctx.set_cur_bb(entry);

        self.walk_stmt(body)?;

        let done = self.new_stmt(IrStmtKind::Done, 0);
        self.emit_in_cur(done);

        let fctx = self.funcs.pop().expect("walker: nested function context");
        self.ctx.set_cur_bb(
            fctx.saved_cur_bb
                .expect("nested function saved the host cursor"),
        );
        Ok(())
    }

    // --- timing ------------------------------------------------------------

    fn emit_barrier(&mut self, timevar: TimeVarId, offset: i64) {
        let mut stmt = self.new_stmt(IrStmtKind::TimingBarrier, 0);
        stmt.timevar = Some(timevar);
        stmt.imm = Some(offset);
        let id = self.emit_in_cur(stmt);
        self.ctx.prog.timevar_mut(timevar).uses.push(id);
    }

    fn gen_timing(&mut self, body: StmtId) -> Result<(), Halted> {
        let name = self.ctx.gensym(Some("timing"));
        let timevar = self.ctx.prog.add_timevar(name);
        self.fctx().timing_stack.push(TimingFrame {
            timevar,
            last_stage: 0,
        });

        // Implicit barrier opening the block at offset 0.
        self.emit_barrier(timevar, 0);

        self.walk_stmt(body)?;

        // Implicit barrier closing the block at the last stage's offset, so
        // the final stage cannot leak into later stages.
        let frame = self
            .fctx()
            .timing_stack
            .pop()
            .expect("walker: timing frame open during body");
        self.emit_barrier(frame.timevar, frame.last_stage);
        Ok(())
    }

    fn gen_stage(&mut self, offset: i64, span: Span) -> Result<(), Halted> {
        let Some(&TimingFrame {
            timevar,
            last_stage,
        }) = self.fctx().timing_stack.last()
        else {
            return Err(self.err(span, CodegenError::StageOutsideTiming));
        };

        // Two barriers: one anchored to the previous stage's offset to
        // late-constrain everything before this point, one anchored to this
        // stage's offset to early-constrain everything after it.
        self.emit_barrier(timevar, last_stage);
        self.emit_barrier(timevar, offset);

        self.fctx()
            .timing_stack
            .last_mut()
            .expect("walker: timing frame open during body")
            .last_stage = offset;
        Ok(())
    }
}
