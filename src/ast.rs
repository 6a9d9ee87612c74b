//! Type-annotated AST consumed by the code generator.
//!
//! The AST is produced by the parser and annotated by the type checker, both
//! of which live upstream of this crate. Nodes are stored in arenas on [`Ast`]
//! and referenced by [`ExprId`]/[`StmtId`]; a `Var` expression carries the
//! `StmtId` of its defining `let`, which is the identity the code generator's
//! binding environment is keyed on.
//!
//! Requirements on the input (guaranteed by the upstream passes):
//! - every expression carries its inferred [`Type`];
//! - every `Var` resolves to a `Let` statement;
//! - `Cast` preserves width;
//! - aggregate field writes have been desugared to whole-value reassignment.

use std::collections::HashMap;
use std::fmt;

/// A byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

/// Index of an expression in [`Ast::exprs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Index of a statement in [`Ast::stmts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The inferred type attached to every expression.
///
/// Widths are in bits. `is_port`/`is_chan` distinguish the two signal-carrier
/// flavors; `array_size` is set only on `ArrayInit` expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Type {
    pub width: u32,
    pub is_port: bool,
    pub is_chan: bool,
    pub array_size: Option<i64>,
}

impl Type {
    /// A plain value type of the given width.
    pub fn value(width: u32) -> Self {
        Type {
            width,
            ..Type::default()
        }
    }

    pub fn port(width: u32) -> Self {
        Type {
            width,
            is_port: true,
            ..Type::default()
        }
    }

    pub fn chan(width: u32) -> Self {
        Type {
            width,
            is_chan: true,
            ..Type::default()
        }
    }

    pub fn array(width: u32, size: i64) -> Self {
        Type {
            width,
            array_size: Some(size),
            ..Type::default()
        }
    }
}

/// Operators with a one-to-one IR statement mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Not,
    Xor,
    Lsh,
    Rsh,
    /// `sel(cond, a, b)`: bit mux.
    Sel,
    /// `x[hi:lo]` with constant bounds.
    Bitslice,
    Concat,
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
}

#[derive(Debug, Clone)]
pub enum AstExprKind {
    Const(i64),
    /// A variable use; `def` is the `Let` statement that introduced it.
    Var { def: StmtId },
    Op { op: AstOp, args: Vec<ExprId> },

    /// Port definition. `name: Some(..)` means the port is exported under a
    /// source-given name; anonymous ports get a generated name during codegen.
    /// `default` is the port's constant default value, if declared.
    PortDef {
        name: Option<String>,
        default: Option<i64>,
    },
    PortRead { port: ExprId },

    RegInit,
    RegRef { reg: ExprId },

    ArrayInit,
    ArrayRef { array: ExprId, index: ExprId },

    BypassDef,
    BypassPresent { bypass: ExprId, index: ExprId },
    BypassReady { bypass: ExprId, index: ExprId },
    BypassRead { bypass: ExprId, index: ExprId },

    /// A block used in expression position; its last statement must be an
    /// expression statement, which provides the value.
    StmtBlock { block: StmtId },
    /// Should not survive desugaring; reaching codegen is an error.
    FieldRef { base: ExprId, field: String },
    /// Width-preserving cast; carries no computation.
    Cast { arg: ExprId },

    /// Synthetic placeholder minted by the code generator to give phi results
    /// an expression identity. Never produced by the parser.
    Nop,
}

#[derive(Debug, Clone)]
pub struct AstExpr {
    pub kind: AstExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum AstStmtKind {
    Block { stmts: Vec<StmtId> },
    Let { name: String, init: ExprId },
    Assign { lhs: ExprId, rhs: ExprId },
    If {
        cond: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    While {
        label: Option<String>,
        cond: ExprId,
        body: StmtId,
    },
    Break { label: Option<String> },
    Continue { label: Option<String> },
    Write { port: ExprId, value: ExprId },
    Spawn { body: StmtId },
    Kill,
    KillYounger,
    KillIf { cond: ExprId },
    /// Registers a cleanup block re-generated at every later `killyounger`.
    OnKillYounger { body: StmtId },
    Timing { body: StmtId },
    Stage { offset: i64 },
    BypassStart { bypass: ExprId, index: ExprId },
    BypassEnd { bypass: ExprId },
    BypassWrite { bypass: ExprId, value: ExprId },
    /// An entry function defined inline in statement position.
    NestedFunc { body: StmtId },
    Expr { expr: ExprId },
    Pragma { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct AstStmt {
    pub kind: AstStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct AstFunction {
    pub name: String,
    /// Only entry functions are code-generated.
    pub is_entry: bool,
    pub body: StmtId,
}

/// The translation unit: top-level functions plus the node arenas.
///
/// The arenas are append-only; codegen may add synthetic expressions and
/// cloned statement subtrees but never rewrites existing nodes.
#[derive(Debug, Default)]
pub struct Ast {
    pub exprs: Vec<AstExpr>,
    pub stmts: Vec<AstStmt>,
    pub functions: Vec<AstFunction>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr(&self, id: ExprId) -> &AstExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &AstStmt {
        &self.stmts[id.0 as usize]
    }

    pub fn add_expr(&mut self, kind: AstExprKind, ty: Type, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(AstExpr { kind, ty, span });
        id
    }

    pub fn add_stmt(&mut self, kind: AstStmtKind, span: Span) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(AstStmt { kind, span });
        id
    }

    /// Deep-clones a statement subtree into fresh arena nodes.
    ///
    /// `Var` references to `let`s cloned within the subtree are remapped to
    /// the clones; references to outer `let`s are left pointing at the
    /// originals, so the clone still sees the bindings live at its eventual
    /// generation site.
    pub fn deep_clone_stmt(&mut self, root: StmtId) -> StmtId {
        let mut let_map = HashMap::new();
        self.clone_stmt(root, &mut let_map)
    }

    fn clone_stmt(&mut self, id: StmtId, let_map: &mut HashMap<StmtId, StmtId>) -> StmtId {
        use AstStmtKind::*;
        let AstStmt { kind, span } = self.stmts[id.0 as usize].clone();
        let kind = match kind {
            Block { stmts } => Block {
                stmts: stmts
                    .into_iter()
                    .map(|s| self.clone_stmt(s, let_map))
                    .collect(),
            },
            Let { name, init } => Let {
                name,
                init: self.clone_expr(init, let_map),
            },
            Assign { lhs, rhs } => Assign {
                lhs: self.clone_expr(lhs, let_map),
                rhs: self.clone_expr(rhs, let_map),
            },
            If {
                cond,
                then_body,
                else_body,
            } => If {
                cond: self.clone_expr(cond, let_map),
                then_body: self.clone_stmt(then_body, let_map),
                else_body: else_body.map(|s| self.clone_stmt(s, let_map)),
            },
            While { label, cond, body } => While {
                label,
                cond: self.clone_expr(cond, let_map),
                body: self.clone_stmt(body, let_map),
            },
            Break { label } => Break { label },
            Continue { label } => Continue { label },
            Write { port, value } => Write {
                port: self.clone_expr(port, let_map),
                value: self.clone_expr(value, let_map),
            },
            Spawn { body } => Spawn {
                body: self.clone_stmt(body, let_map),
            },
            Kill => Kill,
            KillYounger => KillYounger,
            KillIf { cond } => KillIf {
                cond: self.clone_expr(cond, let_map),
            },
            OnKillYounger { body } => OnKillYounger {
                body: self.clone_stmt(body, let_map),
            },
            Timing { body } => Timing {
                body: self.clone_stmt(body, let_map),
            },
            Stage { offset } => Stage { offset },
            BypassStart { bypass, index } => BypassStart {
                bypass: self.clone_expr(bypass, let_map),
                index: self.clone_expr(index, let_map),
            },
            BypassEnd { bypass } => BypassEnd {
                bypass: self.clone_expr(bypass, let_map),
            },
            BypassWrite { bypass, value } => BypassWrite {
                bypass: self.clone_expr(bypass, let_map),
                value: self.clone_expr(value, let_map),
            },
            NestedFunc { body } => NestedFunc {
                body: self.clone_stmt(body, let_map),
            },
            Expr { expr } => Expr {
                expr: self.clone_expr(expr, let_map),
            },
            Pragma { key, value } => Pragma { key, value },
        };
        let new_id = self.add_stmt(kind, span);
        let_map.insert(id, new_id);
        new_id
    }

    fn clone_expr(&mut self, id: ExprId, let_map: &mut HashMap<StmtId, StmtId>) -> ExprId {
        use AstExprKind::*;
        let AstExpr { kind, ty, span } = self.exprs[id.0 as usize].clone();
        let kind = match kind {
            Const(v) => Const(v),
            Var { def } => Var {
                def: let_map.get(&def).copied().unwrap_or(def),
            },
            Op { op, args } => Op {
                op,
                args: args
                    .into_iter()
                    .map(|a| self.clone_expr(a, let_map))
                    .collect(),
            },
            PortDef { name, default } => PortDef { name, default },
            PortRead { port } => PortRead {
                port: self.clone_expr(port, let_map),
            },
            RegInit => RegInit,
            RegRef { reg } => RegRef {
                reg: self.clone_expr(reg, let_map),
            },
            ArrayInit => ArrayInit,
            ArrayRef { array, index } => ArrayRef {
                array: self.clone_expr(array, let_map),
                index: self.clone_expr(index, let_map),
            },
            BypassDef => BypassDef,
            BypassPresent { bypass, index } => BypassPresent {
                bypass: self.clone_expr(bypass, let_map),
                index: self.clone_expr(index, let_map),
            },
            BypassReady { bypass, index } => BypassReady {
                bypass: self.clone_expr(bypass, let_map),
                index: self.clone_expr(index, let_map),
            },
            BypassRead { bypass, index } => BypassRead {
                bypass: self.clone_expr(bypass, let_map),
                index: self.clone_expr(index, let_map),
            },
            StmtBlock { block } => StmtBlock {
                block: self.clone_stmt(block, let_map),
            },
            FieldRef { base, field } => FieldRef {
                base: self.clone_expr(base, let_map),
                field,
            },
            Cast { arg } => Cast {
                arg: self.clone_expr(arg, let_map),
            },
            Nop => Nop,
        };
        self.add_expr(kind, ty, span)
    }
}

/// Incremental constructor for [`Ast`] values.
///
/// This is the surface the parser (and the test suite) builds translation
/// units through. Expression constructors take the inferred type data the
/// type checker would have attached.
#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // --- expressions -------------------------------------------------------

    pub fn const_(&mut self, value: i64, width: u32) -> ExprId {
        self.ast
            .add_expr(AstExprKind::Const(value), Type::value(width), Span::default())
    }

    /// A use of the variable introduced by `def`; the type is taken from the
    /// `let`'s initializer.
    pub fn var(&mut self, def: StmtId) -> ExprId {
        let ty = match &self.ast.stmt(def).kind {
            AstStmtKind::Let { init, .. } => self.ast.expr(*init).ty,
            other => panic!("var() def must be a let statement, got {:?}", other),
        };
        self.ast
            .add_expr(AstExprKind::Var { def }, ty, Span::default())
    }

    pub fn op(&mut self, op: AstOp, args: Vec<ExprId>, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::Op { op, args },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn port_def(&mut self, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortDef {
                name: None,
                default: None,
            },
            Type::port(width),
            Span::default(),
        )
    }

    pub fn named_port_def(&mut self, name: &str, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortDef {
                name: Some(name.to_owned()),
                default: None,
            },
            Type::port(width),
            Span::default(),
        )
    }

    pub fn named_port_def_with_default(&mut self, name: &str, width: u32, default: i64) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortDef {
                name: Some(name.to_owned()),
                default: Some(default),
            },
            Type::port(width),
            Span::default(),
        )
    }

    pub fn chan_def(&mut self, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortDef {
                name: None,
                default: None,
            },
            Type::chan(width),
            Span::default(),
        )
    }

    pub fn named_chan_def(&mut self, name: &str, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortDef {
                name: Some(name.to_owned()),
                default: None,
            },
            Type::chan(width),
            Span::default(),
        )
    }

    pub fn port_read(&mut self, port: ExprId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::PortRead { port },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn reg_init(&mut self, width: u32) -> ExprId {
        self.ast
            .add_expr(AstExprKind::RegInit, Type::value(width), Span::default())
    }

    pub fn reg_ref(&mut self, reg: ExprId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::RegRef { reg },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn array_init(&mut self, width: u32, size: i64) -> ExprId {
        self.ast.add_expr(
            AstExprKind::ArrayInit,
            Type::array(width, size),
            Span::default(),
        )
    }

    pub fn array_ref(&mut self, array: ExprId, index: ExprId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::ArrayRef { array, index },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn bypass_def(&mut self, width: u32) -> ExprId {
        self.ast
            .add_expr(AstExprKind::BypassDef, Type::value(width), Span::default())
    }

    pub fn bypass_present(&mut self, bypass: ExprId, index: ExprId) -> ExprId {
        self.ast.add_expr(
            AstExprKind::BypassPresent { bypass, index },
            Type::value(1),
            Span::default(),
        )
    }

    pub fn bypass_ready(&mut self, bypass: ExprId, index: ExprId) -> ExprId {
        self.ast.add_expr(
            AstExprKind::BypassReady { bypass, index },
            Type::value(1),
            Span::default(),
        )
    }

    pub fn bypass_read(&mut self, bypass: ExprId, index: ExprId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::BypassRead { bypass, index },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn stmt_block_expr(&mut self, block: StmtId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::StmtBlock { block },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn field_ref(&mut self, base: ExprId, field: &str, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::FieldRef {
                base,
                field: field.to_owned(),
            },
            Type::value(width),
            Span::default(),
        )
    }

    pub fn cast(&mut self, arg: ExprId, width: u32) -> ExprId {
        self.ast.add_expr(
            AstExprKind::Cast { arg },
            Type::value(width),
            Span::default(),
        )
    }

    // --- statements --------------------------------------------------------

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Block { stmts }, Span::default())
    }

    pub fn let_(&mut self, name: &str, init: ExprId) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::Let {
                name: name.to_owned(),
                init,
            },
            Span::default(),
        )
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Assign { lhs, rhs }, Span::default())
    }

    pub fn if_(&mut self, cond: ExprId, then_body: StmtId, else_body: Option<StmtId>) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::If {
                cond,
                then_body,
                else_body,
            },
            Span::default(),
        )
    }

    pub fn while_(&mut self, cond: ExprId, body: StmtId) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::While {
                label: None,
                cond,
                body,
            },
            Span::default(),
        )
    }

    pub fn labeled_while(&mut self, label: &str, cond: ExprId, body: StmtId) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::While {
                label: Some(label.to_owned()),
                cond,
                body,
            },
            Span::default(),
        )
    }

    pub fn break_(&mut self, label: Option<&str>) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::Break {
                label: label.map(str::to_owned),
            },
            Span::default(),
        )
    }

    pub fn continue_(&mut self, label: Option<&str>) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::Continue {
                label: label.map(str::to_owned),
            },
            Span::default(),
        )
    }

    pub fn write(&mut self, port: ExprId, value: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Write { port, value }, Span::default())
    }

    pub fn spawn(&mut self, body: StmtId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Spawn { body }, Span::default())
    }

    pub fn kill(&mut self) -> StmtId {
        self.ast.add_stmt(AstStmtKind::Kill, Span::default())
    }

    pub fn kill_younger(&mut self) -> StmtId {
        self.ast.add_stmt(AstStmtKind::KillYounger, Span::default())
    }

    pub fn kill_if(&mut self, cond: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::KillIf { cond }, Span::default())
    }

    pub fn on_kill_younger(&mut self, body: StmtId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::OnKillYounger { body }, Span::default())
    }

    pub fn timing(&mut self, body: StmtId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Timing { body }, Span::default())
    }

    pub fn stage(&mut self, offset: i64) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Stage { offset }, Span::default())
    }

    pub fn bypass_start(&mut self, bypass: ExprId, index: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::BypassStart { bypass, index }, Span::default())
    }

    pub fn bypass_end(&mut self, bypass: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::BypassEnd { bypass }, Span::default())
    }

    pub fn bypass_write(&mut self, bypass: ExprId, value: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::BypassWrite { bypass, value }, Span::default())
    }

    pub fn nested_func(&mut self, body: StmtId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::NestedFunc { body }, Span::default())
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.ast
            .add_stmt(AstStmtKind::Expr { expr }, Span::default())
    }

    pub fn pragma(&mut self, key: &str, value: &str) -> StmtId {
        self.ast.add_stmt(
            AstStmtKind::Pragma {
                key: key.to_owned(),
                value: value.to_owned(),
            },
            Span::default(),
        )
    }

    pub fn func(&mut self, name: &str, is_entry: bool, body: StmtId) {
        self.ast.functions.push(AstFunction {
            name: name.to_owned(),
            is_entry,
            body,
        });
    }

    pub fn finish(self) -> Ast {
        self.ast
    }
}
