use std::fmt;

use crate::ir::block::BbId;

/// Index of a statement in the program's statement arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrStmtId(pub u32);

/// A globally unique, monotonically increasing value number.
///
/// Value numbers are dense integers minted from the program's counter; every
/// statement claims one at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValNum(pub u32);

impl fmt::Display for ValNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Index of a timing variable in the program's timing-variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeVarId(pub u32);

/// Sub-operation of an `Expr` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
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
    Select,
    Bitslice,
    Concat,
    CmpEq,
    CmpNe,
    CmpLe,
    CmpLt,
    CmpGe,
    CmpGt,
    Const,
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExprOp::Add => "add",
            ExprOp::Sub => "sub",
            ExprOp::Mul => "mul",
            ExprOp::Div => "div",
            ExprOp::Rem => "rem",
            ExprOp::And => "and",
            ExprOp::Or => "or",
            ExprOp::Not => "not",
            ExprOp::Xor => "xor",
            ExprOp::Lsh => "lsh",
            ExprOp::Rsh => "rsh",
            ExprOp::Select => "select",
            ExprOp::Bitslice => "bitslice",
            ExprOp::Concat => "concat",
            ExprOp::CmpEq => "cmpeq",
            ExprOp::CmpNe => "cmpne",
            ExprOp::CmpLe => "cmple",
            ExprOp::CmpLt => "cmplt",
            ExprOp::CmpGe => "cmpge",
            ExprOp::CmpGt => "cmpgt",
            ExprOp::Const => "const",
        };
        f.write_str(s)
    }
}

/// Statement kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrStmtKind {
    Expr(ExprOp),
    Phi,
    /// Conditional branch: one argument, two targets.
    If,
    /// Unconditional branch: one target.
    Jmp,
    RegRead,
    RegWrite,
    ArraySize,
    ArrayRead,
    ArrayWrite,
    PortRead,
    PortWrite,
    PortExport,
    ChanRead,
    ChanWrite,
    BypassStart,
    BypassEnd,
    BypassWrite,
    BypassPresent,
    BypassReady,
    BypassRead,
    Kill,
    KillIf,
    KillYounger,
    /// Forks a sibling transaction; one target, fallthrough continues.
    Spawn,
    /// Pins surrounding statements to an offset on a timing variable.
    TimingBarrier,
    Done,
}

impl IrStmtKind {
    /// True for statements that end a block: control never falls through.
    ///
    /// `Spawn` is not a terminator (the spawning path continues after it),
    /// and `Kill`/`KillIf` may appear mid-block when source code follows a
    /// kill statement.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrStmtKind::If | IrStmtKind::Jmp | IrStmtKind::Done | IrStmtKind::Kill
        )
    }
}

impl fmt::Display for IrStmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrStmtKind::Expr(op) => return write!(f, "{}", op),
            IrStmtKind::Phi => "phi",
            IrStmtKind::If => "if",
            IrStmtKind::Jmp => "jmp",
            IrStmtKind::RegRead => "reg.read",
            IrStmtKind::RegWrite => "reg.write",
            IrStmtKind::ArraySize => "array.size",
            IrStmtKind::ArrayRead => "array.read",
            IrStmtKind::ArrayWrite => "array.write",
            IrStmtKind::PortRead => "port.read",
            IrStmtKind::PortWrite => "port.write",
            IrStmtKind::PortExport => "port.export",
            IrStmtKind::ChanRead => "chan.read",
            IrStmtKind::ChanWrite => "chan.write",
            IrStmtKind::BypassStart => "bypass.start",
            IrStmtKind::BypassEnd => "bypass.end",
            IrStmtKind::BypassWrite => "bypass.write",
            IrStmtKind::BypassPresent => "bypass.present",
            IrStmtKind::BypassReady => "bypass.ready",
            IrStmtKind::BypassRead => "bypass.read",
            IrStmtKind::Kill => "kill",
            IrStmtKind::KillIf => "killif",
            IrStmtKind::KillYounger => "killyounger",
            IrStmtKind::Spawn => "spawn",
            IrStmtKind::TimingBarrier => "barrier",
            IrStmtKind::Done => "done",
        };
        f.write_str(s)
    }
}

/// A single typed IR statement.
///
/// Invariants (established by codegen, checked by `ValidatePass`):
/// - `args` and `arg_nums` are parallel; so are `targets` and `target_labels`.
/// - Arguments of non-phi statements dominate their use; phi arguments are
///   paired with the predecessor block they flow in from.
/// - `imm` carries the constant payload: the literal of an `Expr(Const)`, the
///   declared length of an `ArraySize`, the port default of a
///   `PortWrite`/`ChanWrite`, or the stage offset of a `TimingBarrier`.
#[derive(Debug, Clone)]
pub struct IrStmt {
    /// Arena index; assigned when the statement is appended to a block.
    pub id: IrStmtId,
    pub valnum: ValNum,
    pub kind: IrStmtKind,
    /// Result width in bits; 0 for statements without a value.
    pub width: u32,
    pub args: Vec<IrStmtId>,
    pub arg_nums: Vec<ValNum>,
    pub targets: Vec<BbId>,
    pub target_labels: Vec<String>,
    pub imm: Option<i64>,
    pub port_name: Option<String>,
    pub timevar: Option<TimeVarId>,
}

impl IrStmt {
    /// A fresh statement with no arguments or targets. The arena id is a
    /// placeholder until the statement is appended to a block.
    pub fn new(kind: IrStmtKind, valnum: ValNum, width: u32) -> Self {
        IrStmt {
            id: IrStmtId(0),
            valnum,
            kind,
            width,
            args: Vec::new(),
            arg_nums: Vec::new(),
            targets: Vec::new(),
            target_labels: Vec::new(),
            imm: None,
            port_name: None,
            timevar: None,
        }
    }
}
