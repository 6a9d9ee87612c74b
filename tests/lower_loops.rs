//! While-loop lowering: pre-seeded header phis, continue/break edge folding,
//! labeled loops, and the nested-loop snapshot behavior.

use sluice::ast::{Ast, AstBuilder, AstOp};
use sluice::ir::{IrBb, IrProgram, IrStmtKind};
use sluice::pass::validate::validate;
use sluice::{generate, CodegenError, ErrorCollector};

fn gen(mut ast: Ast) -> IrProgram {
    let mut errors = ErrorCollector::new();
    let prog = generate(&mut ast, &mut errors).expect("codegen should succeed");
    assert!(
        !errors.has_errors(),
        "unexpected diagnostics: {:?}",
        errors.diagnostics()
    );
    prog
}

fn gen_err(mut ast: Ast) -> ErrorCollector {
    let mut errors = ErrorCollector::new();
    assert!(generate(&mut ast, &mut errors).is_err());
    assert!(errors.has_errors());
    errors
}

fn bb_by_prefix<'p>(prog: &'p IrProgram, prefix: &str) -> &'p IrBb {
    prog.bbs
        .iter()
        .find(|bb| bb.label.starts_with(prefix))
        .unwrap_or_else(|| panic!("no block with label prefix '{}'", prefix))
}

fn phis<'p>(prog: &'p IrProgram, bb: &IrBb) -> Vec<&'p sluice::ir::IrStmt> {
    bb.stmts
        .iter()
        .map(|&s| prog.stmt(s))
        .filter(|s| s.kind == IrStmtKind::Phi)
        .collect()
}

/// A loop whose body writes nothing still pre-seeds a phi at the header for
/// every live binding with an IR value, each with exactly two incoming edges
/// (loop entry, end of body).
#[test]
fn test_empty_body_loop_preseeds_phis() {
    let mut b = AstBuilder::new();
    let five = b.const_(5, 8);
    let x_let = b.let_("x", five);
    let cinit = b.const_(1, 1);
    let c_let = b.let_("c", cinit);
    let c_use = b.var(c_let);
    let body = b.block(vec![]);
    let while_stmt = b.while_(c_use, body);
    let func_body = b.block(vec![x_let, c_let, while_stmt]);
    b.func("main", true, func_body);

    let prog = gen(b.finish());
    let entry = prog.bb(prog.entries[0]);
    let header = bb_by_prefix(&prog, "while_header");
    let body = bb_by_prefix(&prog, "while_body");
    let footer = bb_by_prefix(&prog, "while_footer");

    // Header: one phi per live binding (x then c, in declaration order),
    // then the conditional branch. The condition is a plain variable use, so
    // it resolves to the c phi and emits nothing new.
    let header_phis = phis(&prog, header);
    assert_eq!(header_phis.len(), 2);
    for phi in &header_phis {
        assert_eq!(phi.args.len(), 2);
        assert_eq!(phi.targets[0], entry.id);
        assert_eq!(phi.targets[1], body.id);
    }
    let branch = prog.stmt(*header.stmts.last().unwrap());
    assert_eq!(branch.kind, IrStmtKind::If);
    assert_eq!(branch.arg_nums[0], header_phis[1].valnum);
    assert_eq!(branch.targets, vec![body.id, footer.id]);

    // The x phi's back-edge operand is the phi itself: nothing in the body
    // redefined it.
    assert_eq!(header_phis[0].args[1], header_phis[0].id);

    // Body is just the back-edge jump.
    assert_eq!(body.stmts.len(), 1);
    assert_eq!(prog.stmt(body.stmts[0]).kind, IrStmtKind::Jmp);

    // Footer phis carry the loop-exit values, one incoming edge each (the
    // loop-condition-false exit from the header).
    let footer_phis = phis(&prog, footer);
    assert_eq!(footer_phis.len(), 2);
    for phi in &footer_phis {
        assert_eq!(phi.args.len(), 1);
        assert_eq!(phi.targets[0], header.id);
    }
    assert_eq!(footer_phis[0].args[0], header_phis[0].id);

    validate(&prog).expect("structural invariants hold");
}

/// `let i = 0; while (i < 10) { if (skip) { continue; } i = i + 1; }`
///
/// The header phi for `i` collects three incoming edges: loop entry, the
/// continue inside the if-arm, and the end of the body. The footer phi for
/// `i` has only the implicit loop-condition-false edge.
#[test]
fn test_loop_with_continue_collects_all_edges() {
    let mut b = AstBuilder::new();
    let p = b.named_port_def("p", 8);
    let p_let = b.let_("p", p);
    let zero = b.const_(0, 8);
    let i_let = b.let_("i", zero);
    let skip_init = b.const_(0, 1);
    let skip_let = b.let_("skip", skip_init);

    let i_use = b.var(i_let);
    let ten = b.const_(10, 8);
    let cond = b.op(AstOp::Lt, vec![i_use, ten], 1);

    let skip_use = b.var(skip_let);
    let cont = b.continue_(None);
    let then_blk = b.block(vec![cont]);
    let if_stmt = b.if_(skip_use, then_blk, None);

    let i_use2 = b.var(i_let);
    let one = b.const_(1, 8);
    let inc = b.op(AstOp::Add, vec![i_use2, one], 8);
    let i_lhs = b.var(i_let);
    let inc_assign = b.assign(i_lhs, inc);

    let loop_body = b.block(vec![if_stmt, inc_assign]);
    let while_stmt = b.while_(cond, loop_body);

    let p_use = b.var(p_let);
    let i_use3 = b.var(i_let);
    let w = b.write(p_use, i_use3);
    let func_body = b.block(vec![p_let, i_let, skip_let, while_stmt, w]);
    b.func("main", true, func_body);

    let prog = gen(b.finish());
    let entry = prog.bb(prog.entries[0]);
    let header = bb_by_prefix(&prog, "while_header");
    let footer = bb_by_prefix(&prog, "while_footer");
    let if_body = bb_by_prefix(&prog, "if_body");
    let merge = bb_by_prefix(&prog, "if_else_merge");

    // i is declared before skip, so its phi leads the header.
    let header_phis = phis(&prog, header);
    let i_phi = header_phis[0];
    assert_eq!(i_phi.args.len(), 3);
    assert_eq!(i_phi.targets[0], entry.id);
    assert!(i_phi.targets.contains(&if_body.id));
    assert!(i_phi.targets.contains(&merge.id));

    // The continue edge carries the unmodified phi value; the end-of-body
    // edge carries the increment.
    let merge_pos = i_phi.targets.iter().position(|&t| t == merge.id).unwrap();
    let inc_stmt = prog.stmt(i_phi.args[merge_pos]);
    assert_eq!(inc_stmt.kind, IrStmtKind::Expr(sluice::ir::ExprOp::Add));
    let cont_pos = i_phi
        .targets
        .iter()
        .position(|&t| t == if_body.id)
        .unwrap();
    assert_eq!(i_phi.args[cont_pos], i_phi.id);

    // The increment lives at the merge of the inner if.
    assert!(merge
        .stmts
        .iter()
        .any(|&s| prog.stmt(s).kind == IrStmtKind::Expr(sluice::ir::ExprOp::Add)));

    // Footer: only the loop-condition-false edge feeds i's exit phi, and the
    // final write consumes it.
    let footer_phis = phis(&prog, footer);
    let i_exit = footer_phis[0];
    assert_eq!(i_exit.args.len(), 1);
    assert_eq!(i_exit.targets[0], header.id);
    assert_eq!(i_exit.args[0], i_phi.id);

    let write = footer
        .stmts
        .iter()
        .map(|&s| prog.stmt(s))
        .find(|s| s.kind == IrStmtKind::PortWrite)
        .unwrap();
    assert_eq!(write.args[0], i_exit.id);

    validate(&prog).expect("structural invariants hold");
}

/// `outer: while (c1) { inner: while (c2) { x = 7; break outer; } }`
///
/// The break hands its binding snapshot to the *outer* footer; the outer
/// header's back-edge operand for `x` is the inner footer's exit phi, not
/// the outer loop's own seed.
#[test]
fn test_labeled_break_and_nested_loop_snapshots() {
    let mut b = AstBuilder::new();
    let zero = b.const_(0, 8);
    let x_let = b.let_("x", zero);
    let c1_init = b.const_(1, 1);
    let c1_let = b.let_("c1", c1_init);
    let c2_init = b.const_(1, 1);
    let c2_let = b.let_("c2", c2_init);

    let seven = b.const_(7, 8);
    let x_lhs = b.var(x_let);
    let store = b.assign(x_lhs, seven);
    let brk = b.break_(Some("outer"));
    let inner_body = b.block(vec![store, brk]);
    let c2_use = b.var(c2_let);
    let inner = b.labeled_while("inner", c2_use, inner_body);

    let outer_body = b.block(vec![inner]);
    let c1_use = b.var(c1_let);
    let outer = b.labeled_while("outer", c1_use, outer_body);

    let func_body = b.block(vec![x_let, c1_let, c2_let, outer]);
    b.func("main", true, func_body);

    let prog = gen(b.finish());
    let outer_header = bb_by_prefix(&prog, "outer_header");
    let outer_footer = bb_by_prefix(&prog, "outer_footer");
    let inner_header = bb_by_prefix(&prog, "inner_header");
    let inner_footer = bb_by_prefix(&prog, "inner_footer");
    let inner_body_bb = bb_by_prefix(&prog, "inner_body");

    // Outer footer phi for x joins the implicit condition-false exit with the
    // labeled break; the break operand is the stored constant.
    let x_exit = phis(&prog, outer_footer)[0];
    assert_eq!(x_exit.args.len(), 2);
    assert!(x_exit.targets.contains(&outer_header.id));
    assert!(x_exit.targets.contains(&inner_body_bb.id));
    let brk_pos = x_exit
        .targets
        .iter()
        .position(|&t| t == inner_body_bb.id)
        .unwrap();
    assert_eq!(prog.stmt(x_exit.args[brk_pos]).imm, Some(7));

    // Outer header phi for x: the end-of-body operand is the inner footer's
    // exit phi (the inner loop result), not the outer seed itself.
    let x_head = phis(&prog, outer_header)[0];
    assert_eq!(x_head.args.len(), 2);
    let back_pos = x_head
        .targets
        .iter()
        .position(|&t| t == inner_footer.id)
        .unwrap();
    let back_operand = prog.stmt(x_head.args[back_pos]);
    assert_eq!(back_operand.kind, IrStmtKind::Phi);
    assert!(inner_footer.stmts.contains(&back_operand.id));

    // The break parked subsequent generation in an unreachable block; the
    // inner header's back-edge input from it must be pruned away.
    let x_inner_head = phis(&prog, inner_header)[0];
    assert_eq!(x_inner_head.args.len(), 1);
    assert!(!prog
        .bbs
        .iter()
        .any(|bb| bb.label.starts_with("unreachable")));

    validate(&prog).expect("structural invariants hold");
}

/// A `let` declared inside the loop body is local to an iteration: it gets
/// neither a header phi nor a footer phi.
#[test]
fn test_body_local_let_gets_no_phi() {
    let mut b = AstBuilder::new();
    let cinit = b.const_(1, 1);
    let c_let = b.let_("c", cinit);
    let c_use = b.var(c_let);
    let five = b.const_(5, 8);
    let t_let = b.let_("t", five);
    let body = b.block(vec![t_let]);
    let while_stmt = b.while_(c_use, body);
    let func_body = b.block(vec![c_let, while_stmt]);
    b.func("main", true, func_body);

    let prog = gen(b.finish());
    let header = bb_by_prefix(&prog, "while_header");
    let footer = bb_by_prefix(&prog, "while_footer");
    // Only c is live across the loop.
    assert_eq!(phis(&prog, header).len(), 1);
    assert_eq!(phis(&prog, footer).len(), 1);

    validate(&prog).expect("structural invariants hold");
}

#[test]
fn test_break_outside_loop_is_rejected() {
    let mut b = AstBuilder::new();
    let brk = b.break_(None);
    let body = b.block(vec![brk]);
    b.func("main", true, body);

    let errors = gen_err(b.finish());
    assert!(matches!(
        errors.diagnostics()[0].error,
        CodegenError::BreakOutsideLoop
    ));
}

#[test]
fn test_unknown_loop_label_is_rejected() {
    let mut b = AstBuilder::new();
    let cinit = b.const_(1, 1);
    let c_let = b.let_("c", cinit);
    let c_use = b.var(c_let);
    let brk = b.break_(Some("nosuch"));
    let body = b.block(vec![brk]);
    let while_stmt = b.labeled_while("loop", c_use, body);
    let func_body = b.block(vec![c_let, while_stmt]);
    b.func("main", true, func_body);

    let errors = gen_err(b.finish());
    assert!(matches!(
        errors.diagnostics()[0].error,
        CodegenError::UnknownLoopLabel { .. }
    ));
}

/// Rebinding a port variable inside a loop body cannot be merged at the
/// header.
#[test]
fn test_port_rebind_in_loop_is_rejected() {
    let mut b = AstBuilder::new();
    let cinit = b.const_(1, 1);
    let c_let = b.let_("c", cinit);
    let p = b.named_port_def("p", 8);
    let p_let = b.let_("p", p);
    let q = b.named_port_def("q", 8);
    let q_let = b.let_("q", q);

    let c_use = b.var(c_let);
    let p_lhs = b.var(p_let);
    let q_use = b.var(q_let);
    let rebind = b.assign(p_lhs, q_use);
    let body = b.block(vec![rebind]);
    let while_stmt = b.while_(c_use, body);
    let func_body = b.block(vec![c_let, p_let, q_let, while_stmt]);
    b.func("main", true, func_body);

    let errors = gen_err(b.finish());
    assert!(matches!(
        errors.diagnostics()[0].error,
        CodegenError::LoopJoinWithoutIr
    ));
}
