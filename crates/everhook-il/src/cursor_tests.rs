use super::*;
use crate::error::ValidationError;
use crate::method::Signature;

fn render() -> MethodId {
    MethodId::new("Game.Spikes", "Render", Signature::instance(0))
}

fn draw() -> MethodId {
    MethodId::new("Game.Spikes", "DrawSpikes", Signature::instance(0))
}

fn is_visible() -> MethodId {
    MethodId::new("Game.Spikes", "IsVisible", Signature::instance(0).returning())
}

fn get_types() -> MethodId {
    MethodId::new(
        "System.Reflection.Assembly",
        "GetTypes",
        Signature::instance(0).returning(),
    )
}

fn get_types_safe() -> MethodId {
    MethodId::new(
        "Everhook.Reflection",
        "GetTypesSafe",
        Signature::new(1).returning(),
    )
}

/// ldarg 0; callvirt DrawSpikes; ret
fn render_body() -> MethodBody {
    let mut body = MethodBody::new(render());
    let mut c = ILCursor::new(&mut body);
    c.emit(Instruction::ldarg(0));
    c.emit(Instruction::callvirt(draw()).unwrap());
    c.emit(Instruction::ret());
    body
}

fn opcodes(body: &MethodBody) -> Vec<OpCode> {
    body.instructions().map(|i| i.opcode()).collect()
}

#[test]
fn test_emit_appends_in_program_order() {
    let body = render_body();
    assert_eq!(opcodes(&body), vec![OpCode::Ldarg, OpCode::Callvirt, OpCode::Ret]);
    assert!(body.validate().is_ok());
}

#[test]
fn test_goto_next_before_and_after() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);

    assert!(c.try_goto_next(MoveType::Before, &[&|i: &Instruction| i.match_ret()]));
    assert_eq!(c.index(), 2);

    c.goto_start();
    assert!(c.try_goto_next(
        MoveType::After,
        &[
            &|i: &Instruction| i.match_ldarg(0),
            &|i: &Instruction| i.match_callvirt("Game.Spikes", "DrawSpikes"),
        ]
    ));
    assert_eq!(c.index(), 2);
    assert!(c.next().is_some_and(|i| i.match_ret()));
    assert!(c.prev().is_some_and(|i| i.match_opcode(OpCode::Callvirt)));
}

#[test]
fn test_not_found_leaves_cursor_in_place() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto(1).unwrap();
    assert!(!c.try_goto_next(MoveType::Before, &[&|i: &Instruction| i.match_ldstr("missing")]));
    assert_eq!(c.index(), 1);

    let err = c
        .goto_next(MoveType::Before, &[&|i: &Instruction| i.match_ldstr("missing")])
        .err()
        .unwrap();
    assert!(matches!(err, CursorError::NoMatch { .. }));
}

#[test]
fn test_goto_prev_finds_earlier_match() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto_end();
    assert!(c.try_goto_prev(MoveType::Before, &[&|i: &Instruction| i.match_ldarg(0)]));
    assert_eq!(c.index(), 0);
    assert!(!c.try_goto_prev(MoveType::Before, &[&|i: &Instruction| i.match_ldarg(0)]));
}

#[test]
fn test_early_return_guard() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);

    // if (!this.IsVisible()) return;
    let skip = c.define_label();
    c.emit(Instruction::ldarg(0));
    c.emit(Instruction::callvirt(is_visible()).unwrap());
    c.emit_branch(OpCode::Brtrue, skip).unwrap();
    c.emit(Instruction::ret());
    c.mark_label(skip).unwrap();

    assert_eq!(c.index(), 4);
    assert_eq!(
        opcodes(&body),
        vec![
            OpCode::Ldarg,
            OpCode::Callvirt,
            OpCode::Brtrue,
            OpCode::Ret,
            OpCode::Ldarg,
            OpCode::Callvirt,
            OpCode::Ret,
        ]
    );
    assert_eq!(body.label_target(skip), Some(4));
    assert!(body.validate().is_ok());
}

#[test]
fn test_redirect_every_call_site() {
    let method = MethodId::new("Game.Loader", "Scan", Signature::new(2));
    let mut body = MethodBody::new(method);
    {
        let mut c = ILCursor::new(&mut body);
        for arg in 0..2 {
            c.emit(Instruction::ldarg(arg));
            c.emit(Instruction::callvirt(get_types()).unwrap());
            c.emit(Instruction::pop());
        }
        c.emit(Instruction::ret());
    }
    assert!(body.validate().is_ok());

    let mut c = ILCursor::new(&mut body);
    let mut replaced = 0;
    while c.try_goto_next(MoveType::Before, &[&|i: &Instruction| {
        i.match_callvirt("System.Reflection.Assembly", "GetTypes")
    }]) {
        c.replace_next(Instruction::call(get_types_safe())).unwrap();
        replaced += 1;
    }
    assert_eq!(replaced, 2);
    assert!(body.validate().is_ok());
    assert!(
        body.instructions()
            .all(|i| !i.match_callvirt("System.Reflection.Assembly", "GetTypes"))
    );
    assert_eq!(
        body.instructions()
            .filter(|i| i.match_call_to(&get_types_safe()))
            .count(),
        2
    );
}

#[test]
fn test_before_search_makes_progress_after_emit() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    let mut hits = 0;
    while c.try_goto_next(MoveType::Before, &[&|i: &Instruction| i.match_ldarg(0)]) {
        c.emit(Instruction::nop());
        hits += 1;
        assert!(hits < 10);
    }
    assert_eq!(hits, 1);
    assert_eq!(body.len(), 4);
}

#[test]
fn test_insert_keeps_labels_on_their_instruction() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto(2).unwrap();
    let at_ret = c.mark_new_label().unwrap();
    c.goto(0).unwrap();
    c.emit(Instruction::nop());
    c.emit(Instruction::nop());
    assert_eq!(body.label_target(at_ret), Some(4));
}

#[test]
fn test_move_after_labels_retargets() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto(2).unwrap();
    let label = c.mark_new_label().unwrap();
    c.move_after_labels();
    c.emit(Instruction::nop());
    c.emit(Instruction::nop());
    assert_eq!(body.label_target(label), Some(2));
}

#[test]
fn test_mark_label_at_end_attaches_to_next_emit() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    let label = c.define_label();
    c.goto_end();
    c.mark_label(label).unwrap();
    assert_eq!(c.body().label_target(label), None);
    c.emit(Instruction::nop());
    assert_eq!(body.label_target(label), Some(3));
}

#[test]
fn test_foreign_label_rejected() {
    let mut other = MethodBody::new(draw());
    let _ = other.define_label();
    let foreign = other.define_label();

    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    assert!(matches!(
        c.emit_branch(OpCode::Br, foreign),
        Err(CursorError::UnknownLabel(_))
    ));
}

#[test]
fn test_remove_next() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto(2).unwrap();
    let label = c.mark_new_label().unwrap();
    assert!(matches!(
        c.remove_next(),
        Err(CursorError::InstructionReferenced { index: 2 })
    ));

    c.goto_start();
    c.emit(Instruction::nop());
    c.goto(0).unwrap();
    let removed = c.remove_next().unwrap();
    assert!(removed.match_opcode(OpCode::Nop));
    assert_eq!(body.label_target(label), Some(2));

    let mut c = ILCursor::new(&mut body);
    c.goto_end();
    assert!(matches!(c.remove_next(), Err(CursorError::AtEnd { .. })));
}

#[test]
fn test_edit_that_breaks_balance_is_caught() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.emit(Instruction::ldc_int(1));
    assert!(matches!(
        body.validate(),
        Err(ValidationError::UnbalancedReturn { .. })
    ));
}

#[test]
fn test_next_mut_edits_operand() {
    let mut body = render_body();
    let mut c = ILCursor::new(&mut body);
    c.goto_next(MoveType::Before, &[&|i: &Instruction| i.match_opcode(OpCode::Callvirt)])
        .unwrap();
    c.next_mut()
        .unwrap()
        .set_operand(Operand::Method(is_visible()))
        .unwrap();
    c.goto_end();
    // IsVisible returns a value the void body never pops.
    assert!(body.validate().is_err());
}
