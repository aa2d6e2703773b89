//! Tests for ScriptBuilder

use bytecode_system::{Constant, IterKind, Opcode, ScriptBuilder, TryKind};

#[test]
fn test_atoms_and_constants_are_interned() {
    let mut b = ScriptBuilder::new();
    assert_eq!(b.atom("x"), b.atom("x"));
    assert_ne!(b.atom("x"), b.atom("y"));
    assert_eq!(b.number(1.5), b.number(1.5));
    assert_ne!(b.number(0.0), b.number(-0.0));
    assert_eq!(b.string("s"), b.constant(Constant::String("s".into())));
}

#[test]
fn test_backward_branch_offsets_are_relative() {
    let mut b = ScriptBuilder::new();
    let i = b.var("i");
    let top = b.mark();
    b.emit(Opcode::LocalIncDec(i, bytecode_system::IncDec::PostInc));
    b.emit(Opcode::Int(10));
    b.emit(Opcode::Lt);
    b.branch(Opcode::IfNe(0), top);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();
    assert_eq!(script.code[3], Opcode::IfNe(-3));
}

#[test]
fn test_table_switch_holes_stay_zero() {
    let mut b = ScriptBuilder::new();
    let one = b.label();
    let dflt = b.label();
    b.emit(Opcode::Int(1));
    b.table_switch(0, dflt, &[None, Some(one)]);
    b.bind(one);
    b.emit(Opcode::Nop);
    b.bind(dflt);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();
    match &script.code[1] {
        Opcode::TableSwitch { default, low, high, targets } => {
            assert_eq!((*low, *high), (0, 1));
            assert_eq!(&targets[..], &[0, 1]);
            assert_eq!(*default, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_try_notes_resolve_labels() {
    let mut b = ScriptBuilder::new();
    let start = b.mark();
    b.emit(Opcode::Try);
    b.emit(Opcode::Int(1));
    b.emit(Opcode::Throw);
    let end = b.mark();
    b.emit(Opcode::Exception);
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    b.try_note(TryKind::Catch, start, end, 0);
    let script = b.finish().unwrap();
    let note = script.try_notes[0];
    assert_eq!((note.start, note.length), (0, 3));
    assert_eq!(note.handler(), 3);
}

#[test]
fn test_for_in_loop_depth() {
    let mut b = ScriptBuilder::new();
    let x = b.var("k");
    let body = b.label();
    let cond = b.label();
    b.emit(Opcode::NewObject);
    b.emit(Opcode::Iter(IterKind::Keys));
    let start = b.mark();
    b.branch(Opcode::Goto(0), cond);
    b.bind(body);
    b.emit(Opcode::SetLocal(x));
    b.emit(Opcode::Pop);
    b.bind(cond);
    b.emit(Opcode::NextIter);
    b.branch(Opcode::IfNe(0), body);
    b.emit(Opcode::Pop);
    let end = b.mark();
    b.emit(Opcode::EndIter);
    b.emit(Opcode::Stop);
    b.try_note(TryKind::Iter, start, end, 1);
    let script = b.finish().unwrap();
    assert_eq!(script.max_stack, 3);
}

#[test]
fn test_function_builder_records_params_and_flags() {
    let mut f = ScriptBuilder::function("f", &["a", "b"]);
    f.heavyweight().uses_arguments();
    f.emit(Opcode::GetArg(1));
    f.emit(Opcode::Return);
    let script = f.finish().unwrap();
    assert_eq!(script.nargs(), 2);
    assert_eq!(script.display_name(), "f");
    assert!(script.flags.heavyweight && script.flags.uses_arguments);
}
