//! Exceptions, finally blocks and iterator cleanup

use bytecode_system::{IterKind, Opcode, Script, ScriptBuilder, TryKind};
use core_types::{ObjectId, Value};
use integration_tests::{engine, program};
use interpreter::{DebugHooks, NativeArgs, TrapAction, Vm, VmError, VmResult};
use memory_manager::Attrs;
use std::rc::Rc;

/// A rethrow from an inner catch reaches the outer catch
#[test]
fn test_nested_catch_receives_rethrow() {
    let script = program(|b| {
        let outer_start = b.mark();
        let (inner_handler, outer_handler, done) = (b.label(), b.label(), b.label());
        let inner_start = b.mark();
        b.emit(Opcode::Int(7));
        b.emit(Opcode::Throw);
        b.bind(inner_handler);
        b.try_note(TryKind::Catch, inner_start, inner_handler, 0);
        b.emit(Opcode::Exception);
        b.emit(Opcode::Int(1));
        b.emit(Opcode::Add);
        b.emit(Opcode::Throw);
        b.bind(outer_handler);
        b.try_note(TryKind::Catch, outer_start, outer_handler, 0);
        b.emit(Opcode::Exception);
        b.branch(Opcode::Goto(0), done);
        b.bind(done);
    });
    let mut vm = engine();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(8));
}

/// An exception thrown in a callee is caught by the caller's handler
#[test]
fn test_exception_crosses_frames() {
    let mut f = ScriptBuilder::function("fail", &[]);
    let s = f.string("deep");
    f.emit(Opcode::Const(s));
    f.emit(Opcode::Throw);
    let f = f.finish().unwrap();

    let script = program(|b| {
        let func = b.nested(f);
        let (start, handler) = (b.mark(), b.label());
        b.emit(Opcode::Lambda(func));
        b.emit(Opcode::Undefined);
        b.emit(Opcode::Call(0));
        b.emit(Opcode::SetRval);
        b.emit(Opcode::Stop);
        b.bind(handler);
        b.try_note(TryKind::Catch, start, handler, 0);
        b.emit(Opcode::Exception);
    });
    let mut vm = engine();
    assert_eq!(vm.execute(&script).unwrap(), Value::from("deep"));
    assert_eq!(vm.frame_depth(), 0);
}

/// Stores `true` on the global `closed` when called.
fn mark_closed(vm: &mut Vm, _args: &NativeArgs) -> VmResult<Value> {
    let global = vm.global();
    vm.set_property(global, "closed", Value::Boolean(true))?;
    Ok(Value::Undefined)
}

/// An endless iterator object whose `return` method is `close`, exposed
/// through `__iterator__` on the global `source`.
fn install_endless_source(
    vm: &mut Vm,
    close: impl Fn(&mut Vm, &NativeArgs) -> VmResult<Value> + 'static,
) -> ObjectId {
    let global = vm.global();
    vm.set_property(global, "closed", Value::Boolean(false)).unwrap();

    let iterator = vm.create_object().unwrap();
    let next = vm
        .create_native_function("next", 0, |vm, _| {
            let result = vm.create_object()?;
            vm.define_property(result, "value", Value::Smi(1), Attrs::ENUMERATE)?;
            vm.define_property(result, "done", Value::Boolean(false), Attrs::ENUMERATE)?;
            Ok(Value::Object(result))
        })
        .unwrap();
    let close = vm.create_native_function("return", 0, close).unwrap();
    vm.define_property(iterator, "next", Value::Object(next), Attrs::NONE).unwrap();
    vm.define_property(iterator, "return", Value::Object(close), Attrs::NONE).unwrap();

    let source = vm.create_object().unwrap();
    let hook = vm
        .create_native_function("__iterator__", 1, move |_, _| Ok(Value::Object(iterator)))
        .unwrap();
    vm.define_property(source, "__iterator__", Value::Object(hook), Attrs::NONE).unwrap();
    vm.set_property(global, "source", Value::Object(source)).unwrap();
    vm.add_root(Value::Object(iterator));
    iterator
}

/// `break` out of a for-in loop closes the iterator before the break
/// target runs
#[test]
fn test_break_closes_iterator_first() {
    let mut vm = engine();
    install_endless_source(&mut vm, mark_closed);
    let script = program(|b| {
        let (source, closed) = (b.atom("source"), b.atom("closed"));
        let exit = b.label();
        b.emit(Opcode::Name(source));
        b.emit(Opcode::Iter(IterKind::Values));
        b.emit(Opcode::NextIter);
        b.branch(Opcode::IfEq(0), exit);
        // body: break
        b.emit(Opcode::Pop);
        b.emit(Opcode::EndIter);
        b.emit(Opcode::Name(closed));
        b.emit(Opcode::SetRval);
        b.emit(Opcode::Stop);
        b.bind(exit);
        b.emit(Opcode::Pop);
        b.emit(Opcode::EndIter);
        b.emit(Opcode::False);
    });
    assert_eq!(vm.execute(&script).unwrap(), Value::Boolean(true));
}

/// An exception escaping a for-in body closes the iterator
#[test]
fn test_exception_closes_iterator() {
    let mut vm = engine();
    install_endless_source(&mut vm, mark_closed);
    let script = program(|b| {
        let (source, closed) = (b.atom("source"), b.atom("closed"));
        let (handler, exit) = (b.label(), b.label());
        let start = b.mark();
        b.emit(Opcode::Name(source));
        b.emit(Opcode::Iter(IterKind::Values));
        let loop_start = b.mark();
        b.emit(Opcode::NextIter);
        b.branch(Opcode::IfEq(0), exit);
        b.emit(Opcode::Throw);
        b.bind(exit);
        b.try_note(TryKind::Iter, loop_start, exit, 1);
        b.emit(Opcode::Pop);
        b.emit(Opcode::EndIter);
        b.emit(Opcode::Undefined);
        b.emit(Opcode::SetRval);
        b.emit(Opcode::Stop);
        b.bind(handler);
        b.try_note(TryKind::Catch, start, handler, 0);
        b.emit(Opcode::Exception);
        b.emit(Opcode::Pop);
        b.emit(Opcode::Name(closed));
    });
    assert_eq!(vm.execute(&script).unwrap(), Value::Boolean(true));
}

/// A finally block runs on both the normal and the exceptional path
#[test]
fn test_finally_runs_on_every_exit() {
    for throws in [false, true] {
        let script = program(|b| {
            let count = b.global_slot("count");
            let count_atom = b.atom("count");
            b.emit(Opcode::DefVar(count_atom));
            b.emit(Opcode::Int(0));
            b.emit(Opcode::SetGVar(count));
            b.emit(Opcode::Pop);

            let (outer, catch, done) = (b.mark(), b.label(), b.label());
            let (start, fin, after) = (b.mark(), b.label(), b.label());
            if throws {
                b.emit(Opcode::Int(1));
                b.emit(Opcode::Throw);
            } else {
                b.emit(Opcode::Nop);
            }
            b.branch(Opcode::Gosub(0), fin);
            b.branch(Opcode::Goto(0), after);
            b.bind(fin);
            b.try_note(TryKind::Finally, start, fin, 0);
            b.emit(Opcode::Finally);
            b.emit(Opcode::GVarIncDec(count, bytecode_system::IncDec::PreInc));
            b.emit(Opcode::Pop);
            b.emit(Opcode::Retsub);
            b.bind(after);
            b.branch(Opcode::Goto(0), done);
            b.bind(catch);
            b.try_note(TryKind::Catch, outer, catch, 0);
            b.emit(Opcode::Exception);
            b.emit(Opcode::Pop);
            b.bind(done);
            b.emit(Opcode::GetGVar(count));
        });
        let mut vm = engine();
        assert_eq!(vm.execute(&script).unwrap(), Value::Smi(1), "throws = {}", throws);
    }
}

/// A fault raised while closing an iterator during cleanup replaces the
/// exception that caused the cleanup
#[test]
fn test_close_fault_takes_precedence() {
    let mut vm = engine();
    install_endless_source(&mut vm, |_, _| Err(VmError::Throw(Value::from("close failed"))));
    let script = program(|b| {
        let source = b.atom("source");
        let body = b.string("body");
        let (handler, exit) = (b.label(), b.label());
        let start = b.mark();
        b.emit(Opcode::Name(source));
        b.emit(Opcode::Iter(IterKind::Values));
        let loop_start = b.mark();
        b.emit(Opcode::NextIter);
        b.branch(Opcode::IfEq(0), exit);
        b.emit(Opcode::Pop);
        b.emit(Opcode::Const(body));
        b.emit(Opcode::Throw);
        b.bind(exit);
        b.try_note(TryKind::Iter, loop_start, exit, 1);
        b.emit(Opcode::Pop);
        b.emit(Opcode::EndIter);
        b.emit(Opcode::Undefined);
        b.emit(Opcode::SetRval);
        b.emit(Opcode::Stop);
        b.bind(handler);
        b.try_note(TryKind::Catch, start, handler, 0);
        b.emit(Opcode::Exception);
    });
    assert_eq!(vm.execute(&script).unwrap(), Value::from("close failed"));
    assert_eq!(vm.frame_depth(), 0);
}

/// Returns `value` from the first `Debugger` instruction reached
struct ForceReturn(Value);

impl DebugHooks for ForceReturn {
    fn on_trap(&mut self, _script: &Script, _pc: usize) -> TrapAction {
        TrapAction::Return(self.0.clone())
    }
}

/// A debugger-forced return from inside a loop still closes the loop's
/// iterator
#[test]
fn test_forced_return_closes_iterator() {
    // function () { for (v in source) { debugger } }
    let mut f = ScriptBuilder::function("paused", &[]);
    let source = f.atom("source");
    let exit = f.label();
    f.emit(Opcode::Name(source));
    f.emit(Opcode::Iter(IterKind::Values));
    let loop_start = f.mark();
    f.emit(Opcode::NextIter);
    f.branch(Opcode::IfEq(0), exit);
    f.emit(Opcode::Pop);
    f.emit(Opcode::Debugger);
    f.branch(Opcode::Goto(0), loop_start);
    f.bind(exit);
    f.try_note(TryKind::Iter, loop_start, exit, 1);
    f.emit(Opcode::Pop);
    f.emit(Opcode::EndIter);
    f.emit(Opcode::Undefined);
    f.emit(Opcode::Return);
    let f: Rc<Script> = f.finish().unwrap();

    let mut vm = engine();
    install_endless_source(&mut vm, mark_closed);
    vm.set_debug_hooks(Some(Box::new(ForceReturn(Value::Smi(3)))));
    let func = Value::Object(vm.create_function(&f).unwrap());
    assert_eq!(vm.call(&func, &Value::Undefined, &[]).unwrap(), Value::Smi(3));

    let global = Value::Object(vm.global());
    assert_eq!(vm.get_property(&global, "closed").unwrap(), Value::Boolean(true));
    assert_eq!(vm.frame_depth(), 0);
}
