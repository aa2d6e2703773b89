//! Incremental construction of script images.
//!
//! Hosts and tests stand in for the compiler collaborator with this builder:
//! it interns atoms and constants, resolves forward branches through labels,
//! and verifies the finished image.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//!
//! // if (true) 1; else 2;
//! let mut b = ScriptBuilder::new();
//! let else_ = b.label();
//! let end = b.label();
//! b.emit(Opcode::True);
//! b.branch(Opcode::IfEq(0), else_);
//! b.emit(Opcode::Int(1));
//! b.branch(Opcode::Goto(0), end);
//! b.bind(else_);
//! b.emit(Opcode::Int(2));
//! b.bind(end);
//! b.emit(Opcode::SetRval);
//! b.emit(Opcode::Stop);
//! let script = b.finish().unwrap();
//! assert_eq!(script.max_stack, 1);
//! ```

use crate::opcode::Opcode;
use crate::script::{BlockScope, Constant, Script, ScriptFlags, ScriptId, TryKind, TryNote};
use crate::verify::{verify, VerifyError};
use core_types::JsString;
use std::rc::Rc;

/// A branch target that may be bound after it is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

enum Fixup {
    Branch { pc: usize, label: Label },
    SwitchDefault { pc: usize, label: Label },
    SwitchTarget { pc: usize, index: usize, label: Label },
}

struct PendingNote {
    kind: TryKind,
    start: Label,
    end: Label,
    stack_depth: u32,
}

/// Builder for [`Script`] images.
pub struct ScriptBuilder {
    name: Option<JsString>,
    code: Vec<Opcode>,
    constants: Vec<Constant>,
    atoms: Vec<JsString>,
    functions: Vec<Rc<Script>>,
    blocks: Vec<BlockScope>,
    notes: Vec<PendingNote>,
    global_names: Vec<u32>,
    params: Vec<JsString>,
    vars: Vec<JsString>,
    flags: ScriptFlags,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl ScriptBuilder {
    /// Starts a top-level script.
    pub fn new() -> Self {
        ScriptBuilder {
            name: None,
            code: Vec::new(),
            constants: Vec::new(),
            atoms: Vec::new(),
            functions: Vec::new(),
            blocks: Vec::new(),
            notes: Vec::new(),
            global_names: Vec::new(),
            params: Vec::new(),
            vars: Vec::new(),
            flags: ScriptFlags::default(),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Starts a function body with the given formal parameters.
    pub fn function(name: &str, params: &[&str]) -> Self {
        let mut b = Self::new();
        b.name = Some(JsString::from(name));
        b.params = params.iter().map(|&p| JsString::from(p)).collect();
        b
    }

    /// Interns an atom and returns its index.
    pub fn atom(&mut self, name: &str) -> u32 {
        if let Some(i) = self.atoms.iter().position(|a| a.as_str() == name) {
            return i as u32;
        }
        self.atoms.push(JsString::from(name));
        (self.atoms.len() - 1) as u32
    }

    /// Adds a number constant.
    pub fn number(&mut self, d: f64) -> u32 {
        self.constant(Constant::Number(d))
    }

    /// Adds a string constant.
    pub fn string(&mut self, s: &str) -> u32 {
        self.constant(Constant::String(JsString::from(s)))
    }

    /// Adds a constant, reusing an identical entry.
    pub fn constant(&mut self, c: Constant) -> u32 {
        let existing = self.constants.iter().position(|k| match (k, &c) {
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        });
        if let Some(i) = existing {
            return i as u32;
        }
        self.constants.push(c);
        (self.constants.len() - 1) as u32
    }

    /// Declares a local variable and returns its slot.
    pub fn var(&mut self, name: &str) -> u16 {
        if let Some(i) = self.vars.iter().position(|v| v.as_str() == name) {
            return i as u16;
        }
        self.vars.push(JsString::from(name));
        (self.vars.len() - 1) as u16
    }

    /// Gives a top-level name a fast-global slot.
    pub fn global_slot(&mut self, name: &str) -> u16 {
        let atom = self.atom(name);
        if let Some(i) = self.global_names.iter().position(|&a| a == atom) {
            return i as u16;
        }
        self.global_names.push(atom);
        (self.global_names.len() - 1) as u16
    }

    /// Adds a nested function and returns its index.
    pub fn nested(&mut self, script: Rc<Script>) -> u32 {
        self.functions.push(script);
        (self.functions.len() - 1) as u32
    }

    /// Adds a block scope whose locals start at operand depth `depth`.
    pub fn block(&mut self, depth: u32, names: &[&str]) -> u32 {
        self.blocks.push(BlockScope {
            depth,
            names: names.iter().map(|&n| JsString::from(n)).collect(),
        });
        (self.blocks.len() - 1) as u32
    }

    /// Marks the script heavyweight.
    pub fn heavyweight(&mut self) -> &mut Self {
        self.flags.heavyweight = true;
        self
    }

    /// Marks the script as a generator body.
    pub fn generator(&mut self) -> &mut Self {
        self.flags.generator = true;
        self
    }

    /// Marks the script as reading `arguments`.
    pub fn uses_arguments(&mut self) -> &mut Self {
        self.flags.uses_arguments = true;
        self
    }

    /// Marks the script strict.
    pub fn strict(&mut self) -> &mut Self {
        self.flags.strict = true;
        self
    }

    /// Current pc.
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Appends an opcode and returns its pc.
    pub fn emit(&mut self, op: Opcode) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    /// Creates an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds a label to the current pc.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    /// Creates a label bound to the current pc.
    pub fn mark(&mut self) -> Label {
        let l = self.label();
        self.bind(l);
        l
    }

    /// Emits a simple branch opcode whose offset is resolved from `label`.
    pub fn branch(&mut self, op: Opcode, label: Label) -> usize {
        let pc = self.emit(op);
        self.fixups.push(Fixup::Branch { pc, label });
        pc
    }

    /// Emits a dense switch over `low..=low + targets.len() - 1`; `None`
    /// entries are holes that go to `default`.
    pub fn table_switch(&mut self, low: i32, default: Label, targets: &[Option<Label>]) -> usize {
        let high = low + targets.len() as i32 - 1;
        let pc = self.emit(Opcode::TableSwitch {
            default: 0,
            low,
            high,
            targets: vec![0; targets.len()].into_boxed_slice(),
        });
        self.fixups.push(Fixup::SwitchDefault { pc, label: default });
        for (index, target) in targets.iter().enumerate() {
            if let Some(label) = target {
                self.fixups.push(Fixup::SwitchTarget { pc, index, label: *label });
            }
        }
        pc
    }

    /// Emits a sparse switch comparing against constants.
    pub fn lookup_switch(&mut self, default: Label, cases: &[(Constant, Label)]) -> usize {
        let consts: Vec<u32> = cases.iter().map(|(c, _)| self.constant(c.clone())).collect();
        let pc = self.emit(Opcode::LookupSwitch {
            default: 0,
            cases: consts.iter().map(|&c| (c, 0)).collect(),
        });
        self.fixups.push(Fixup::SwitchDefault { pc, label: default });
        for (index, (_, label)) in cases.iter().enumerate() {
            self.fixups.push(Fixup::SwitchTarget { pc, index, label: *label });
        }
        pc
    }

    /// Records a protected region `start..end` whose handler starts at `end`.
    pub fn try_note(&mut self, kind: TryKind, start: Label, end: Label, stack_depth: u32) {
        self.notes.push(PendingNote { kind, start, end, stack_depth });
    }

    fn resolve(&self, label: Label) -> Result<usize, VerifyError> {
        self.labels[label.0].ok_or(VerifyError::UnboundLabel(label.0))
    }

    /// Resolves labels, verifies the image and freezes it.
    pub fn finish(mut self) -> Result<Rc<Script>, VerifyError> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            match fixup {
                Fixup::Branch { pc, label } => {
                    let offset = self.resolve(label)? as i32 - pc as i32;
                    self.code[pc].set_branch_offset(offset);
                }
                Fixup::SwitchDefault { pc, label } => {
                    let offset = self.resolve(label)? as i32 - pc as i32;
                    match &mut self.code[pc] {
                        Opcode::TableSwitch { default, .. } | Opcode::LookupSwitch { default, .. } => {
                            *default = offset
                        }
                        _ => {}
                    }
                }
                Fixup::SwitchTarget { pc, index, label } => {
                    let offset = self.resolve(label)? as i32 - pc as i32;
                    match &mut self.code[pc] {
                        Opcode::TableSwitch { targets, .. } => targets[index] = offset,
                        Opcode::LookupSwitch { cases, .. } => cases[index].1 = offset,
                        _ => {}
                    }
                }
            }
        }

        let mut try_notes = Vec::with_capacity(self.notes.len());
        for note in &self.notes {
            let start = self.resolve(note.start)?;
            let end = self.resolve(note.end)?;
            try_notes.push(TryNote {
                kind: note.kind,
                start: start as u32,
                length: end.saturating_sub(start) as u32,
                stack_depth: note.stack_depth,
            });
        }

        let mut script = Script {
            id: ScriptId::fresh(),
            name: self.name,
            code: self.code,
            constants: self.constants,
            atoms: self.atoms,
            functions: self.functions,
            blocks: self.blocks,
            try_notes,
            global_names: self.global_names,
            params: self.params,
            vars: self.vars,
            max_stack: 0,
            flags: self.flags,
        };
        script.max_stack = verify(&script)?;
        Ok(Rc::new(script))
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
