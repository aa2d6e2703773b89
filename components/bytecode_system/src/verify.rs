//! Static verification of script images.
//!
//! The compiler is a collaborator; a defect there must surface as a
//! malformed-bytecode error before execution rather than as a corrupted
//! operand stack. Verification walks the control-flow graph once, checks
//! every operand index, and computes the maximum operand-stack depth.

use crate::opcode::Opcode;
use crate::script::{Script, TryKind};
use thiserror::Error;

/// Reasons a script image is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The script has no instructions
    #[error("script has no instructions")]
    Empty,
    /// A branch leaves the instruction stream
    #[error("branch at pc {pc} targets {target}, outside the script")]
    BranchOutOfRange {
        /// Branching pc
        pc: usize,
        /// Computed target
        target: i64,
    },
    /// An opcode pops more values than the stack holds
    #[error("stack underflow at pc {pc}")]
    StackUnderflow {
        /// Faulting pc
        pc: usize,
    },
    /// Two paths reach an instruction with different stack depths
    #[error("inconsistent stack depth at pc {pc}: {first} vs {second}")]
    DepthMismatch {
        /// Join pc
        pc: usize,
        /// Depth recorded first
        first: u32,
        /// Conflicting depth
        second: u32,
    },
    /// An operand indexes past the end of a table
    #[error("{what} index {index} out of range at pc {pc}")]
    BadIndex {
        /// Faulting pc
        pc: usize,
        /// Table name
        what: &'static str,
        /// Offending index
        index: u32,
    },
    /// A block is entered at a depth other than the one it was compiled for
    #[error("block {block} entered at depth {depth} at pc {pc}")]
    BadBlockDepth {
        /// Faulting pc
        pc: usize,
        /// Block index
        block: u32,
        /// Actual depth
        depth: u32,
    },
    /// A table switch's target list does not match its range
    #[error("malformed table switch at pc {pc}")]
    BadSwitch {
        /// Faulting pc
        pc: usize,
    },
    /// Control reaches the end of the instruction stream
    #[error("control falls off the end of the script at pc {pc}")]
    FallsOffEnd {
        /// Last pc
        pc: usize,
    },
    /// A try note covers instructions outside the script
    #[error("try note {index} is malformed")]
    BadTryNote {
        /// Note index
        index: usize,
    },
    /// A builder label was referenced but never bound
    #[error("label {0} was never bound")]
    UnboundLabel(usize),
}

fn atom_operand(op: &Opcode) -> Option<u32> {
    use Opcode::*;
    match op {
        Name(a) | TypeofName(a) | BindName(a) | SetName(a) | CallName(a) | DelName(a)
        | NameIncDec(a, _) | DefVar(a) | DefConst(a) | InitConst(a) | GetProp(a) | SetProp(a)
        | CallProp(a) | PropIncDec(a, _) | DelProp(a) | InitProp(a) | InitGetter(a)
        | InitSetter(a) => Some(*a),
        _ => None,
    }
}

fn check_operands(script: &Script, pc: usize, op: &Opcode, depth: u32) -> Result<(), VerifyError> {
    let bad = |what: &'static str, index: u32| VerifyError::BadIndex { pc, what, index };
    if let Some(a) = atom_operand(op) {
        if a as usize >= script.atoms.len() {
            return Err(bad("atom", a));
        }
    }
    match op {
        Opcode::Const(c) if *c as usize >= script.constants.len() => Err(bad("constant", *c)),
        Opcode::GetArg(n) | Opcode::SetArg(n) | Opcode::ArgIncDec(n, _)
            if *n as usize >= script.nargs() =>
        {
            Err(bad("argument", *n as u32))
        }
        Opcode::GetLocal(n) | Opcode::SetLocal(n) | Opcode::LocalIncDec(n, _)
            if *n as usize >= script.nfixed() + depth as usize =>
        {
            Err(bad("local", *n as u32))
        }
        Opcode::GetGVar(g) | Opcode::SetGVar(g) | Opcode::GVarIncDec(g, _) => {
            match script.global_names.get(*g as usize) {
                Some(&atom) if (atom as usize) < script.atoms.len() => Ok(()),
                _ => Err(bad("global slot", *g as u32)),
            }
        }
        Opcode::Lambda(f) | Opcode::DefFun(f) if *f as usize >= script.functions.len() => {
            Err(bad("function", *f))
        }
        Opcode::EnterBlock(b) => match script.block(*b) {
            None => Err(bad("block", *b)),
            Some(block) if block.depth != depth => Err(VerifyError::BadBlockDepth { pc, block: *b, depth }),
            Some(_) => Ok(()),
        },
        Opcode::LeaveBlock(b) if script.block(*b).is_none() => Err(bad("block", *b)),
        Opcode::LookupSwitch { cases, .. } => {
            match cases.iter().find(|(c, _)| *c as usize >= script.constants.len()) {
                Some((c, _)) => Err(bad("constant", *c)),
                None => Ok(()),
            }
        }
        Opcode::TableSwitch { low, high, targets, .. } => {
            let span = (*high as i64) - (*low as i64) + 1;
            if span < 1 || span != targets.len() as i64 {
                Err(VerifyError::BadSwitch { pc })
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Verifies `script` and returns its maximum operand-stack depth.
pub fn verify(script: &Script) -> Result<u32, VerifyError> {
    let len = script.code.len();
    if len == 0 {
        return Err(VerifyError::Empty);
    }

    let mut depths: Vec<Option<u32>> = vec![None; len];
    let mut work: Vec<(usize, u32)> = vec![(0, 0)];
    let mut max_depth = 0u32;

    for (index, note) in script.try_notes.iter().enumerate() {
        let end = note.start as usize + note.length as usize;
        if end > len || note.length == 0 {
            return Err(VerifyError::BadTryNote { index });
        }
        match note.kind {
            TryKind::Catch => work.push((end, note.stack_depth)),
            TryKind::Finally => work.push((end, note.stack_depth + 2)),
            TryKind::Iter => {}
        }
        if note.kind != TryKind::Iter && end >= len {
            return Err(VerifyError::BadTryNote { index });
        }
    }

    let target_of = |pc: usize, offset: i32| -> Result<usize, VerifyError> {
        let target = pc as i64 + offset as i64;
        if target < 0 || target >= len as i64 {
            Err(VerifyError::BranchOutOfRange { pc, target })
        } else {
            Ok(target as usize)
        }
    };

    while let Some((pc, depth)) = work.pop() {
        match depths[pc] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::DepthMismatch { pc, first: seen, second: depth })
            }
            None => depths[pc] = Some(depth),
        }
        max_depth = max_depth.max(depth);

        let op = &script.code[pc];
        check_operands(script, pc, op, depth)?;
        let (pops, pushes) = op
            .stack_effect(|b| script.block(b).map(|s| s.names.len() as u32))
            .ok_or(VerifyError::BadIndex { pc, what: "block", index: 0 })?;
        if depth < pops {
            return Err(VerifyError::StackUnderflow { pc });
        }
        let next = depth - pops + pushes;
        max_depth = max_depth.max(next);

        match op {
            Opcode::TableSwitch { default, targets, .. } => {
                work.push((target_of(pc, *default)?, next));
                for &t in targets.iter().filter(|&&t| t != 0) {
                    work.push((target_of(pc, t)?, next));
                }
            }
            Opcode::LookupSwitch { default, cases } => {
                work.push((target_of(pc, *default)?, next));
                for &(_, t) in cases.iter() {
                    work.push((target_of(pc, t)?, next));
                }
            }
            Opcode::Gosub(offset) => {
                max_depth = max_depth.max(depth + 2);
                work.push((target_of(pc, *offset)?, depth + 2));
            }
            other => {
                if let Some(offset) = other.branch_offset() {
                    work.push((target_of(pc, offset)?, next + other.branch_pushes_back()));
                }
            }
        }

        if !op.is_terminator() {
            if pc + 1 >= len {
                return Err(VerifyError::FallsOffEnd { pc });
            }
            work.push((pc + 1, next));
        }
    }

    Ok(max_depth)
}
