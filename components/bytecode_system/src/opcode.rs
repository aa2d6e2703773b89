//! Bytecode opcodes for the stack machine.
//!
//! Every opcode declares its exact operand-stack effect through
//! [`Opcode::stack_effect`]; the verifier and the interpreter both rely on
//! it. Branch operands are offsets in instructions relative to the pc of the
//! branching instruction itself.

/// Atom table index (property ids and names)
pub type AtomIndex = u32;
/// Constant pool index
pub type ConstIndex = u32;

/// Increment/decrement flavor shared by all `*IncDec` opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncDec {
    /// `++x`: push the new value
    PreInc,
    /// `--x`: push the new value
    PreDec,
    /// `x++`: push the old value converted to a number
    PostInc,
    /// `x--`: push the old value converted to a number
    PostDec,
}

impl IncDec {
    /// `+1` or `-1`.
    pub fn delta(self) -> i32 {
        match self {
            IncDec::PreInc | IncDec::PostInc => 1,
            IncDec::PreDec | IncDec::PostDec => -1,
        }
    }

    /// True when the expression's value is the updated one.
    pub fn is_prefix(self) -> bool {
        matches!(self, IncDec::PreInc | IncDec::PreDec)
    }
}

/// What an iterator produced by [`Opcode::Iter`] yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterKind {
    /// Property ids (`for (k in o)`)
    Keys,
    /// Property values (`for each (v in o)`)
    Values,
}

/// Bytecode opcodes
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // Constants
    /// Push undefined
    Undefined,
    /// Push null
    Null,
    /// Push true
    True,
    /// Push false
    False,
    /// Push a tagged integer
    Int(i32),
    /// Push constant from the constant pool
    Const(ConstIndex),
    /// Push the frame's `this`
    This,

    // Stack manipulation
    /// Discard top value
    Pop,
    /// Discard the top n values
    PopN(u16),
    /// Duplicate top value
    Dup,
    /// Duplicate the top two values
    Dup2,
    /// Swap the top two values
    Swap,
    /// No operation
    Nop,

    // Frame slots
    /// Push formal argument n
    GetArg(u16),
    /// Store top into formal argument n (value stays on the stack)
    SetArg(u16),
    /// Push local slot n (vars, then block locals)
    GetLocal(u16),
    /// Store top into local slot n (value stays on the stack)
    SetLocal(u16),
    /// Increment/decrement formal argument n
    ArgIncDec(u16, IncDec),
    /// Increment/decrement local slot n
    LocalIncDec(u16, IncDec),
    /// Push the reified `arguments` object
    Arguments,

    // Names (scope chain)
    /// Push the value of a name resolved on the scope chain
    Name(AtomIndex),
    /// `typeof name`, tolerating unresolved names
    TypeofName(AtomIndex),
    /// Push the scope object that holds a name (the global if unresolved)
    BindName(AtomIndex),
    /// [scope, value] -> [value]: assign through a bound scope object
    SetName(AtomIndex),
    /// Push a callee and its `this` resolved by name
    CallName(AtomIndex),
    /// Delete a name from its holder, push the result
    DelName(AtomIndex),
    /// Increment/decrement a name
    NameIncDec(AtomIndex, IncDec),

    // Fast globals (index into the script's global name table)
    /// Push a top-level variable through its cached global slot
    GetGVar(u16),
    /// Assign a top-level variable through its cached global slot
    SetGVar(u16),
    /// Increment/decrement a top-level variable
    GVarIncDec(u16, IncDec),

    // Declarations
    /// Declare a variable in the frame's variables object
    DefVar(AtomIndex),
    /// Declare a read-only constant in the frame's variables object
    DefConst(AtomIndex),
    /// [value] -> []: initialize a constant declared by `DefConst`
    InitConst(AtomIndex),
    /// Bind a nested function declaration
    DefFun(u32),

    // Properties
    /// [obj] -> [obj.id]
    GetProp(AtomIndex),
    /// [obj, value] -> [value]
    SetProp(AtomIndex),
    /// [obj] -> [obj.id, obj]
    CallProp(AtomIndex),
    /// [obj] -> [result]
    PropIncDec(AtomIndex, IncDec),
    /// [obj, key] -> [obj[key]]
    GetElem,
    /// [obj, key, value] -> [value]
    SetElem,
    /// [obj, key] -> [obj[key], obj]
    CallElem,
    /// [obj, key] -> [result]
    ElemIncDec(IncDec),
    /// [obj] -> [deleted]
    DelProp(AtomIndex),
    /// [obj, key] -> [deleted]
    DelElem,
    /// [key, obj] -> [key in obj]
    In,
    /// [value, ctor] -> [value instanceof ctor]
    Instanceof,
    /// Push a fresh plain object
    NewObject,
    /// [obj, value] -> [obj]: define an enumerable data property
    InitProp(AtomIndex),
    /// [obj, key, value] -> [obj]
    InitElem,
    /// [obj, fn] -> [obj]: define the getter half of an accessor
    InitGetter(AtomIndex),
    /// [obj, fn] -> [obj]: define the setter half of an accessor
    InitSetter(AtomIndex),

    // Arithmetic and logic
    /// Addition or string concatenation
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Mod,
    /// Unary minus
    Neg,
    /// Unary plus (ToNumber)
    Pos,
    /// Logical not
    Not,
    /// Bitwise not
    BitNot,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
    /// Left shift
    Lsh,
    /// Signed right shift
    Rsh,
    /// Unsigned right shift
    Ursh,
    /// typeof operator
    Typeof,
    /// Replace top with undefined
    Void,

    // Comparison
    /// Abstract equality
    Eq,
    /// Abstract inequality
    Ne,
    /// Strict equality
    StrictEq,
    /// Strict inequality
    StrictNe,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,

    // Control flow
    /// Unconditional branch
    Goto(i32),
    /// Pop; branch if falsy
    IfEq(i32),
    /// Pop; branch if truthy
    IfNe(i32),
    /// Branch keeping top if truthy, else pop
    Or(i32),
    /// Branch keeping top if falsy, else pop
    And(i32),
    /// Dense integer switch: pop; jump to `targets[v - low]` when `v` is an
    /// integer in `[low, high]` with a non-zero target, else to `default`
    TableSwitch {
        /// Default offset
        default: i32,
        /// Smallest case value
        low: i32,
        /// Largest case value
        high: i32,
        /// One offset per value in `[low, high]`, 0 for holes
        targets: Box<[i32]>,
    },
    /// Sparse switch: pop; jump to the first case whose constant is
    /// strictly equal, else to `default`
    LookupSwitch {
        /// Default offset
        default: i32,
        /// Case constants and offsets
        cases: Box<[(ConstIndex, i32)]>,
    },
    /// Debugger trap
    Debugger,

    // Calls
    /// [callee, this, args...] -> [result]
    Call(u16),
    /// [callee, this, args...] -> [result]: construct
    New(u16),
    /// [callee, this, args...] -> [result]: call, direct eval when the
    /// callee is the realm's eval function
    Eval(u16),
    /// Pop the return value and leave the frame
    Return,
    /// Pop into the frame's return value register
    SetRval,
    /// Leave the frame with the return value register
    RetRval,
    /// End of script: leave the frame with the return value register
    Stop,
    /// Push a closure over the current scope chain
    Lambda(u32),

    // Exceptions
    /// Marks the start of a protected region
    Try,
    /// Marks the start of a finally block
    Finally,
    /// Pop and throw
    Throw,
    /// Push the pending exception and clear it
    Exception,
    /// Push (normal flag, return offset) and branch to a finally block
    Gosub(i32),
    /// Pop (flag, value): rethrow, or return to the recorded offset
    Retsub,

    // Scopes
    /// Open a compile-time block, pushing its locals as undefined
    EnterBlock(u32),
    /// Close the innermost block, popping its locals
    LeaveBlock(u32),
    /// [obj] -> [with scope]: push a dynamic scope for `obj`
    EnterWith,
    /// [with scope] -> []
    LeaveWith,

    // Iteration
    /// [obj] -> [iterator]
    Iter(IterKind),
    /// [iterator] -> [iterator, value, more]
    NextIter,
    /// [iterator] -> []: close the iterator
    EndIter,

    // Generators
    /// Suspend the fresh frame into a generator object and return it
    Generator,
    /// [value] -> [sent]: suspend the generator frame
    Yield,
}

impl Opcode {
    /// Returns the (pops, pushes) pair for this opcode.
    ///
    /// `block_len` maps a block index to its number of locals; it is only
    /// consulted for `EnterBlock` and `LeaveBlock`.
    pub fn stack_effect(&self, block_len: impl Fn(u32) -> Option<u32>) -> Option<(u32, u32)> {
        use Opcode::*;
        let effect = match self {
            Undefined | Null | True | False | Int(_) | Const(_) | This => (0, 1),
            Pop => (1, 0),
            PopN(n) => (*n as u32, 0),
            Dup => (1, 2),
            Dup2 => (2, 4),
            Swap => (2, 2),
            Nop | Debugger | Try | Finally | Generator => (0, 0),

            GetArg(_) | GetLocal(_) | Arguments => (0, 1),
            SetArg(_) | SetLocal(_) => (1, 1),
            ArgIncDec(..) | LocalIncDec(..) => (0, 1),

            Name(_) | TypeofName(_) | BindName(_) => (0, 1),
            SetName(_) => (2, 1),
            CallName(_) => (0, 2),
            DelName(_) | NameIncDec(..) => (0, 1),

            GetGVar(_) | GVarIncDec(..) => (0, 1),
            SetGVar(_) => (1, 1),

            DefVar(_) | DefConst(_) | DefFun(_) => (0, 0),
            InitConst(_) => (1, 0),

            GetProp(_) | PropIncDec(..) | DelProp(_) => (1, 1),
            SetProp(_) => (2, 1),
            CallProp(_) => (1, 2),
            GetElem | ElemIncDec(_) | DelElem => (2, 1),
            SetElem => (3, 1),
            CallElem => (2, 2),
            In | Instanceof => (2, 1),
            NewObject => (0, 1),
            InitProp(_) | InitGetter(_) | InitSetter(_) => (2, 1),
            InitElem => (3, 1),

            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Lsh | Rsh | Ursh => (2, 1),
            Eq | Ne | StrictEq | StrictNe | Lt | Le | Gt | Ge => (2, 1),
            Neg | Pos | Not | BitNot | Typeof | Void => (1, 1),

            Goto(_) => (0, 0),
            IfEq(_) | IfNe(_) => (1, 0),
            // The taken edge keeps the value; see `branch_pushes_back`.
            Or(_) | And(_) => (1, 0),
            TableSwitch { .. } | LookupSwitch { .. } => (1, 0),

            Call(argc) | New(argc) | Eval(argc) => (*argc as u32 + 2, 1),
            Return | SetRval => (1, 0),
            RetRval | Stop => (0, 0),
            Lambda(_) => (0, 1),

            Throw => (1, 0),
            Exception => (0, 1),
            Gosub(_) => (0, 0),
            Retsub => (2, 0),

            EnterBlock(b) => (0, block_len(*b)?),
            LeaveBlock(b) => (block_len(*b)?, 0),
            EnterWith => (1, 1),
            LeaveWith => (1, 0),

            Iter(_) => (1, 1),
            NextIter => (1, 3),
            EndIter => (1, 0),
            Yield => (1, 1),
        };
        Some(effect)
    }

    /// Net depth change along the taken edge of a conditional branch,
    /// relative to the depth after the opcode's normal pops.
    pub fn branch_pushes_back(&self) -> u32 {
        match self {
            Opcode::Or(_) | Opcode::And(_) => 1,
            _ => 0,
        }
    }

    /// Offset of a simple branch, if this is one.
    pub fn branch_offset(&self) -> Option<i32> {
        match self {
            Opcode::Goto(o)
            | Opcode::IfEq(o)
            | Opcode::IfNe(o)
            | Opcode::Or(o)
            | Opcode::And(o)
            | Opcode::Gosub(o) => Some(*o),
            _ => None,
        }
    }

    /// Rewrites the offset of a simple branch. Returns false for other opcodes.
    pub fn set_branch_offset(&mut self, offset: i32) -> bool {
        match self {
            Opcode::Goto(o)
            | Opcode::IfEq(o)
            | Opcode::IfNe(o)
            | Opcode::Or(o)
            | Opcode::And(o)
            | Opcode::Gosub(o) => {
                *o = offset;
                true
            }
            _ => false,
        }
    }

    /// Returns true if control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Goto(_)
                | Opcode::Return
                | Opcode::RetRval
                | Opcode::Stop
                | Opcode::Throw
                | Opcode::Retsub
                | Opcode::TableSwitch { .. }
                | Opcode::LookupSwitch { .. }
        )
    }

    /// Returns true for the call-family opcodes that may brand a holder when
    /// their property access fills the property cache.
    pub fn is_call_op(&self) -> bool {
        matches!(self, Opcode::CallProp(_) | Opcode::CallName(_) | Opcode::CallElem)
    }
}
