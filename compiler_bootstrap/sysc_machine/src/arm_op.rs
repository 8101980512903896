//! AArch64-flavored machine opcodes (spec §4.8), grounded on the teacher's `MidOp` shape and
//! `original_source/src/codegen/Arm64CodeGen.cpp`'s instruction vocabulary.

use sysc_ir::OpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOp {
    /// Top-level container, mirrors `MidOp::Module`.
    Module,
    /// One function, mirrors `MidOp::Func`; carries `Attr::Name`/`Attr::Size` (arity) and,
    /// after allocation, the frame size via `Attr::Size` on a nested marker — see `regalloc`.
    Func,
    /// Reserves a stack slot and produces its address; mirrors `MidOp::Alloca` pre-allocation.
    Alloca,
    Add,
    Sub,
    Mul,
    Sdiv,
    Smulh,
    Umulh,
    And,
    Orr,
    Eor,
    Lsl,
    Lsr,
    Asr,
    /// Compare-and-set: result is 0/1, condition carried in `Attr::Name` ("eq"/"ne"/"lt"/"le").
    CmpSet,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Scvtf,
    Fcvtzs,
    Neg,
    Fneg,
    Mvn,
    /// Load a 32-bit or 64-bit immediate into a register.
    Movz,
    /// Register-to-register copy, inserted by SSA destruction / argument shuffling.
    Mov,
    Ldr,
    Str,
    /// `adrp`+`add` pair collapsed to one pseudo-op; `emit` expands it.
    Adr,
    Bl,
    Ret,
    B,
    /// Conditional branch: `Attr::Target` (taken), `Attr::Else` (fallthrough/not-taken).
    Bcond,
    /// Materializes an incoming argument/physical register as an SSA value (spec §4.9 step 1).
    ReadReg,
    /// Writes an SSA value out to a physical register ahead of a call or return.
    WriteReg,
    /// Marks the caller-saved registers clobbered by a call, for interference purposes.
    PlaceHolder,
    Phi,
    Nop,
}

impl OpKind for ArmOp {
    fn mnemonic(&self) -> &'static str {
        use ArmOp::*;
        match self {
            Module => "module",
            Func => "func",
            Alloca => "alloca",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Sdiv => "sdiv",
            Smulh => "smulh",
            Umulh => "umulh",
            And => "and",
            Orr => "orr",
            Eor => "eor",
            Lsl => "lsl",
            Lsr => "lsr",
            Asr => "asr",
            CmpSet => "cmpset",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Scvtf => "scvtf",
            Fcvtzs => "fcvtzs",
            Neg => "neg",
            Fneg => "fneg",
            Mvn => "mvn",
            Movz => "movz",
            Mov => "mov",
            Ldr => "ldr",
            Str => "str",
            Adr => "adr",
            Bl => "bl",
            Ret => "ret",
            B => "b",
            Bcond => "b.cond",
            ReadReg => "readreg",
            WriteReg => "writereg",
            PlaceHolder => "placeholder",
            Phi => "phi",
            Nop => "nop",
        }
    }

    fn is_terminator(&self) -> bool {
        matches!(self, ArmOp::Ret | ArmOp::B | ArmOp::Bcond)
    }

    fn is_phi(&self) -> bool {
        matches!(self, ArmOp::Phi)
    }
}

impl crate::regalloc::MachineOpKind for ArmOp {
    fn make_move() -> Self {
        ArmOp::Mov
    }

    fn is_call(&self) -> bool {
        matches!(self, ArmOp::Bl)
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, ArmOp::PlaceHolder)
    }

    fn is_reg_io(&self) -> bool {
        matches!(self, ArmOp::ReadReg | ArmOp::WriteReg)
    }
}
