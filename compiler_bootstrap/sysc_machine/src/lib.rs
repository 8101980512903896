//! The machine-IR layer (spec §4.8-4.10): instruction selection tiles mid-level IR onto a
//! target opcode set, register allocation colors it, and `emit` prints the result. Two
//! targets, one shared pipeline, parameterized by the small per-target `select::Target` and
//! `emit::Syntax` traits and the `regalloc::MachineOpKind` bound.

pub mod arm_op;
pub mod emit;
pub mod regalloc;
pub mod rv_op;
pub mod select;

pub use arm_op::ArmOp;
pub use emit::{emit_arm, emit_rv, ArmSyntax, RvSyntax, Syntax};
pub use regalloc::{MachineOpKind, RegAlloc, FP_CLASS_REGS, GP_CLASS_REGS};
pub use rv_op::RvOp;
pub use select::{lower, ArmTarget, MachineModule, RvTarget, Target};

use sysc_ir::MidModule;
use sysc_common::SyscResult;

/// Runs selection, per-function register allocation, and emission for the AArch64-like
/// target, in that order — the convenience entry point `sysc_cli` calls for `--arm`.
pub fn compile_to_arm(mid: &MidModule) -> SyscResult<String> {
    let mut module = lower::<ArmOp, ArmTarget>(mid);
    allocate_all(&mut module)?;
    Ok(emit_arm(&module))
}

/// Same pipeline, targeting RISC-V — the entry point `sysc_cli` calls for `--rv`.
pub fn compile_to_rv(mid: &MidModule) -> SyscResult<String> {
    let mut module = lower::<RvOp, RvTarget>(mid);
    allocate_all(&mut module)?;
    Ok(emit_rv(&module))
}

fn allocate_all<K: MachineOpKind>(module: &mut MachineModule<K>) -> SyscResult<()> {
    let funcs = module.funcs();
    for func in funcs {
        let region = module.ir.op(func).regions[0];
        RegAlloc::new().run(&mut module.ir, region)?;
    }
    Ok(())
}
