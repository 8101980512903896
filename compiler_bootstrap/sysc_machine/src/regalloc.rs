//! Register allocation (spec §4.9): a backward per-block liveness sweep builds an
//! interference graph, a greedy priority coloring assigns class-relative register numbers or
//! stack slots, and the result is recorded purely as attributes (`Attr::Reg`/`Attr::SpilledRd`
//! on a value's defining op). Generic over the target opcode set via `MachineOpKind` so one
//! allocator serves both `ArmOp` and `RvOp` (grounded on `original_source/src/arm/RegAlloc.cpp`
//! and `original_source/src/rv/RegAlloc.cpp`, which share the same structure across targets).
//!
//! Unlike the original, operands are never erased and replaced by per-slot register
//! attributes — a value's location is always resolvable from its own defining op's `Attr::Reg`
//! / `Attr::SpilledRd`, reached through the still-live `OpId`. A consuming op only gets an
//! extra `Attr::SpilledRs`/`Rs2`/`Rs3` when one of its first three operands was spilled, telling
//! `emit` to reload rather than trust a register. This keeps the allocator from having to
//! rebuild the information the IR already carries, at the cost of depending on operands
//! staying intact through emission (true here: nothing after this pass mutates the graph).
//!
//! Phi nodes are colored like any other value but are not structurally destroyed: `emit`
//! resolves the copies an edge needs (spec's "parallel copy") when it walks each block's
//! successors, by reading the successor's phis directly rather than this pass rewriting the
//! CFG. Coloring gives phi results priority class 2 (after `ReadReg`/`WriteReg`/phi-operands'
//! class 1) and prefers an operand's already-assigned color when one is free, so a phi often
//! needs no copy at all; `emit::emit_moves` still builds the real move graph and breaks any
//! remaining permutation cycle with a scratch register, since coalescing reduces cycles but
//! does not rule them out (spec §4.9 Steps 3 and 6).
//!
//! `ReadReg`/`WriteReg` carry `Attr::ArgReg`, the class-relative ABI argument/return-register
//! index instruction selection assigns (`select.rs`). `ReadReg` is pre-colored here to match it
//! directly (spec Step 1's "rewrite `GetArg(i)` for `i<8` to a `ReadReg` of the corresponding
//! argument register"); `WriteReg` stays `Ty::Void` and is never added to the graph — nothing
//! ever reads its result, so `emit` prints its fixed destination register straight from its own
//! `Attr::ArgReg` rather than from allocator output. A `PlaceHolder` op is pre-colored to each
//! caller-saved class-relative register and placed right after a call (`select.rs`), so every
//! value live across the call interferes with the full caller-saved set and is pushed into the
//! callee-saved half instead.

use hashbrown::{HashMap, HashSet};
use sysc_common::{SyscError, SyscResult};
use sysc_ir::{Attr, Ir, OpId, OpKind, RegionId, Ty};

/// What the allocator needs from a concrete machine opcode set.
pub trait MachineOpKind: OpKind {
    /// A plain register-to-register copy, used by `emit` for phi-edge copies and spill reloads.
    fn make_move() -> Self;
    /// True for call-instruction kinds — every value live across one should prefer a
    /// callee-saved slot, modeled here by coloring cross-call values last.
    fn is_call(&self) -> bool;
    /// True for the allocator's own clobber markers, pre-colored to a caller-saved register and
    /// placed right after a call site (never selected by instruction selection directly, never
    /// emitted as a line of their own).
    fn is_placeholder(&self) -> bool;
    /// True for `ReadReg`/`WriteReg`, the ABI-register-bound ops spec §4.9 Step 3 gives
    /// priority class 1 (colored before anything else, pre-colored for `ReadReg`) so every other
    /// value sees their fixed-register interference before picking its own color.
    fn is_reg_io(&self) -> bool;
}

/// Allocatable registers per class: a class-relative numbering `emit` maps onto each target's
/// real register file. Sized to the smaller of the two targets' caller-saved allocatable sets
/// so the same table is valid for both backends.
pub const GP_CLASS_REGS: u8 = 10;
pub const FP_CLASS_REGS: u8 = 8;

/// How many of the low, class-relative colors are caller-saved — the ABI argument registers
/// (`Attr::ArgReg` never exceeds this) plus temporaries clobbered by any call. Colors at or
/// above this are callee-saved and need prologue/epilogue save/restore (spec §4.9 Step 8).
pub const GP_CALLER_SAVED: u8 = 8;
pub const FP_CALLER_SAVED: u8 = 6;

const SLOT_BYTES: i32 = 8;

#[derive(Default)]
pub struct RegAlloc {
    pub colored: i64,
    pub spilled: i64,
}

impl RegAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<K: MachineOpKind>(&mut self, ir: &mut Ir<K>, region: RegionId) -> SyscResult<()> {
        ir.update_doms(region);
        let live = ir.compute_liveness(region);
        let blocks = ir.region(region).blocks.clone();

        let mut graph: HashMap<OpId, HashSet<OpId>> = HashMap::new();
        let mut is_fp: HashMap<OpId, bool> = HashMap::new();
        let mut crosses_call: HashSet<OpId> = HashSet::new();

        for &b in &blocks {
            let mut live_now: HashSet<OpId> = live.live_out.get(&b).cloned().unwrap_or_default();
            for &v in &live_now {
                graph.entry(v).or_default();
            }
            for op in ir.block_ops(b).into_iter().rev() {
                let data = ir.op(op);
                if data.erased {
                    continue;
                }
                let produces_value = !matches!(data.result_ty, Ty::Void) || data.kind.is_placeholder();
                if produces_value {
                    graph.entry(op).or_default();
                    is_fp.insert(op, data.result_ty.is_float());
                    for &other in &live_now {
                        if other != op {
                            graph.entry(op).or_default().insert(other);
                            graph.entry(other).or_default().insert(op);
                        }
                    }
                    live_now.remove(&op);
                }
                if data.kind.is_call() {
                    crosses_call.extend(live_now.iter().copied());
                }
                if !data.kind.is_phi() {
                    for &operand in &data.operands.clone() {
                        if !ir.op(operand).erased {
                            live_now.insert(operand);
                        }
                    }
                }
            }
        }

        // A value referenced as a phi operand is class 1 alongside `ReadReg`/`WriteReg`: it
        // needs a real color before the phi tries to coalesce against it.
        let mut phi_operands: HashSet<OpId> = HashSet::new();
        for &v in graph.keys() {
            if ir.op(v).kind.is_phi() {
                for &operand in &ir.op(v).operands {
                    phi_operands.insert(operand);
                }
            }
        }

        // `ReadReg`/`WriteReg` (well, `PlaceHolder` standing in for a caller-saved register, and
        // `ReadReg` for an argument register) are pre-colored outright: the calling convention
        // picked their register already, so they skip the greedy search entirely and just
        // contribute interference to everything else.
        let mut color: HashMap<OpId, u8> = HashMap::new();
        for &v in graph.keys() {
            let data = ir.op(v);
            let preset = if data.kind.is_placeholder() {
                data.attrs.iter().find_map(|a| a.as_reg())
            } else {
                data.attrs.iter().find_map(|a| a.as_arg_reg())
            };
            if let Some(c) = preset {
                color.insert(v, c);
            }
        }

        // Priority order within the remaining values: class 1 (`ReadReg`/`WriteReg`/phi
        // operands) before class 0/default, phi results (class 2) last so they can coalesce
        // against an operand's already-assigned color; within a class, values crossing a call
        // go last (pushed into the callee-saved half), then by descending interference degree,
        // the usual greedy-coloring heuristic.
        let priority_class = |v: OpId| -> u8 {
            let data = ir.op(v);
            if data.kind.is_phi() {
                2
            } else if data.kind.is_reg_io() || phi_operands.contains(&v) {
                0
            } else {
                1
            }
        };
        let mut order: Vec<OpId> = graph.keys().copied().filter(|v| !color.contains_key(v)).collect();
        order.sort_by_key(|&v| (priority_class(v), crosses_call.contains(&v), std::cmp::Reverse(graph[&v].len()), v));

        let mut stack_offset: HashMap<OpId, i32> = HashMap::new();
        let mut next_offset: i32 = SLOT_BYTES;

        for v in order {
            let fp = *is_fp.get(&v).unwrap_or(&false);
            let class_size = if fp { FP_CLASS_REGS } else { GP_CLASS_REGS };
            let used: HashSet<u8> = graph[&v]
                .iter()
                .filter(|n| is_fp.get(n).copied().unwrap_or(false) == fp)
                .filter_map(|n| color.get(n).copied())
                .collect();
            // Coalescing: a phi result prefers a color already held by one of its operands, so
            // the copy `emit` would otherwise need at that predecessor edge disappears.
            let preferred = ir.op(v).kind.is_phi().then(|| {
                ir.op(v).operands.iter().filter_map(|o| color.get(o).copied()).find(|c| !used.contains(c))
            }).flatten();
            if let Some(c) = preferred.or_else(|| (0..class_size).find(|c| !used.contains(c))) {
                color.insert(v, c);
                self.colored += 1;
            } else {
                log::debug!("spilling %{v} to offset {next_offset} (class full: {class_size} regs)");
                stack_offset.insert(v, next_offset);
                next_offset += SLOT_BYTES;
                self.spilled += 1;
            }
        }

        log::debug!("allocation done: {} colored, {} spilled", self.colored, self.spilled);

        if next_offset > i32::from(u16::MAX) {
            log::warn!("frame size {next_offset} exceeds the supported spill-space limit");
            return Err(SyscError::overconstrained_spill(format!(
                "function needs {next_offset} bytes of spill space, exceeding the supported frame size"
            )));
        }

        for &b in &blocks {
            for op in ir.block_ops(b) {
                if ir.op(op).erased || ir.op(op).kind.is_placeholder() {
                    continue;
                }
                let fp = ir.op(op).result_ty.is_float();
                if let Some(&c) = color.get(&op) {
                    ir.op_mut(op).attrs.push(Attr::Reg(c));
                } else if let Some(&offset) = stack_offset.get(&op) {
                    ir.op_mut(op).attrs.push(Attr::SpilledRd { offset, is_fp: fp });
                }

                let operands = ir.op(op).operands.clone();
                for (i, &operand) in operands.iter().take(3).enumerate() {
                    if let Some(&offset) = stack_offset.get(&operand) {
                        let is_fp = ir.op(operand).result_ty.is_float();
                        let attr = match i {
                            0 => Attr::SpilledRs { offset, is_fp },
                            1 => Attr::SpilledRs2 { offset, is_fp },
                            _ => Attr::SpilledRs3 { offset, is_fp },
                        };
                        ir.op_mut(op).attrs.push(attr);
                    }
                }
            }
        }

        if let Some(&entry) = blocks.first() {
            if let Some(func) = ir.block(entry).parent_region.and_then(|r| ir.region(r).owner) {
                ir.op_mut(func).attrs.push(Attr::FrameSize(next_offset - SLOT_BYTES));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_op::ArmOp;
    use sysc_ir::{Builder, Ty};

    #[test]
    fn two_simultaneously_live_values_get_distinct_registers() {
        let mut ir: Ir<ArmOp> = Ir::new();
        let region = ir.new_region(None);
        let module_block = ir.append_block(region);
        let mut b = Builder::new();
        b.set_to_block_start(&ir, module_block);
        let func = b.create(&mut ir, ArmOp::Func, &[], vec![], Ty::Void);
        let body = ir.append_region_to(func);
        let entry = ir.append_block(body);

        b.set_to_block_start(&ir, entry);
        let a = b.create(&mut ir, ArmOp::Movz, &[], vec![Attr::Int(1)], Ty::I32);
        let c = b.create(&mut ir, ArmOp::Movz, &[], vec![Attr::Int(2)], Ty::I32);
        let sum = b.create(&mut ir, ArmOp::Add, &[a, c], vec![], Ty::I32);
        b.create(&mut ir, ArmOp::Ret, &[sum], vec![], Ty::Void);

        RegAlloc::new().run(&mut ir, body).expect("allocation should succeed");

        let reg_of = |op: OpId| ir.op(op).attrs.iter().find_map(|at| at.as_reg());
        assert_ne!(reg_of(a), reg_of(c), "a and c are simultaneously live at `sum` and must differ");
    }

    #[test]
    fn more_live_values_than_registers_spills_the_lowest_priority_one() {
        let mut ir: Ir<ArmOp> = Ir::new();
        let region = ir.new_region(None);
        let module_block = ir.append_block(region);
        let mut b = Builder::new();
        b.set_to_block_start(&ir, module_block);
        let func = b.create(&mut ir, ArmOp::Func, &[], vec![], Ty::Void);
        let body = ir.append_region_to(func);
        let entry = ir.append_block(body);

        b.set_to_block_start(&ir, entry);
        let mut values = Vec::new();
        for i in 0..(GP_CLASS_REGS as i64 + 2) {
            values.push(b.create(&mut ir, ArmOp::Movz, &[], vec![Attr::Int(i)], Ty::I32));
        }
        let mut sum = values[0];
        for &v in &values[1..] {
            sum = b.create(&mut ir, ArmOp::Add, &[sum, v], vec![], Ty::I32);
        }
        b.create(&mut ir, ArmOp::Ret, &[sum], vec![], Ty::Void);

        RegAlloc::new().run(&mut ir, body).expect("allocation should succeed");
        assert!(values.iter().any(|&v| ir.op(v).attrs.iter().any(|a| matches!(a, Attr::SpilledRd { .. }))));
    }
}
