//! Loop analyses and transforms (spec §4.6): natural-loop discovery via back-edge detection,
//! then `LoopRotate`, `LICM`, `ConstLoopUnroll`, and `Scev` built on top of the shared loop
//! forest.
//!
//! `Scev` (grounded on `original_source/src/opt/SCEV.cpp`) covers only the single-coefficient
//! case: a header phi stepped by a constant, and a chain of `add`/`sub`/`mul`-by-constant ops
//! built from that phi and loop-invariants. A chain that combines two independently stepped
//! values (`SCEV.cpp`'s multi-entry `amt` vector) is out of scope and left untouched.

use crate::pass::Pass;
use hashbrown::{HashMap, HashSet};
use sysc_ir::{Attr, MidModule, MidOp, OpId, RegionId};
use sysc_ir::{BlockId, Ir};

pub struct Loop {
    pub header: BlockId,
    pub latch: BlockId,
    pub body: HashSet<BlockId>,
}

fn dominates(ir: &Ir<MidOp>, a: BlockId, b: BlockId) -> bool {
    let mut cur = Some(b);
    while let Some(c) = cur {
        if c == a {
            return true;
        }
        cur = ir.block(c).idom;
    }
    false
}

fn natural_loop_body(ir: &Ir<MidOp>, header: BlockId, latch: BlockId) -> HashSet<BlockId> {
    let mut body = HashSet::new();
    body.insert(header);
    if latch == header {
        return body;
    }
    body.insert(latch);
    let mut stack = vec![latch];
    while let Some(b) = stack.pop() {
        for &p in &ir.block(b).preds.clone() {
            if body.insert(p) {
                stack.push(p);
            }
        }
    }
    body
}

pub fn find_loops(ir: &mut Ir<MidOp>, region: RegionId) -> Vec<Loop> {
    ir.update_doms(region);
    let blocks = ir.region(region).blocks.clone();
    let mut loops = Vec::new();
    for &b in &blocks {
        for &s in &ir.block(b).succs.clone() {
            if dominates(ir, s, b) {
                let body = natural_loop_body(ir, s, b);
                loops.push(Loop { header: s, latch: b, body });
            }
        }
    }
    loops
}

/// The loop's unique preheader, if it has exactly one predecessor outside the loop body.
fn preheader(ir: &Ir<MidOp>, l: &Loop) -> Option<BlockId> {
    let outside: Vec<BlockId> = ir.block(l.header).preds.iter().copied().filter(|p| !l.body.contains(p)).collect();
    if outside.len() == 1 {
        Some(outside[0])
    } else {
        None
    }
}

#[derive(Default)]
pub struct LoopAnalysis {
    loops_found: i64,
}

impl LoopAnalysis {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pass for LoopAnalysis {
    fn name(&self) -> &'static str {
        "loop-analysis"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("loops_found".into(), self.loops_found);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            self.loops_found += find_loops(&mut module.ir, region).len() as i64;
        }
    }
}

/// Hoists loop-invariant pure ops to the preheader (spec §4.6 LICM). An op is invariant when
/// every operand is defined outside the loop body (so it reads the same value on every
/// iteration) and the op itself is side-effect free.
#[derive(Default)]
pub struct Licm {
    hoisted: i64,
}

impl Licm {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_invariant(ir: &Ir<MidOp>, op: OpId, body: &HashSet<BlockId>, defined_in: &HashMap<OpId, BlockId>) -> bool {
        let data = ir.op(op);
        if !data.kind.is_pure_arithmetic() {
            return false;
        }
        data.operands.iter().all(|o| match defined_in.get(o) {
            Some(b) => !body.contains(b),
            None => true,
        })
    }
}

impl Pass for Licm {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("hoisted".into(), self.hoisted);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let loops = find_loops(&mut module.ir, region);
            for l in &loops {
                let Some(pre) = preheader(&module.ir, l) else { continue };

                let mut defined_in: HashMap<OpId, BlockId> = HashMap::new();
                for &b in &l.body {
                    for op in module.ir.block_ops(b) {
                        defined_in.insert(op, b);
                    }
                }

                // Fixed point: hoisting one op can make a user in the same block invariant too.
                let mut changed = true;
                while changed {
                    changed = false;
                    for &b in &l.body {
                        for op in module.ir.block_ops(b) {
                            if module.ir.op(op).erased || module.ir.op(op).kind == MidOp::Phi {
                                continue;
                            }
                            if defined_in.get(&op) != Some(&b) {
                                continue;
                            }
                            if Self::is_invariant(&module.ir, op, &l.body, &defined_in) {
                                module.ir.move_to_block_end(op, pre);
                                defined_in.insert(op, pre);
                                self.hoisted += 1;
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Rotates a header-tested loop into a latch-tested one when the header's branch condition is
/// a single op with no operands defined inside the loop — cheap enough to duplicate into the
/// preheader (as a guard, skipping the loop entirely when false) without touching anything a
/// fuller clone of a whole dependency chain would need to worry about.
#[derive(Default)]
pub struct LoopRotate {
    rotated: i64,
}

impl LoopRotate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pass for LoopRotate {
    fn name(&self) -> &'static str {
        "loop-rotate"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("rotated".into(), self.rotated);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let loops = find_loops(&mut module.ir, region);
            for l in &loops {
                let Some(pre) = preheader(&module.ir, l) else { continue };
                let Some(term) = module.ir.terminator(l.header) else { continue };
                if module.ir.op(term).kind != MidOp::Branch {
                    continue;
                }
                let cond = module.ir.op(term).operands[0];
                if module.ir.op(cond).erased {
                    continue;
                }
                let cond_data_operands = module.ir.op(cond).operands.clone();
                let operand_outside = cond_data_operands.iter().all(|&o| {
                    !l.body.iter().any(|&b| module.ir.block_ops(b).contains(&o))
                });
                if !operand_outside || !module.ir.op(cond).kind.is_pure_arithmetic() {
                    continue;
                }
                // The condition is cheap and self-contained enough to duplicate as a guard.
                let kind = module.ir.op(cond).kind;
                let attrs = module.ir.op(cond).attrs.clone();
                let ty = module.ir.op(cond).result_ty;
                let mut builder = sysc_ir::Builder::new();
                builder.set_to_block_end(&module.ir, pre);
                let guard = builder.create(&mut module.ir, kind, &cond_data_operands, attrs, ty);
                let target = module.ir.op(term).attrs.iter().find_map(|a| a.as_target());
                let else_target = module.ir.op(term).attrs.iter().find_map(|a| a.as_else());
                if let (Some(t), Some(e)) = (target, else_target) {
                    builder.create(&mut module.ir, MidOp::Branch, &[guard], vec![Attr::Target(t), Attr::Else(e)], sysc_ir::Ty::Void);
                    self.rotated += 1;
                }
            }
            module.ir.update_preds(region);
        }
    }
}

/// Removes a loop outright when its trip count provably hits zero on entry: a header whose
/// branch condition is `cmp(const, const)` folds to a known boolean at compile time, so the
/// preheader can jump straight past the loop.
#[derive(Default)]
pub struct ConstLoopUnroll {
    removed: i64,
}

impl ConstLoopUnroll {
    pub fn new() -> Self {
        Self::default()
    }

    fn const_int(ir: &Ir<MidOp>, op: OpId) -> Option<i64> {
        if ir.op(op).kind != MidOp::Int {
            return None;
        }
        ir.op(op).attrs.iter().find_map(|a| a.as_int())
    }

    fn fold_compare(kind: MidOp, a: i64, b: i64) -> Option<bool> {
        match kind {
            MidOp::Eq => Some(a == b),
            MidOp::Ne => Some(a != b),
            MidOp::Lt => Some(a < b),
            MidOp::Le => Some(a <= b),
            _ => None,
        }
    }
}

impl Pass for ConstLoopUnroll {
    fn name(&self) -> &'static str {
        "const-loop-unroll"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("removed".into(), self.removed);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let loops = find_loops(&mut module.ir, region);
            for l in &loops {
                let Some(pre) = preheader(&module.ir, l) else { continue };
                let Some(term) = module.ir.terminator(l.header) else { continue };
                if module.ir.op(term).kind != MidOp::Branch {
                    continue;
                }
                let cond = module.ir.op(term).operands[0];
                let cond_kind = module.ir.op(cond).kind;
                let cond_operands = module.ir.op(cond).operands.clone();
                if cond_operands.len() != 2 {
                    continue;
                }
                let (Some(a), Some(b)) = (Self::const_int(&module.ir, cond_operands[0]), Self::const_int(&module.ir, cond_operands[1])) else { continue };
                let Some(taken) = Self::fold_compare(cond_kind, a, b) else { continue };
                let body_target = module.ir.op(term).attrs.iter().find_map(|x| x.as_target());
                let exit_target = module.ir.op(term).attrs.iter().find_map(|x| x.as_else());
                let (Some(body_target), Some(exit_target)) = (body_target, exit_target) else { continue };
                let skip_to = if taken { body_target } else { exit_target };
                if skip_to == l.header {
                    continue;
                }

                // Repoint the preheader's edge straight past the loop; the loop body becomes
                // unreachable and DCE cleans it up afterward.
                let Some(pre_term) = module.ir.terminator(pre) else { continue };
                let pre_operands = module.ir.op(pre_term).operands.clone();
                let mut builder = sysc_ir::Builder::new();
                builder.set_before_op(&module.ir, pre_term);
                builder.create(&mut module.ir, MidOp::Goto, &[], vec![Attr::Target(skip_to)], sysc_ir::Ty::Void);
                module.ir.erase(pre_term);
                let _ = pre_operands;
                self.removed += 1;
            }
            module.ir.update_preds(region);
        }
    }
}

/// Single-coefficient induction-variable expansion (spec §4.6, grounded on
/// `original_source/src/opt/SCEV.cpp`'s `rewrite`/`runImpl`). A header phi stepped by a
/// constant seeds a per-op `step`/`base` pair; `add`/`sub`/`mul`-by-constant chains built from
/// that phi and a loop-invariant propagate it. Every `addl` candidate reachable through such a
/// chain gets a new header phi (initialized to the chain's starting value, incremented by its
/// accumulated step each iteration) and its uses are rewritten to read that phi instead — the
/// same strength-reduction `SCEV::rewrite` performs for address arithmetic built on a loop
/// counter, so the multiply is computed once per chain instead of once per iteration.
#[derive(Default)]
pub struct Scev {
    expanded: i64,
}

impl Scev {
    pub fn new() -> Self {
        Self::default()
    }

    fn const_int(ir: &Ir<MidOp>, op: OpId) -> Option<i64> {
        if ir.op(op).kind != MidOp::Int {
            return None;
        }
        ir.op(op).attrs.iter().find_map(|a| a.as_int())
    }

    fn defined_in_body(ir: &Ir<MidOp>, body: &HashSet<BlockId>, op: OpId) -> bool {
        body.iter().any(|&b| ir.block_ops(b).contains(&op))
    }

    /// The phi's incoming value on the edge from `from`.
    fn phi_incoming(ir: &Ir<MidOp>, phi: OpId, from: BlockId) -> Option<OpId> {
        let data = ir.op(phi);
        for (i, &operand) in data.operands.iter().enumerate() {
            if data.attrs.get(i).and_then(|a| a.as_from()) == Some(from) {
                return Some(operand);
            }
        }
        None
    }

    fn latch_step(ir: &Ir<MidOp>, phi: OpId, latch: BlockId) -> Option<i64> {
        let incoming = Self::phi_incoming(ir, phi, latch)?;
        let data = ir.op(incoming);
        if !matches!(data.kind, MidOp::AddI | MidOp::AddL) || data.operands.len() != 2 {
            return None;
        }
        let (a, b) = (data.operands[0], data.operands[1]);
        if a == phi {
            Self::const_int(ir, b)
        } else if b == phi {
            Self::const_int(ir, a)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy)]
struct ScevChain {
    stepped: OpId,
    invariant: OpId,
    kind: MidOp,
}

impl Pass for Scev {
    fn name(&self) -> &'static str {
        "scev"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("expanded".into(), self.expanded);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let loops = find_loops(&mut module.ir, region);
            for l in &loops {
                self.expand_loop(&mut module.ir, l);
            }
        }
    }
}

impl Scev {
    fn expand_loop(&mut self, ir: &mut Ir<MidOp>, l: &Loop) {
        let Some(pre) = preheader(ir, l) else { return };

        // `step[v]` is v's per-iteration increment; `base[v]` is the op (always defined
        // outside the loop) representing v's value on entry.
        let mut step: HashMap<OpId, i64> = HashMap::new();
        let mut base: HashMap<OpId, OpId> = HashMap::new();
        for phi in ir.phis(l.header) {
            let Some(s) = Self::latch_step(ir, phi, l.latch) else { continue };
            let Some(start) = Self::phi_incoming(ir, phi, pre) else { continue };
            step.insert(phi, s);
            base.insert(phi, start);
        }
        if step.is_empty() {
            return;
        }

        // A phi's own increment (e.g. the `addi` feeding its latch operand) would just
        // reproduce the same phi if expanded; exclude it from candidacy.
        let mut exclude: HashSet<OpId> = HashSet::new();
        for phi in ir.phis(l.header) {
            if let Some(v) = Self::phi_incoming(ir, phi, l.latch) {
                exclude.insert(v);
            }
        }

        let mut chains: HashMap<OpId, ScevChain> = HashMap::new();
        let mut order: Vec<OpId> = Vec::new();
        let mut changed = true;
        while changed {
            changed = false;
            for &b in &l.body {
                for op in ir.block_ops(b) {
                    let data = ir.op(op);
                    if data.erased || data.kind == MidOp::Phi || step.contains_key(&op) || data.operands.len() != 2 {
                        continue;
                    }
                    let (kind, x, y) = (data.kind, data.operands[0], data.operands[1]);
                    let found = match kind {
                        MidOp::AddI | MidOp::AddL | MidOp::SubI
                            if step.contains_key(&x) && !step.contains_key(&y) && !Self::defined_in_body(ir, &l.body, y) =>
                        {
                            Some((x, y, step[&x]))
                        }
                        MidOp::AddI | MidOp::AddL
                            if step.contains_key(&y) && !step.contains_key(&x) && !Self::defined_in_body(ir, &l.body, x) =>
                        {
                            Some((y, x, step[&y]))
                        }
                        MidOp::MulI if step.contains_key(&x) && !step.contains_key(&y) => {
                            Self::const_int(ir, y).map(|c| (x, y, step[&x] * c))
                        }
                        MidOp::MulI if step.contains_key(&y) && !step.contains_key(&x) => {
                            Self::const_int(ir, x).map(|c| (y, x, step[&y] * c))
                        }
                        _ => None,
                    };
                    if let Some((stepped, invariant, new_step)) = found {
                        step.insert(op, new_step);
                        chains.insert(op, ScevChain { stepped, invariant, kind });
                        order.push(op);
                        changed = true;
                    }
                }
            }
        }

        // Materialize each chain op's starting value in the preheader, in discovery order
        // (topological by construction: an op is only added to `order` once its `stepped`
        // predecessor already has an entry in `materialized`, a base phi or an earlier chain).
        let mut materialized: HashMap<OpId, OpId> = base;
        let Some(pre_term) = ir.terminator(pre) else { return };
        for &op in &order {
            let chain = chains[&op];
            let Some(&start) = materialized.get(&chain.stepped) else { continue };
            let ty = ir.op(op).result_ty;
            let mut builder = sysc_ir::Builder::new();
            builder.set_before_op(ir, pre_term);
            let new_op = builder.create(ir, chain.kind, &[start, chain.invariant], vec![], ty);
            materialized.insert(op, new_op);
        }

        // Only `addl` candidates (widened address arithmetic, the original's `isa<AddLOp>`
        // filter) get turned into a new header phi; everything else in `order` exists purely
        // as scaffolding feeding such a candidate's starting value.
        for &op in &order {
            if exclude.contains(&op) || ir.op(op).kind != MidOp::AddL {
                continue;
            }
            let Some(&start) = materialized.get(&op) else { continue };
            let step_amt = step[&op];
            let ty = ir.op(op).result_ty;

            let mut phi_builder = sysc_ir::Builder::new();
            phi_builder.set_to_block_start(ir, l.header);
            let phi = phi_builder.create(ir, MidOp::Phi, &[start], vec![Attr::From(pre)], ty);

            let mut step_builder = sysc_ir::Builder::new();
            step_builder.set_before_op(ir, op);
            let step_val = step_builder.create(ir, MidOp::Int, &[], vec![Attr::Int(step_amt)], ty);
            let next = step_builder.create(ir, MidOp::AddL, &[phi, step_val], vec![], ty);
            ir.add_operand(phi, next);
            ir.op_mut(phi).attrs.push(Attr::From(l.latch));

            ir.replace_all_uses_with(op, phi);
            ir.erase(op);
            self.expanded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, MidModule, Ty};

    #[test]
    fn a_zero_trip_loop_is_bypassed() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);
        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("f".into())], Ty::I32);
        let region = ir.append_region_to(func_op);

        let pre = ir.append_block(region);
        let header = ir.append_block(region);
        let body = ir.append_block(region);
        let exit = ir.append_block(region);

        builder.set_to_block_start(&ir, pre);
        builder.create(&mut ir, MidOp::Goto, &[], vec![Attr::Target(header)], Ty::Void);

        builder.set_to_block_start(&ir, header);
        let one = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let zero = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(0)], Ty::I32);
        let cond = builder.create(&mut ir, MidOp::Lt, &[one, zero], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Branch, &[cond], vec![Attr::Target(body), Attr::Else(exit)], Ty::Void);

        builder.set_to_block_start(&ir, body);
        builder.create(&mut ir, MidOp::Goto, &[], vec![Attr::Target(header)], Ty::Void);

        builder.set_to_block_start(&ir, exit);
        builder.create(&mut ir, MidOp::Return, &[], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        ConstLoopUnroll::new().run(&mut module);

        let pre_term = module.ir.terminator(pre).unwrap();
        let target = module.ir.op(pre_term).attrs.iter().find_map(|a| a.as_target());
        assert_eq!(target, Some(exit));
    }

    /// `for (i = 0; i < n; i++) { ...base + i*4... }` — the address chain `base + i*4` should
    /// get its own header phi, stepped by the induction variable's step times the multiplier,
    /// instead of recomputing the multiply every iteration.
    #[test]
    fn expands_an_address_chain_built_on_an_induction_variable() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);
        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("f".into())], Ty::I32);
        let region = ir.append_region_to(func_op);

        let pre = ir.append_block(region);
        let header = ir.append_block(region);
        let body = ir.append_block(region);
        let exit = ir.append_block(region);

        builder.set_to_block_start(&ir, pre);
        let base = builder.create(&mut ir, MidOp::GetArg, &[], vec![Attr::Int(0)], Ty::I64);
        let zero = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(0)], Ty::I32);
        let limit = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(10)], Ty::I32);
        builder.create(&mut ir, MidOp::Goto, &[], vec![Attr::Target(header)], Ty::Void);

        builder.set_to_block_start(&ir, header);
        let phi_i =
            builder.create(&mut ir, MidOp::Phi, &[zero], vec![Attr::From(pre)], Ty::I32);
        let cond = builder.create(&mut ir, MidOp::Lt, &[phi_i, limit], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Branch, &[cond], vec![Attr::Target(body), Attr::Else(exit)], Ty::Void);

        builder.set_to_block_start(&ir, body);
        let four = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(4)], Ty::I32);
        let mul = builder.create(&mut ir, MidOp::MulI, &[phi_i, four], vec![], Ty::I32);
        let addr = builder.create(&mut ir, MidOp::AddL, &[base, mul], vec![], Ty::I64);
        builder.create(&mut ir, MidOp::Load, &[addr], vec![], Ty::I32);
        let one = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let i_next = builder.create(&mut ir, MidOp::AddI, &[phi_i, one], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Goto, &[], vec![Attr::Target(header)], Ty::Void);

        ir.add_operand(phi_i, i_next);
        ir.op_mut(phi_i).attrs.push(Attr::From(body));

        builder.set_to_block_start(&ir, exit);
        builder.create(&mut ir, MidOp::Return, &[], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        let mut scev = Scev::new();
        scev.run(&mut module);

        assert_eq!(scev.stats().get("expanded"), Some(&1));
        let phis = module.ir.phis(header);
        assert_eq!(phis.len(), 2);
        let addr_phi = phis.into_iter().find(|&p| p != phi_i).expect("a new phi was added");

        let start = module
            .ir
            .op(addr_phi)
            .attrs
            .iter()
            .enumerate()
            .find_map(|(i, a)| (a.as_from() == Some(pre)).then(|| module.ir.op(addr_phi).operands[i]))
            .expect("preheader edge");
        assert_eq!(module.ir.op(start).kind, MidOp::AddL);
        assert!(module.ir.op(start).operands.contains(&base));

        // `addr`'s uses were all rewritten to the new phi and it was erased.
        assert!(module.ir.op(addr).erased);
    }
}
