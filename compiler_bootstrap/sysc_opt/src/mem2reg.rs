//! Mem2Reg (spec §4.4): promotes allocas whose only uses are loads/stores into SSA values,
//! inserting φ-nodes at the iterated dominance frontier of their defining blocks.

use crate::pass::Pass;
use hashbrown::{HashMap, HashSet};
use sysc_ir::{Attr, BlockId, Builder, MidModule, MidOp, OpId, RegionId, Ty};

#[derive(Default)]
pub struct Mem2Reg {
    promoted: i64,
    phis_inserted: i64,
}

impl Mem2Reg {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_promotable(ir: &sysc_ir::Ir<MidOp>, alloca: OpId) -> bool {
        ir.op(alloca).uses.iter().all(|&user| {
            let data = ir.op(user);
            match data.kind {
                MidOp::Load => data.operands.first() == Some(&alloca),
                MidOp::Store => data.operands.get(1) == Some(&alloca),
                _ => false,
            }
        })
    }

    /// The value type carried through the alloca, inferred from any load/store touching it
    /// (falls back to `I32` for a written-but-never-read slot).
    fn value_ty(ir: &sysc_ir::Ir<MidOp>, alloca: OpId) -> Ty {
        for &user in &ir.op(alloca).uses {
            let data = ir.op(user);
            match data.kind {
                MidOp::Load => return data.result_ty,
                MidOp::Store => return ir.op(data.operands[0]).result_ty,
                _ => {}
            }
        }
        Ty::I32
    }

    fn def_blocks(ir: &sysc_ir::Ir<MidOp>, alloca: OpId) -> HashSet<BlockId> {
        ir.op(alloca)
            .uses
            .iter()
            .filter(|&&u| ir.op(u).kind == MidOp::Store)
            .map(|&u| ir.op(u).parent.expect("store must be attached"))
            .collect()
    }

    /// Standard iterated-dominance-frontier worklist: blocks needing a φ for this alloca.
    fn iterated_df(ir: &sysc_ir::Ir<MidOp>, def_blocks: &HashSet<BlockId>) -> HashSet<BlockId> {
        let mut result = HashSet::new();
        let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
        while let Some(b) = worklist.pop() {
            for &f in &ir.block(b).dom_frontier {
                if result.insert(f) {
                    worklist.push(f);
                }
            }
        }
        result
    }

    fn dom_children(ir: &sysc_ir::Ir<MidOp>, region: RegionId) -> HashMap<BlockId, Vec<BlockId>> {
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in &ir.region(region).blocks {
            if let Some(idom) = ir.block(b).idom {
                children.entry(idom).or_default().push(b);
            }
        }
        children
    }
}

impl Pass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("promoted".into(), self.promoted);
        m.insert("phis_inserted".into(), self.phis_inserted);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            module.ir.update_doms(region);

            let blocks = module.ir.region(region).blocks.clone();
            let allocas: Vec<OpId> = blocks
                .iter()
                .flat_map(|&b| module.ir.block_ops(b))
                .filter(|&op| module.ir.op(op).kind == MidOp::Alloca)
                .filter(|&op| Self::is_promotable(&module.ir, op))
                .collect();
            if allocas.is_empty() {
                continue;
            }

            let mut undef_cache: HashMap<Ty, OpId> = HashMap::new();
            let mut builder = Builder::new();
            let entry = blocks[0];

            // phis[block][alloca] = phi op, preallocated with one Undef operand per pred slot.
            let mut phis: HashMap<(BlockId, OpId), OpId> = HashMap::new();
            for &alloca in &allocas {
                let defs = Self::def_blocks(&module.ir, alloca);
                let df = Self::iterated_df(&module.ir, &defs);
                let value_ty = Self::value_ty(&module.ir, alloca);
                let undef = if let Some(&id) = undef_cache.get(&value_ty) {
                    id
                } else {
                    builder.set_to_block_start(&module.ir, entry);
                    let id = builder.create(&mut module.ir, MidOp::Undef, &[], vec![], value_ty);
                    undef_cache.insert(value_ty, id);
                    id
                };
                for block in df {
                    let preds = module.ir.block(block).preds.clone();
                    builder.set_to_block_start(&module.ir, block);
                    let operands = vec![undef; preds.len()];
                    let attrs = preds.iter().map(|&p| Attr::From(p)).collect();
                    let phi = builder.create(&mut module.ir, MidOp::Phi, &operands, attrs, value_ty);
                    phis.insert((block, alloca), phi);
                    self.phis_inserted += 1;
                }
            }

            let children = Self::dom_children(&module.ir, region);
            let mut current: HashMap<OpId, OpId> = HashMap::new();
            for &alloca in &allocas {
                let value_ty = Self::value_ty(&module.ir, alloca);
                current.insert(alloca, undef_cache[&value_ty]);
            }

            self.rename_walk(&mut module.ir, entry, &children, &phis, &mut current.clone());

            for &alloca in &allocas {
                if module.ir.op(alloca).uses.is_empty() {
                    module.ir.erase(alloca);
                }
                self.promoted += 1;
            }
        }
    }
}

impl Mem2Reg {
    #[allow(clippy::too_many_arguments)]
    fn rename_walk(
        &mut self,
        ir: &mut sysc_ir::Ir<MidOp>,
        block: BlockId,
        children: &HashMap<BlockId, Vec<BlockId>>,
        phis: &HashMap<(BlockId, OpId), OpId>,
        current: &mut HashMap<OpId, OpId>,
    ) {
        // A block's own φs (for whichever allocas got one here) become the current value.
        for (&(b, alloca), &phi) in phis {
            if b == block {
                current.insert(alloca, phi);
            }
        }

        for op in ir.block_ops(block) {
            let data_kind = ir.op(op).kind;
            match data_kind {
                MidOp::Load => {
                    let alloca = ir.op(op).operands[0];
                    if let Some(&value) = current.get(&alloca) {
                        ir.replace_all_uses_with(op, value);
                        ir.erase(op);
                    }
                }
                MidOp::Store => {
                    let value = ir.op(op).operands[0];
                    let alloca = ir.op(op).operands[1];
                    if current.contains_key(&alloca) {
                        current.insert(alloca, value);
                        ir.erase(op);
                    }
                }
                _ => {}
            }
        }

        for &succ in &ir.block(block).succs.clone() {
            let preds = ir.block(succ).preds.clone();
            let Some(slot) = preds.iter().position(|&p| p == block) else { continue };
            for (&(b, alloca), &phi) in phis {
                if b == succ {
                    if let Some(&value) = current.get(&alloca) {
                        ir.set_operand(phi, slot, value);
                    }
                }
            }
        }

        if let Some(kids) = children.get(&block) {
            for &kid in kids {
                self.rename_walk(ir, kid, children, phis, &mut current.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ast as ast;
    use sysc_common::Span;
    use sysc_ir::CodeGen;

    #[test]
    fn promotes_a_loop_accumulator_to_a_phi() {
        let sp = || Span::dummy();
        let module = ast::Module {
            functions: vec![ast::FnDecl {
                name: "f".into(),
                params: vec![ast::Param { name: "n".into(), ty: ast::Type::Int }],
                ret: ast::Type::Int,
                body: ast::Node::Block {
                    span: sp(),
                    nodes: vec![
                        ast::Node::VarDecl {
                            name: "s".into(),
                            init: Box::new(ast::Node::Int { value: 0, span: sp() }),
                            mutable: true,
                            span: sp(),
                        },
                        ast::Node::While {
                            cond: Box::new(ast::Node::Binary {
                                op: ast::BinaryOp::Lt,
                                lhs: Box::new(ast::Node::VarRef { name: "s".into(), span: sp() }),
                                rhs: Box::new(ast::Node::VarRef { name: "n".into(), span: sp() }),
                                span: sp(),
                            }),
                            body: Box::new(ast::Node::Block {
                                span: sp(),
                                nodes: vec![ast::Node::Assign {
                                    name: "s".into(),
                                    value: Box::new(ast::Node::Binary {
                                        op: ast::BinaryOp::Add,
                                        lhs: Box::new(ast::Node::VarRef { name: "s".into(), span: sp() }),
                                        rhs: Box::new(ast::Node::Int { value: 1, span: sp() }),
                                        span: sp(),
                                    }),
                                    span: sp(),
                                }],
                            }),
                            span: sp(),
                        },
                        ast::Node::Return { value: Some(Box::new(ast::Node::VarRef { name: "s".into(), span: sp() })), span: sp() },
                    ],
                },
                span: sp(),
            }],
        };
        let mut mid = CodeGen::lower(&module).unwrap();
        crate::flatten_cfg::FlattenCfg::new().run(&mut mid);
        Mem2Reg::new().run(&mut mid);

        let func = mid.funcs()[0];
        let region = mid.ir.op(func).regions[0];
        let has_phi = mid
            .ir
            .region(region)
            .blocks
            .iter()
            .any(|&b| mid.ir.phis(b).iter().any(|&p| !mid.ir.op(p).erased));
        assert!(has_phi, "loop accumulator should have gained a phi at the loop header");
    }
}
