//! Dominator-based global value numbering (spec §4.5): a pre-order walk over the dominator
//! tree with a scoped table keyed on `(opcode, operands, int/float/name attr)`.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{Attr, BlockId, MidModule, MidOp, OpId};

#[derive(Default)]
pub struct Gvn {
    deduped: i64,
    phis_collapsed: i64,
}

impl Gvn {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_pure_call(ir: &sysc_ir::Ir<MidOp>, op: OpId) -> bool {
        ir.op(op).kind == MidOp::Call && !ir.op(op).has_attr(|a| matches!(a, Attr::Impure))
    }

    fn eligible(ir: &sysc_ir::Ir<MidOp>, op: OpId) -> bool {
        let kind = ir.op(op).kind;
        kind.is_pure_arithmetic() || kind == MidOp::Load || Self::is_pure_call(ir, op)
    }

    fn key(ir: &sysc_ir::Ir<MidOp>, op: OpId) -> Key {
        let data = ir.op(op);
        let mut operands: Vec<OpId> = data.operands.iter().copied().collect();
        if data.kind.is_commutative() {
            operands.sort();
        }
        let int_attr = data.attrs.iter().find_map(|a| a.as_int());
        let float_attr = data.attrs.iter().find_map(|a| a.as_float()).map(|f| f.to_bits());
        let name_attr = data.attrs.iter().find_map(|a| a.as_name()).map(|s| s.to_string());
        Key { kind: data.kind, operands, int_attr, float_attr, name_attr }
    }

    fn dom_children(ir: &sysc_ir::Ir<MidOp>, blocks: &[BlockId]) -> HashMap<BlockId, Vec<BlockId>> {
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in blocks {
            if let Some(idom) = ir.block(b).idom {
                children.entry(idom).or_default().push(b);
            }
        }
        children
    }
}

#[derive(PartialEq, Eq, Hash)]
struct Key {
    kind: MidOp,
    operands: Vec<OpId>,
    int_attr: Option<i64>,
    float_attr: Option<u32>,
    name_attr: Option<String>,
}

impl Pass for Gvn {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("deduped".into(), self.deduped);
        m.insert("phis_collapsed".into(), self.phis_collapsed);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            module.ir.update_doms(region);
            let blocks = module.ir.region(region).blocks.clone();
            let Some(&entry) = blocks.first() else { continue };
            let children = Self::dom_children(&module.ir, &blocks);
            let mut table: HashMap<Key, OpId> = HashMap::new();
            self.walk(&mut module.ir, entry, &children, &mut table);
        }
    }
}

impl Gvn {
    fn walk(
        &mut self,
        ir: &mut sysc_ir::Ir<MidOp>,
        block: BlockId,
        children: &HashMap<BlockId, Vec<BlockId>>,
        table: &mut HashMap<Key, OpId>,
    ) {
        for op in ir.block_ops(block) {
            if ir.op(op).erased {
                continue;
            }
            if ir.op(op).kind == MidOp::Phi {
                let operands = ir.op(op).operands.clone();
                if let Some(&first) = operands.first() {
                    if operands.iter().all(|&o| o == first) && first != op {
                        ir.replace_all_uses_with(op, first);
                        ir.erase(op);
                        self.phis_collapsed += 1;
                    }
                }
                continue;
            }
            if !Self::eligible(ir, op) {
                continue;
            }
            let key = Self::key(ir, op);
            if let Some(&rep) = table.get(&key) {
                ir.replace_all_uses_with(op, rep);
                ir.erase(op);
                self.deduped += 1;
            } else {
                table.insert(key, op);
            }
        }

        if let Some(kids) = children.get(&block) {
            for &kid in kids {
                self.walk(ir, kid, children, &mut table.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, Ty};

    #[test]
    fn dedups_a_repeated_pure_add_dominated_by_the_first() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);

        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("f".into())], Ty::I32);
        let func_region = ir.append_region_to(func_op);
        let entry = ir.append_block(func_region);
        builder.set_to_block_start(&ir, entry);
        let a = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let b = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(2)], Ty::I32);
        let add1 = builder.create(&mut ir, MidOp::AddI, &[a, b], vec![], Ty::I32);
        let add2 = builder.create(&mut ir, MidOp::AddI, &[b, a], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[add2], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Gvn::new().run(&mut module);

        assert!(module.ir.op(add1).uses.len() >= 1, "first add stays live, now used by the return");
        assert!(module.ir.op(add2).erased, "commutative duplicate should be erased");
    }
}
