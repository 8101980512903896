//! Alias analysis (spec §4.7): tags every address-typed op with `Attr::Alias`, tracing base +
//! offset through constant pointer arithmetic so `Dle`/`Dse` can ask `mustAlias`/`mayAlias`.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{AliasBase, AliasInfo, Attr, MidModule, MidOp, OpId};
use std::collections::BTreeSet;

#[derive(Default)]
pub struct Alias {
    tagged: i64,
}

impl Alias {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `op`'s `AliasInfo`, consulting (and populating) `cache` for operands visited
    /// earlier in the same forward scan.
    fn resolve(ir: &sysc_ir::Ir<MidOp>, op: OpId, cache: &mut HashMap<OpId, AliasInfo>) -> AliasInfo {
        if let Some(info) = cache.get(&op) {
            return info.clone();
        }
        let data = ir.op(op);
        let info = match data.kind {
            MidOp::Alloca | MidOp::GetGlobal => {
                let mut offsets = BTreeSet::new();
                offsets.insert(0);
                AliasInfo { base: AliasBase::Op(op.0), offsets: Some(offsets) }
            }
            MidOp::AddL | MidOp::AddI => {
                let lhs = data.operands[0];
                let rhs = data.operands[1];
                let lhs_info = Self::resolve(ir, lhs, cache);
                let rhs_const = (ir.op(rhs).kind == MidOp::Int)
                    .then(|| ir.op(rhs).attrs.iter().find_map(|a| a.as_int()))
                    .flatten();
                match (lhs_info.offsets.clone(), rhs_const) {
                    (Some(offs), Some(delta)) if lhs_info.base != AliasBase::Unknown => {
                        let shifted = offs.iter().map(|&o| o + delta).collect();
                        AliasInfo { base: lhs_info.base, offsets: Some(shifted) }
                    }
                    _ => AliasInfo::unknown(),
                }
            }
            _ => AliasInfo::unknown(),
        };
        cache.insert(op, info.clone());
        info
    }
}

impl Pass for Alias {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("tagged".into(), self.tagged);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let mut cache: HashMap<OpId, AliasInfo> = HashMap::new();
            for &b in &module.ir.region(region).blocks.clone() {
                for op in module.ir.block_ops(b) {
                    let kind = module.ir.op(op).kind;
                    let addr = match kind {
                        MidOp::Alloca | MidOp::GetGlobal | MidOp::AddL | MidOp::AddI => Some(op),
                        MidOp::Load => Some(module.ir.op(op).operands[0]),
                        MidOp::Store => Some(module.ir.op(op).operands[1]),
                        _ => None,
                    };
                    let Some(addr) = addr else { continue };
                    let info = Self::resolve(&module.ir, addr, &mut cache);
                    module.ir.op_mut(op).attrs.retain(|a| !matches!(a, Attr::Alias(_)));
                    module.ir.op_mut(op).attrs.push(Attr::Alias(info));
                    self.tagged += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, Ty};

    #[test]
    fn two_loads_of_the_same_alloca_must_alias() {
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
        let alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![], Ty::I64);
        let load1 = builder.create(&mut ir, MidOp::Load, &[alloca], vec![], Ty::I32);
        let load2 = builder.create(&mut ir, MidOp::Load, &[alloca], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[load1, load2], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Alias::new().run(&mut module);

        let info_of = |op: OpId, m: &MidModule| -> AliasInfo {
            m.ir.op(op).attrs.iter().find_map(|a| match a {
                Attr::Alias(info) => Some(info.clone()),
                _ => None,
            }).unwrap()
        };
        let a = info_of(load1, &module);
        let b = info_of(load2, &module);
        assert!(a.must_alias(&b));
    }
}
