//! StrengthReduce (spec §4.7, grounded on `original_source/src/opt/StrengthReduct.cpp`):
//! constant-folds integer `mul`/`div`/`mod`, rewrites multiplies by a ≤2-bit constant into
//! shifts, and divides/mods by a non-power-of-2 constant via Granlund–Montgomery's
//! magic-number method.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{Attr, Builder, MidModule, MidOp, OpId, Ty};

#[derive(Default)]
pub struct StrengthReduce {
    converted: i64,
}

impl StrengthReduce {
    pub fn new() -> Self {
        Self::default()
    }

    fn int_const(ir: &sysc_ir::Ir<MidOp>, op: OpId) -> Option<i64> {
        let data = ir.op(op);
        (data.kind == MidOp::Int).then(|| data.attrs.iter().find_map(|a| a.as_int())).flatten()
    }

    /// Granlund–Montgomery magic-number choice for signed division by `d` (Figure 6.2,
    /// https://gmplib.org/~tege/divcnst-pldi94.pdf). Returns `(shift_post, magic, l)`.
    fn choose_multiplier(d: i64) -> (u32, u64, u32) {
        const N: u32 = 32;
        const PREC: u32 = N - 1;
        let l = (d as f64).log2().ceil() as u32;
        let mut sh_post = l;
        let mut m_low = (1u64 << (N + l)) / d as u64;
        let mut m_high = ((1u64 << (N + l)) + (1u64 << (N + l - PREC))) / d as u64;
        while m_low / 2 < m_high / 2 && sh_post > 0 {
            m_low /= 2;
            m_high /= 2;
            sh_post -= 1;
        }
        (sh_post, m_high, l)
    }

    /// Attempts one rewrite of `op`; returns whether it mutated the IR. `op` may be erased and
    /// replaced, so the caller must re-fetch its block's op list afterward.
    fn try_rewrite(&mut self, ir: &mut sysc_ir::Ir<MidOp>, builder: &mut Builder, op: OpId) -> bool {
        match ir.op(op).kind {
            MidOp::MulI => self.rewrite_mul(ir, builder, op),
            MidOp::DivI => self.rewrite_div(ir, builder, op),
            MidOp::ModI => self.rewrite_mod(ir, builder, op),
            _ => false,
        }
    }

    fn rewrite_mul(&mut self, ir: &mut sysc_ir::Ir<MidOp>, builder: &mut Builder, op: OpId) -> bool {
        let x = ir.op(op).operands[0];
        let y = ir.op(op).operands[1];
        let result_ty = ir.op(op).result_ty;
        let (cx, cy) = (Self::int_const(ir, x), Self::int_const(ir, y));

        if let (Some(vx), Some(vy)) = (cx, cy) {
            self.converted += 1;
            builder.set_before_op(ir, op);
            let folded = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(vx.wrapping_mul(vy))], Ty::I32);
            ir.replace_all_uses_with(op, folded);
            ir.erase(op);
            return true;
        }
        // Canonicalize: constant on the right.
        if cx.is_some() && cy.is_none() {
            self.converted += 1;
            builder.set_before_op(ir, op);
            let swapped = builder.create(ir, MidOp::MulI, &[y, x], vec![], result_ty);
            ir.replace_all_uses_with(op, swapped);
            ir.erase(op);
            return true;
        }
        let Some(i) = cy else { return false };
        if i < 0 {
            return false;
        }
        if i == 1 {
            self.converted += 1;
            ir.replace_all_uses_with(op, x);
            ir.erase(op);
            return true;
        }

        let bits = (i as u64).count_ones();
        builder.set_before_op(ir, op);
        if bits == 1 {
            self.converted += 1;
            let place = (i as u64).trailing_zeros() as i64;
            let amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(place)], Ty::I32);
            let shifted = builder.create(ir, MidOp::LShift, &[x, amt], vec![], result_ty);
            ir.replace_all_uses_with(op, shifted);
            ir.erase(op);
            return true;
        }
        if bits == 2 {
            self.converted += 1;
            let first_place = (i as u64).trailing_zeros() as i64;
            let lower_bits = if first_place == 0 {
                x
            } else {
                let amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(first_place)], Ty::I32);
                builder.create(ir, MidOp::LShift, &[x, amt], vec![], result_ty)
            };
            let upper_shift = (i - (1 << first_place)).trailing_zeros() as i64;
            let amt2 = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(upper_shift)], Ty::I32);
            let upper_bits = builder.create(ir, MidOp::LShift, &[x, amt2], vec![], result_ty);
            let sum = builder.create(ir, MidOp::AddI, &[lower_bits, upper_bits], vec![], result_ty);
            ir.replace_all_uses_with(op, sum);
            ir.erase(op);
            return true;
        }
        for place in 0..31i64 {
            if ((i + (1 << place)) as u64).count_ones() == 1 {
                self.converted += 1;
                let lower_bits = if place == 0 {
                    x
                } else {
                    let amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(place)], Ty::I32);
                    builder.create(ir, MidOp::LShift, &[x, amt], vec![], result_ty)
                };
                let upper_shift = ((i + (1 << place)) as u64).trailing_zeros() as i64;
                let amt2 = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(upper_shift)], Ty::I32);
                let upper_bits = builder.create(ir, MidOp::LShift, &[x, amt2], vec![], result_ty);
                let diff = builder.create(ir, MidOp::SubI, &[upper_bits, lower_bits], vec![], result_ty);
                ir.replace_all_uses_with(op, diff);
                ir.erase(op);
                return true;
            }
        }
        false
    }

    fn rewrite_div(&mut self, ir: &mut sysc_ir::Ir<MidOp>, builder: &mut Builder, op: OpId) -> bool {
        let x = ir.op(op).operands[0];
        let y = ir.op(op).operands[1];
        let (cx, cy) = (Self::int_const(ir, x), Self::int_const(ir, y));

        if let (Some(vx), Some(vy)) = (cx, cy) {
            if vy == 0 {
                return false;
            }
            self.converted += 1;
            builder.set_before_op(ir, op);
            let folded = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(vx / vy)], Ty::I32);
            ir.replace_all_uses_with(op, folded);
            ir.erase(op);
            return true;
        }
        let Some(i) = cy else { return false };
        if i == 1 {
            self.converted += 1;
            ir.replace_all_uses_with(op, x);
            ir.erase(op);
            return true;
        }
        if i < 0 {
            return false;
        }
        let bits = (i as u64).count_ones();
        let result_ty = ir.op(op).result_ty;
        builder.set_before_op(ir, op);
        if bits == 1 {
            self.converted += 1;
            let place = (i as u64).trailing_zeros() as i64;
            let amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(place)], Ty::I32);
            let shifted = builder.create(ir, MidOp::RShift, &[x, amt], vec![], result_ty);
            ir.replace_all_uses_with(op, shifted);
            ir.erase(op);
            return true;
        }

        self.converted += 1;
        let (sh_post, m, _l) = Self::choose_multiplier(i);
        let n = x;
        let thirty_one = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(31)], Ty::I32);
        let xsign = builder.create(ir, MidOp::RShift, &[n, thirty_one], vec![], Ty::I32);
        let result = if m < (1u64 << 31) {
            let m_val = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(m as i64)], Ty::I32);
            let mulsh = builder.create(ir, MidOp::Mulsh, &[m_val, n], vec![], Ty::I32);
            let sh_amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(sh_post as i64)], Ty::I32);
            let sra = builder.create(ir, MidOp::RShift, &[mulsh, sh_amt], vec![], Ty::I32);
            builder.create(ir, MidOp::SubI, &[sra, xsign], vec![], Ty::I32)
        } else {
            let m_val = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(m as i64 - (1i64 << 32))], Ty::I32);
            let mulsh = builder.create(ir, MidOp::Mulsh, &[m_val, n], vec![], Ty::I32);
            let added = builder.create(ir, MidOp::AddI, &[mulsh, n], vec![], Ty::I32);
            let sra = if sh_post > 0 {
                let sh_amt = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(sh_post as i64)], Ty::I32);
                builder.create(ir, MidOp::RShift, &[added, sh_amt], vec![], Ty::I32)
            } else {
                added
            };
            builder.create(ir, MidOp::SubI, &[sra, xsign], vec![], Ty::I32)
        };
        ir.replace_all_uses_with(op, result);
        ir.erase(op);
        true
    }

    fn rewrite_mod(&mut self, ir: &mut sysc_ir::Ir<MidOp>, builder: &mut Builder, op: OpId) -> bool {
        let x = ir.op(op).operands[0];
        let y = ir.op(op).operands[1];
        let result_ty = ir.op(op).result_ty;
        let (cx, cy) = (Self::int_const(ir, x), Self::int_const(ir, y));

        if let (Some(vx), Some(vy)) = (cx, cy) {
            if vy == 0 {
                return false;
            }
            self.converted += 1;
            builder.set_before_op(ir, op);
            let folded = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(vx % vy)], Ty::I32);
            ir.replace_all_uses_with(op, folded);
            ir.erase(op);
            return true;
        }
        let Some(i) = cy else { return false };
        if i < 0 {
            return false;
        }
        builder.set_before_op(ir, op);
        if (i as u64).count_ones() == 1 {
            self.converted += 1;
            let mask = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(i - 1)], Ty::I32);
            let anded = builder.create(ir, MidOp::AndI, &[x, mask], vec![], result_ty);
            ir.replace_all_uses_with(op, anded);
            ir.erase(op);
            return true;
        }

        self.converted += 1;
        let quot = builder.create(ir, MidOp::DivI, &[x, y], vec![], result_ty);
        let mul = builder.create(ir, MidOp::MulI, &[quot, y], vec![], result_ty);
        let sub = builder.create(ir, MidOp::SubI, &[x, mul], vec![], result_ty);
        ir.replace_all_uses_with(op, sub);
        ir.erase(op);
        true
    }
}

impl Pass for StrengthReduce {
    fn name(&self) -> &'static str {
        "strength-reduce"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("converted".into(), self.converted);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        let mut builder = Builder::new();
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            let mut changed = true;
            while changed {
                changed = false;
                let blocks = module.ir.region(region).blocks.clone();
                for &b in &blocks {
                    let ops = module.ir.block_ops(b);
                    for op in ops {
                        if module.ir.op(op).erased {
                            continue;
                        }
                        if self.try_rewrite(&mut module.ir, &mut builder, op) {
                            changed = true;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Ir, Ty};

    fn make_binop(ir: &mut Ir<MidOp>, builder: &mut Builder, kind: MidOp, lhs: i64, rhs: i64) -> (OpId, OpId) {
        let a = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(lhs)], Ty::I32);
        let b = builder.create(ir, MidOp::Int, &[], vec![Attr::Int(rhs)], Ty::I32);
        let op = builder.create(ir, kind, &[a, b], vec![], Ty::I32);
        (op, a)
    }

    #[test]
    fn folds_constant_multiplication() {
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
        let (mul, _) = make_binop(&mut ir, &mut builder, MidOp::MulI, 6, 7);
        builder.create(&mut ir, MidOp::Return, &[mul], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        StrengthReduce::new().run(&mut module);

        let ret = module.ir.block_ops(entry).into_iter().last().unwrap();
        let folded = module.ir.op(ret).operands[0];
        assert_eq!(module.ir.op(folded).kind, MidOp::Int);
        assert_eq!(module.ir.op(folded).attrs.iter().find_map(|a| a.as_int()), Some(42));
    }

    #[test]
    fn rewrites_division_by_power_of_two_as_a_shift() {
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
        let arg = builder.create(&mut ir, MidOp::GetArg, &[], vec![Attr::Int(0)], Ty::I32);
        let eight = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(8)], Ty::I32);
        let div = builder.create(&mut ir, MidOp::DivI, &[arg, eight], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[div], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        StrengthReduce::new().run(&mut module);

        let ret = module.ir.block_ops(entry).into_iter().last().unwrap();
        let result = module.ir.op(ret).operands[0];
        assert_eq!(module.ir.op(result).kind, MidOp::RShift);
    }
}
