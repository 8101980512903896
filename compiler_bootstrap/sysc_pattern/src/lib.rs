//! The s-expression pattern-matching DSL shared by mid-level peephole folds and target
//! instruction selection (spec §4.2), grounded on `original_source/src/utils/Matcher.h`/`.cpp`.

pub mod expr;
pub mod pattern_ops;
pub mod rule;

pub use expr::{parse, tokenize, Expr};
pub use pattern_ops::{Canon, PatternOps};
pub use rule::{Binding, Rule};

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, MidOp, Ty};

    #[test]
    fn matches_commutative_add_with_int_constant() {
        let mut ir: Ir<MidOp> = Ir::new();
        let region = ir.new_region(None);
        let block = ir.append_block(region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, block);
        let zero = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(0)], Ty::I64);
        let x = builder.create(&mut ir, MidOp::GetArg, &[], vec![sysc_ir::Attr::ArgCount(0)], Ty::I64);
        let add = builder.create(&mut ir, MidOp::AddI, &[x, zero], vec![], Ty::I64);

        let mut rule = Rule::pattern("(add x '0)");
        assert!(rule.match_op(&ir, add, &[]));
        assert_eq!(rule.extract_op("x"), x);
        assert_eq!(rule.extract_int("0"), 0);
    }

    #[test]
    fn rewrite_folds_add_zero_to_identity() {
        let mut ir: Ir<MidOp> = Ir::new();
        let region = ir.new_region(None);
        let block = ir.append_block(region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, block);
        let zero = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(0)], Ty::I64);
        let x = builder.create(&mut ir, MidOp::GetArg, &[], vec![sysc_ir::Attr::ArgCount(0)], Ty::I64);
        let add = builder.create(&mut ir, MidOp::AddI, &[x, zero], vec![], Ty::I64);
        let user = builder.create(&mut ir, MidOp::Return, &[add], vec![], Ty::Void);

        let mut rule = Rule::rewrite_rule("(change (add x '0) x)");
        assert!(rule.rewrite(&mut ir, &mut builder, add));
        assert_eq!(ir.op(user).operands[0], x);
        assert!(ir.op(add).erased);
    }

    #[test]
    fn strength_reduce_constant_fold_via_bang_functions() {
        let mut ir: Ir<MidOp> = Ir::new();
        let region = ir.new_region(None);
        let block = ir.append_block(region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, block);
        let a = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(3)], Ty::I64);
        let b = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(4)], Ty::I64);
        let add = builder.create(&mut ir, MidOp::AddI, &[a, b], vec![], Ty::I64);
        let user = builder.create(&mut ir, MidOp::Return, &[add], vec![], Ty::Void);

        let mut rule = Rule::rewrite_rule("(change (add 'a 'b) (!add a b))");
        assert!(rule.rewrite(&mut ir, &mut builder, add));
        let folded = ir.op(user).operands[0];
        assert_eq!(ir.op(folded).kind, MidOp::Int);
        assert_eq!(ir.op(folded).attrs[0].as_int(), Some(7));
    }

    #[test]
    fn non_matching_pattern_leaves_ir_untouched() {
        let mut ir: Ir<MidOp> = Ir::new();
        let region = ir.new_region(None);
        let block = ir.append_block(region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, block);
        let a = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(1)], Ty::I64);
        let b = builder.create(&mut ir, MidOp::Int, &[], vec![sysc_ir::Attr::Int(2)], Ty::I64);
        let sub = builder.create(&mut ir, MidOp::SubI, &[a, b], vec![], Ty::I64);

        let mut rule = Rule::rewrite_rule("(change (add x '0) x)");
        assert!(!rule.rewrite(&mut ir, &mut builder, sub));
        assert!(!ir.op(sub).erased);
    }
}
