//! The matcher/evaluator/builder trio and `Rule::rewrite`, grounded on
//! `original_source/src/utils/Matcher.h`/`.cpp`.

use crate::expr::{parse, Expr};
use crate::pattern_ops::{Canon, PatternOps};
use hashbrown::HashMap;
use sysc_ir::{BlockId, Builder, Ir, OpId, Ty};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    Op(OpId),
    Int(i64),
    Block(BlockId),
}

/// A compiled pattern: either a bare match expression (used for analyses like induction
/// variable detection, which only call `match`/`extract`) or the full `(change MATCH
/// REWRITE)` shape used for rewrite rules.
pub struct Rule {
    text: String,
    match_expr: Expr,
    build_expr: Option<Expr>,
    bindings: HashMap<String, Binding>,
    failed: bool,
}

impl Rule {
    /// Parses a bare pattern, e.g. `"(add x 'a)"`.
    pub fn pattern(text: &str) -> Self {
        Rule { text: text.to_string(), match_expr: parse(text), build_expr: None, bindings: HashMap::new(), failed: false }
    }

    /// Parses a full rewrite rule of shape `(change MATCH REWRITE)`.
    pub fn rewrite_rule(text: &str) -> Self {
        let whole = parse(text);
        assert_eq!(whole.head(), Some("change"), "rewrite rule `{text}` must start with `change`");
        let args = whole.args();
        assert_eq!(args.len(), 2, "rewrite rule `{text}` must have exactly MATCH and REWRITE");
        Rule {
            text: text.to_string(),
            match_expr: args[0].clone(),
            build_expr: Some(args[1].clone()),
            bindings: HashMap::new(),
            failed: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Matches `op` against this rule's pattern, seeding `bindings` with any pre-bound
    /// variables (e.g. to require a specific op for `x` as `LoopAnalysis` does for `phi`).
    pub fn match_op<K: PatternOps>(&mut self, ir: &Ir<K>, op: OpId, seed: &[(&str, Binding)]) -> bool {
        self.bindings.clear();
        self.failed = false;
        for (name, binding) in seed {
            self.bindings.insert(name.to_string(), *binding);
        }
        match_expr(ir, &self.match_expr, op, &mut self.bindings)
    }

    pub fn extract(&self, name: &str) -> Binding {
        *self.bindings.get(name).unwrap_or_else(|| panic!("pattern variable `{name}` was not bound"))
    }

    pub fn extract_int(&self, name: &str) -> i64 {
        match self.extract(name) {
            Binding::Int(v) => v,
            _ => panic!("pattern variable `{name}` is not an integer"),
        }
    }

    pub fn extract_op(&self, name: &str) -> OpId {
        match self.extract(name) {
            Binding::Op(v) => v,
            _ => panic!("pattern variable `{name}` is not an op"),
        }
    }

    /// Attempts the full match-build-replace-erase rewrite at `op`. Returns `false` and
    /// mutates nothing on failure.
    pub fn rewrite<K: PatternOps>(&mut self, ir: &mut Ir<K>, builder: &mut Builder, op: OpId) -> bool {
        let build_expr = self.build_expr.clone().expect("rewrite() called on a bare-pattern Rule");
        self.bindings.clear();
        self.failed = false;
        if !match_expr(ir, &self.match_expr, op, &mut self.bindings) {
            return false;
        }
        builder.set_before_op(ir, op);
        let result_ty = ir.op(op).result_ty;
        let new_op = build_expr_into(ir, builder, &build_expr, &self.bindings, &mut self.failed, result_ty);
        if self.failed {
            return false;
        }
        ir.replace_all_uses_with(op, new_op);
        ir.erase(op);
        true
    }
}

fn is_var_prefixed(atom: &str, prefix: char) -> bool {
    atom.starts_with(prefix) && atom.len() > 1
}

fn is_int_literal(atom: &str) -> bool {
    atom.parse::<i64>().is_ok()
}

/// Structural match of `pattern` at `op`, recording/consulting `bindings`.
fn match_expr<K: PatternOps>(ir: &Ir<K>, pattern: &Expr, op: OpId, bindings: &mut HashMap<String, Binding>) -> bool {
    match pattern {
        Expr::Atom(atom) => match_atom(ir, atom, op, bindings),
        Expr::List(items) => match_list(ir, items, op, bindings),
    }
}

fn match_atom<K: PatternOps>(ir: &Ir<K>, atom: &str, op: OpId, bindings: &mut HashMap<String, Binding>) -> bool {
    if is_int_literal(atom) {
        let value: i64 = atom.parse().unwrap();
        return ir.op(op).kind.literal_int(&ir.op(op).attrs) == Some(value);
    }
    if is_var_prefixed(atom, '\'') {
        let name = &atom[1..];
        let Some(value) = ir.op(op).kind.literal_int(&ir.op(op).attrs) else { return false };
        return bind_or_check(bindings, name, Binding::Int(value));
    }
    if is_var_prefixed(atom, '*') {
        // Float-constant variable: bound on first sight, matched on repeat by op identity
        // (float equality is not meaningfully re-checked bit-for-bit here).
        return bind_or_check(bindings, &atom[1..], Binding::Op(op));
    }
    if is_var_prefixed(atom, '#') {
        // Integer-immediate variable bound to an Int attribute carried by `op` itself.
        let Some(value) = ir.op(op).kind.literal_int(&ir.op(op).attrs) else { return false };
        return bind_or_check(bindings, &atom[1..], Binding::Int(value));
    }
    // Plain variable: bind to the op, checked structurally (by identity) on repeat.
    bind_or_check(bindings, atom, Binding::Op(op))
}

fn bind_or_check(bindings: &mut HashMap<String, Binding>, name: &str, value: Binding) -> bool {
    match bindings.get(name) {
        Some(existing) => *existing == value,
        None => {
            bindings.insert(name.to_string(), value);
            true
        }
    }
}

fn match_list<K: PatternOps>(ir: &Ir<K>, items: &[Expr], op: OpId, bindings: &mut HashMap<String, Binding>) -> bool {
    let Some(opcode) = items.first().and_then(|e| e.atom()) else { return false };
    let canon = match opcode {
        "add" => Canon::Add,
        "sub" => Canon::Sub,
        "mul" => Canon::Mul,
        "div" => Canon::Div,
        "mod" => Canon::Mod,
        "and" => Canon::And,
        "or" => Canon::Or,
        "eq" => Canon::Eq,
        "ne" => Canon::Ne,
        "lt" => Canon::Lt,
        "le" => Canon::Le,
        "gt" => Canon::Gt,
        "ge" => Canon::Ge,
        "minus" => Canon::Minus,
        "not" => Canon::Not,
        "snz" => Canon::Snz,
        "br" => return match_branch(ir, &items[1], op, bindings),
        _ => return false,
    };
    if ir.op(op).kind.classify() != Some(canon) {
        return false;
    }
    let operands = ir.op(op).operands.clone();
    let args = &items[1..];
    if operands.len() != args.len() {
        return false;
    }
    for (arg, &operand) in args.iter().zip(operands.iter()) {
        if !match_expr(ir, arg, operand, bindings) {
            return false;
        }
    }
    true
}

/// `(br COND)`: matches a block's conditional-branch terminator whose condition op matches
/// `COND` (used by `LoopAnalysis`'s stop-condition detection).
fn match_branch<K: PatternOps>(ir: &Ir<K>, cond_pattern: &Expr, op: OpId, bindings: &mut HashMap<String, Binding>) -> bool {
    if !ir.op(op).kind.is_terminator() {
        return false;
    }
    let operands = ir.op(op).operands.clone();
    let Some(&cond) = operands.first() else { return false };
    match_expr(ir, cond_pattern, cond, bindings)
}

/// Builds replacement IR from `expr`, inserting at the builder's current position.
fn build_expr_into<K: PatternOps>(
    ir: &mut Ir<K>,
    builder: &mut Builder,
    expr: &Expr,
    bindings: &HashMap<String, Binding>,
    failed: &mut bool,
    result_ty: Ty,
) -> OpId {
    match expr {
        Expr::Atom(atom) => build_atom(ir, builder, atom, bindings, result_ty),
        Expr::List(items) => build_list(ir, builder, items, bindings, failed, result_ty),
    }
}

fn build_atom<K: PatternOps>(
    ir: &mut Ir<K>,
    builder: &mut Builder,
    atom: &str,
    bindings: &HashMap<String, Binding>,
    result_ty: Ty,
) -> OpId {
    if is_int_literal(atom) {
        let value: i64 = atom.parse().unwrap();
        let (kind, attrs) = K::make_literal(value);
        return builder.create(ir, kind, &[], attrs, result_ty);
    }
    let name = atom.trim_start_matches(['\'', '*', '#']);
    match bindings.get(name) {
        Some(Binding::Op(op)) => *op,
        Some(Binding::Int(value)) => {
            let (kind, attrs) = K::make_literal(*value);
            builder.create(ir, kind, &[], attrs, result_ty)
        }
        _ => panic!("pattern variable `{atom}` could not be built"),
    }
}

fn build_list<K: PatternOps>(
    ir: &mut Ir<K>,
    builder: &mut Builder,
    items: &[Expr],
    bindings: &HashMap<String, Binding>,
    failed: &mut bool,
    result_ty: Ty,
) -> OpId {
    let head = items[0].atom().expect("build-expr head must be an opcode atom");
    if let Some(value) = eval_function(head, &items[1..], bindings, failed) {
        let (kind, attrs) = K::make_literal(value);
        return builder.create(ir, kind, &[], attrs, result_ty);
    }

    let canon = match head {
        "add" => Canon::Add,
        "sub" => Canon::Sub,
        "mul" => Canon::Mul,
        "div" => Canon::Div,
        "mod" => Canon::Mod,
        "and" => Canon::And,
        "or" => Canon::Or,
        "eq" => Canon::Eq,
        "ne" => Canon::Ne,
        "lt" => Canon::Lt,
        "le" => Canon::Le,
        "gt" => Canon::Gt,
        "ge" => Canon::Ge,
        "minus" => Canon::Minus,
        "not" => Canon::Not,
        "snz" => Canon::Snz,
        other => panic!("unknown build opcode `{other}`"),
    };
    let kind = K::from_canon(canon);
    let mut operand_ids = Vec::with_capacity(items.len() - 1);
    for a in &items[1..] {
        operand_ids.push(build_expr_into(&mut *ir, &mut *builder, a, bindings, &mut *failed, result_ty));
    }
    builder.create(ir, kind, &operand_ids, vec![], result_ty)
}

/// The `!foo` compile-time integer functions (spec §4.2). Returns `None` for a non-`!`
/// head so the caller falls through to op construction.
fn eval_function(
    head: &str,
    args: &[Expr],
    bindings: &HashMap<String, Binding>,
    failed: &mut bool,
) -> Option<i64> {
    if !head.starts_with('!') {
        return None;
    }
    let name = &head[1..];
    if name == "only-if" {
        let cond = eval_int(&args[0], bindings);
        let value = eval_int(&args[1], bindings);
        if cond == 0 {
            *failed = true;
        }
        return Some(value);
    }
    let vals: Vec<i64> = args.iter().map(|a| eval_int(a, bindings)).collect();
    Some(match name {
        "add" => vals[0].wrapping_add(vals[1]),
        "sub" => vals[0].wrapping_sub(vals[1]),
        "mul" => vals[0].wrapping_mul(vals[1]),
        "div" => {
            if vals[1] == 0 {
                *failed = true;
                0
            } else {
                vals[0].wrapping_div(vals[1])
            }
        }
        "mod" => {
            if vals[1] == 0 {
                *failed = true;
                0
            } else {
                vals[0].wrapping_rem(vals[1])
            }
        }
        "gt" => (vals[0] > vals[1]) as i64,
        "lt" => (vals[0] < vals[1]) as i64,
        "le" => (vals[0] <= vals[1]) as i64,
        "eq" => (vals[0] == vals[1]) as i64,
        "ne" => (vals[0] != vals[1]) as i64,
        "and" => (vals[0] != 0 && vals[1] != 0) as i64,
        "or" => (vals[0] != 0 || vals[1] != 0) as i64,
        "not" => (vals[0] == 0) as i64,
        "minus" => -vals[0],
        "inbit" => ((vals[0] & (1 << vals[1])) != 0) as i64,
        other => panic!("unknown pattern function `!{other}`"),
    })
}

fn eval_int(expr: &Expr, bindings: &HashMap<String, Binding>) -> i64 {
    match expr {
        Expr::Atom(atom) => {
            if is_int_literal(atom) {
                return atom.parse().unwrap();
            }
            let name = atom.trim_start_matches(['\'', '*', '#']);
            match bindings.get(name) {
                Some(Binding::Int(v)) => *v,
                _ => panic!("pattern variable `{atom}` is not a bound integer"),
            }
        }
        Expr::List(items) => {
            let mut failed = false;
            let head = items[0].atom().expect("nested eval expression must start with an opcode/function atom");
            let v = eval_function(head, &items[1..], bindings, &mut failed)
                .unwrap_or_else(|| panic!("`{head}` cannot appear in an integer-evaluator expression"));
            v
        }
    }
}
