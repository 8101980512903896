//! Predecessor/successor recomputation and dominance, kept explicit and recomputable per
//! spec §5 ("recomputable indices ... must be refreshed by the pass that invalidates them").

use crate::{BlockId, Ir, OpKind, RegionId};
use hashbrown::{HashMap, HashSet};

impl<K: OpKind> Ir<K> {
    /// Recomputes `preds`/`succs` for every block in `region` from each block's terminator
    /// (`Target`/`Else` attrs on branch/jump ops; no edges from a `return`).
    pub fn update_preds(&mut self, region: RegionId) {
        let blocks = self.region(region).blocks.clone();
        for &b in &blocks {
            self.block_mut(b).preds.clear();
            self.block_mut(b).succs.clear();
        }
        for &b in &blocks {
            let Some(term) = self.terminator(b) else { continue };
            let op = self.op(term);
            let mut succs = Vec::new();
            if let Some(t) = op.find_attr(|a| a.as_target().is_some()).and_then(|a| a.as_target()) {
                succs.push(t);
            }
            if let Some(e) = op.find_attr(|a| a.as_else().is_some()).and_then(|a| a.as_else()) {
                succs.push(e);
            }
            self.block_mut(b).succs = succs.clone();
            for s in succs {
                self.block_mut(s).preds.push(b);
            }
        }
    }

    /// Iterative Cooper-Harvey-Kennedy dominator computation, reverse-postorder over the
    /// CFG, to a fixed point.
    pub fn update_doms(&mut self, region: RegionId) {
        self.update_preds(region);
        let blocks = self.region(region).blocks.clone();
        if blocks.is_empty() {
            return;
        }
        let entry = blocks[0];

        let rpo = self.reverse_postorder(entry);
        let mut index_of: HashMap<BlockId, usize> = HashMap::new();
        for (i, &b) in rpo.iter().enumerate() {
            index_of.insert(b, i);
        }

        let mut idom: HashMap<BlockId, Option<usize>> = HashMap::new();
        for &b in &rpo {
            idom.insert(b, None);
        }
        idom.insert(entry, Some(index_of[&entry]));

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let preds: Vec<BlockId> =
                    self.block(b).preds.iter().copied().filter(|p| index_of.contains_key(p)).collect();
                let mut new_idom: Option<usize> = None;
                for p in preds {
                    let pi = index_of[&p];
                    if idom.get(&p).copied().flatten().is_none() && p != entry {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pi,
                        Some(cur) => intersect(&rpo, &idom, cur, pi),
                    });
                }
                if idom[&b] != new_idom {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }

        for &b in &rpo {
            self.block_mut(b).idom = idom[&b].map(|i| rpo[i]);
        }
        self.block_mut(entry).idom = None;

        self.update_dominance_frontiers(region);
    }

    fn reverse_postorder(&self, entry: BlockId) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        let mut stack = vec![(entry, false)];
        while let Some((b, processed)) = stack.pop() {
            if processed {
                postorder.push(b);
                continue;
            }
            if !visited.insert(b) {
                continue;
            }
            stack.push((b, true));
            for &s in &self.block(b).succs {
                if !visited.contains(&s) {
                    stack.push((s, false));
                }
            }
        }
        postorder.reverse();
        postorder
    }

    fn update_dominance_frontiers(&mut self, region: RegionId) {
        let blocks = self.region(region).blocks.clone();
        for &b in &blocks {
            self.block_mut(b).dom_frontier.clear();
        }
        for &b in &blocks {
            let preds = self.block(b).preds.clone();
            if preds.len() < 2 {
                continue;
            }
            for p in preds {
                let mut runner = Some(p);
                while let Some(r) = runner {
                    if Some(r) == self.block(b).idom {
                        break;
                    }
                    if !self.block(r).dom_frontier.contains(&b) {
                        self.block_mut(r).dom_frontier.push(b);
                    }
                    runner = self.block(r).idom;
                }
            }
        }
    }

    /// True if `b` is dominated by `dom` (`dom == b` counts, matching the original's
    /// `dominatedBy` used for backedge detection).
    pub fn dominated_by(&self, b: BlockId, dom: BlockId) -> bool {
        let mut cur = Some(b);
        while let Some(c) = cur {
            if c == dom {
                return true;
            }
            cur = self.block(c).idom;
        }
        false
    }
}

/// Walks two dominator-tree ancestor chains (by reverse-postorder index, where lower index
/// dominates) until they meet.
fn intersect(rpo: &[BlockId], idom: &HashMap<BlockId, Option<usize>>, mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[&rpo[a]].unwrap_or(a);
        }
        while b > a {
            b = idom[&rpo[b]].unwrap_or(b);
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attr, Ty};

    #[derive(Debug, Clone, PartialEq)]
    enum TestOp {
        Nop,
        Goto,
        Branch,
        Return,
    }

    impl OpKind for TestOp {
        fn mnemonic(&self) -> &'static str {
            "test"
        }
        fn is_terminator(&self) -> bool {
            matches!(self, TestOp::Goto | TestOp::Branch | TestOp::Return)
        }
        fn is_phi(&self) -> bool {
            false
        }
    }

    // entry -> a -> b -> a (loop back-edge), b -> exit
    #[test]
    fn computes_idom_and_dominance_frontier_for_a_simple_loop() {
        let mut ir: Ir<TestOp> = Ir::new();
        let region = ir.new_region(None);
        let entry = ir.append_block(region);
        let a = ir.append_block(region);
        let b = ir.append_block(region);
        let exit = ir.append_block(region);

        let mut builder = crate::Builder::new();
        builder.set_to_block_end(&ir, entry);
        builder.create(&mut ir, TestOp::Goto, &[], vec![Attr::Target(a)], Ty::Void);

        builder.set_to_block_end(&ir, a);
        builder.create(&mut ir, TestOp::Goto, &[], vec![Attr::Target(b)], Ty::Void);

        builder.set_to_block_end(&ir, b);
        builder.create(&mut ir, TestOp::Branch, &[], vec![Attr::Target(a), Attr::Else(exit)], Ty::Void);

        builder.set_to_block_end(&ir, exit);
        builder.create(&mut ir, TestOp::Return, &[], vec![], Ty::Void);

        ir.update_doms(region);

        assert_eq!(ir.block(a).idom, Some(entry));
        assert_eq!(ir.block(b).idom, Some(a));
        assert_eq!(ir.block(exit).idom, Some(b));
        assert!(ir.dominated_by(b, a));
        assert!(!ir.dominated_by(a, b));
        // `a` is its own loop header's dominance-frontier member via b's back-edge.
        assert!(ir.block(b).dom_frontier.contains(&a));
    }
}
