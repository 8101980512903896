//! Classic backward dataflow over operands (`updateLiveness` in the design notes). Used by
//! LICM/DSE/DLE and by `sysc_machine`'s allocator as the starting point before its own
//! event-driven per-block sweep (spec §4.9 step 2).

use crate::{BlockId, Ir, OpId, OpKind, RegionId};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct Liveness {
    pub live_in: HashMap<BlockId, HashSet<OpId>>,
    pub live_out: HashMap<BlockId, HashSet<OpId>>,
}

impl<K: OpKind> Ir<K> {
    pub fn compute_liveness(&self, region: RegionId) -> Liveness {
        let blocks = self.region(region).blocks.clone();

        // uses[b]: values used in b before any local redefinition reaches them (upward
        // exposed uses), attributing phi operands to the edge they arrive on rather than
        // the phi's own block.
        let mut uses: HashMap<BlockId, HashSet<OpId>> = HashMap::new();
        let mut defs: HashMap<BlockId, HashSet<OpId>> = HashMap::new();
        // Extra uses injected at the *end* of a predecessor block because a phi in a
        // successor reads that predecessor's value along that edge.
        let mut edge_uses: HashMap<BlockId, HashSet<OpId>> = HashMap::new();

        for &b in &blocks {
            let mut local_defs: HashSet<OpId> = HashSet::new();
            let mut local_uses: HashSet<OpId> = HashSet::new();
            for op in self.block_ops(b) {
                let data = self.op(op);
                if data.kind.is_phi() {
                    for (i, &operand) in data.operands.iter().enumerate() {
                        if let Some(from_block) = data.attrs.get(i).and_then(|a| a.as_from()) {
                            edge_uses.entry(from_block).or_default().insert(operand);
                        }
                    }
                } else {
                    for &operand in &data.operands {
                        if !local_defs.contains(&operand) {
                            local_uses.insert(operand);
                        }
                    }
                }
                local_defs.insert(op);
            }
            uses.insert(b, local_uses);
            defs.insert(b, local_defs);
        }

        let mut live_in: HashMap<BlockId, HashSet<OpId>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();
        let mut live_out: HashMap<BlockId, HashSet<OpId>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &b in blocks.iter().rev() {
                let mut out: HashSet<OpId> = HashSet::new();
                for &s in &self.block(b).succs {
                    out.extend(live_in[&s].iter().copied());
                }
                out.extend(edge_uses.get(&b).into_iter().flatten().copied());

                let mut inn = uses[&b].clone();
                for v in &out {
                    if !defs[&b].contains(v) {
                        inn.insert(*v);
                    }
                }

                if inn != live_in[&b] || out != live_out[&b] {
                    changed = true;
                }
                live_in.insert(b, inn);
                live_out.insert(b, out);
            }
        }

        Liveness { live_in, live_out }
    }
}
