//! The mid-level optimization pipeline (spec §4): structural lowering, SSA construction, and
//! the classical dataflow/value-numbering/loop passes, wired together by `PassManager`.

pub mod alias;
pub mod dae;
pub mod dce;
pub mod dle;
pub mod dse;
pub mod flatten_cfg;
pub mod globalize;
pub mod gvn;
pub mod loop_analysis;
pub mod mem2reg;
pub mod pass;
pub mod simplify_cfg;
pub mod strength_reduce;
pub mod tco;

pub use alias::Alias;
pub use dae::Dae;
pub use dce::Dce;
pub use dle::Dle;
pub use dse::Dse;
pub use flatten_cfg::FlattenCfg;
pub use globalize::Globalize;
pub use gvn::Gvn;
pub use loop_analysis::{LoopRotate, Licm, LoopAnalysis, ConstLoopUnroll, Scev};
pub use mem2reg::Mem2Reg;
pub use pass::{Pass, PassManager};
pub use simplify_cfg::SimplifyCfg;
pub use strength_reduce::StrengthReduce;
pub use tco::Tco;

/// The default pipeline run ahead of machine lowering: flatten structured control flow, build
/// SSA out of locals, run loop transforms and the alias-dependent memory passes, then clean up
/// to a fixed point.
pub fn default_pipeline() -> PassManager {
    let mut pm = PassManager::new();
    pm.add_pass(FlattenCfg::new())
        .add_pass(Mem2Reg::new())
        .add_pass(SimplifyCfg::new())
        .add_pass(Gvn::new())
        .add_pass(LoopRotate::new())
        .add_pass(Licm::new())
        .add_pass(ConstLoopUnroll::new())
        .add_pass(Scev::new())
        .add_pass(Tco::new())
        .add_pass(Alias::new())
        .add_pass(Dle::new())
        .add_pass(Dse::new())
        .add_pass(Dae::new())
        .add_pass(Globalize::new())
        .add_pass(StrengthReduce::new())
        .add_pass(Dce::new());
    pm
}
