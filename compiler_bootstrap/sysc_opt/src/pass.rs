//! The `Pass`/`PassManager` framework, grounded on `original_source/src/opt/Pass.h`/`.cpp`.

use hashbrown::HashMap;
use sysc_ir::MidModule;

pub trait Pass {
    fn name(&self) -> &'static str;
    /// Per-run counters (e.g. `"folded" -> 12`), logged at debug level by the manager.
    fn stats(&self) -> HashMap<String, i64> {
        HashMap::new()
    }
    fn run(&mut self, module: &mut MidModule);
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        PassManager { passes: Vec::new() }
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn run(&mut self, module: &mut MidModule) {
        for pass in &mut self.passes {
            pass.run(module);
            let stats = pass.stats();
            if stats.is_empty() {
                log::debug!("{}: <no stats>", pass.name());
            } else {
                for (k, v) in &stats {
                    log::debug!("{}: {} = {}", pass.name(), k, v);
                }
            }
        }
    }
}
