//! A lookup table from module name to the `dyn Module` implementing it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Module;

#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleepmod::SleepModule;

    #[test]
    fn register_and_lookup() {
        let mut reg = ModuleRegistry::new();
        reg.register(Arc::new(SleepModule));
        assert!(reg.get("sleep").is_some());
        assert!(reg.get("cc").is_none());
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["sleep"]);
    }
}
