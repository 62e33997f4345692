//! Island modules and how they are obtained.
//!
//! A module is the client-side half of an island: a hydrate entry that
//! receives the island's document node and its resolved state and wires up
//! interactivity. Loading is abstracted behind `ModuleLoader` so hosts can
//! plug in whatever resolution they have; `ModuleRegistry` is the
//! in-process implementation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::dom::document::{Document, NodeId};

/// Island hydrate entry point.
pub type HydrateFn<Ev> = Rc<dyn Fn(&Document<Ev>, NodeId, &Value)>;

/// A loaded island module.
pub struct Module<Ev> {
    /// Absent when the module loaded but exports no hydrate entry.
    pub hydrate: Option<HydrateFn<Ev>>,
}

impl<Ev> Clone for Module<Ev> {
    fn clone(&self) -> Self {
        Self {
            hydrate: self.hydrate.clone(),
        }
    }
}

impl<Ev> Module<Ev> {
    pub fn new(hydrate: impl Fn(&Document<Ev>, NodeId, &Value) + 'static) -> Self {
        Self {
            hydrate: Some(Rc::new(hydrate)),
        }
    }

    /// A module without a hydrate entry.
    pub fn empty() -> Self {
        Self { hydrate: None }
    }
}

/// Resolves a `data-island-src` value to a module.
pub trait ModuleLoader<Ev> {
    fn load(&self, src: &str) -> Result<Module<Ev>, String>;
}

/// In-process module table keyed by source path.
pub struct ModuleRegistry<Ev> {
    modules: RefCell<HashMap<String, Module<Ev>>>,
}

impl<Ev> Default for ModuleRegistry<Ev> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ev> ModuleRegistry<Ev> {
    pub fn new() -> Self {
        Self {
            modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn register(&self, src: impl Into<String>, module: Module<Ev>) {
        self.modules.borrow_mut().insert(src.into(), module);
    }
}

impl<Ev> ModuleLoader<Ev> for ModuleRegistry<Ev> {
    fn load(&self, src: &str) -> Result<Module<Ev>, String> {
        self.modules
            .borrow()
            .get(src)
            .cloned()
            .ok_or_else(|| format!("no module registered for `{src}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_registered_modules() {
        let registry: ModuleRegistry<String> = ModuleRegistry::new();
        registry.register("/a.js", Module::new(|_, _, _| {}));

        assert!(registry.load("/a.js").is_ok());
        assert!(registry.load("/b.js").is_err());
    }

    #[test]
    fn empty_module_has_no_hydrate_entry() {
        let module: Module<String> = Module::empty();
        assert!(module.hydrate.is_none());
    }
}
