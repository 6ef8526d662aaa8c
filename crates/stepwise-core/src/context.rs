//! Variable tiers.
//!
//! The global tier is a single [`ContextStore`] shared by every case of a run.
//! Each executing case layers a [`CaseScope`] (case-local and step-output
//! tiers) over a snapshot of it. Lookup order is step-output, then
//! case-local, then global.

use crate::model::Vars;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared global tier. Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    inner: Arc<RwLock<Vars>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(vars: Vars) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vars)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(key).cloned()
    }

    /// Applies every entry under one write lock; readers never observe a
    /// partially applied batch.
    pub fn merge(&self, vars: Vars) {
        if vars.is_empty() {
            return;
        }
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in vars {
            guard.insert(key, value);
        }
    }

    pub fn snapshot(&self) -> Vars {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-case view: a global snapshot plus the case-local and step-output tiers.
#[derive(Debug, Clone, Default)]
pub struct CaseScope {
    global: Vars,
    local: Vars,
    outputs: Vars,
}

impl CaseScope {
    pub fn new(store: &ContextStore, local: &Vars) -> Self {
        Self {
            global: store.snapshot(),
            local: local.clone(),
            outputs: Vars::new(),
        }
    }

    /// Re-reads the global tier so promotions from other cases become visible.
    pub fn refresh(&mut self, store: &ContextStore) {
        self.global = store.snapshot();
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: Value) {
        self.local.insert(key.into(), value);
    }

    pub fn record_outputs(&mut self, outputs: &Vars) {
        for (key, value) in outputs {
            self.outputs.insert(key.clone(), value.clone());
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.outputs
            .get(key)
            .or_else(|| self.local.get(key))
            .or_else(|| self.global.get(key))
    }

    pub fn outputs(&self) -> &Vars {
        &self.outputs
    }

    /// Flattened view for rendering; higher tiers shadow lower ones.
    pub fn vars(&self) -> Vars {
        let mut combined = self.global.clone();
        for tier in [&self.local, &self.outputs] {
            for (key, value) in tier {
                combined.insert(key.clone(), value.clone());
            }
        }
        combined
    }
}

/// Writes step outputs into the global tier in a single merge.
pub fn promote(store: &ContextStore, outputs: &Vars) {
    store.merge(outputs.clone());
}
