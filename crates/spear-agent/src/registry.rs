use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::envelope::RpcResult;
use crate::tool::{Tool, ToolId};

/// A locally implemented RPC method.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, params: Bytes) -> RpcResult;
}

impl<F> Handler for F
where
    F: Fn(Bytes) -> RpcResult + Send + Sync + 'static,
{
    fn call(&self, params: Bytes) -> RpcResult {
        self(params)
    }
}

/// Method name → handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, returning the one it replaced.
    pub fn insert(&self, method: String, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method, handler)
    }

    pub fn remove(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(method)
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tool id → tool.
pub struct ToolRegistry {
    tools: RwLock<HashMap<ToolId, Arc<dyn Tool>>>,
    next_id: AtomicU64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `tool` under a fresh local id, skipping ids already in use.
    pub fn register(&self, tool: Arc<dyn Tool>) -> ToolId {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if let std::collections::hash_map::Entry::Vacant(slot) = tools.entry(id) {
                slot.insert(tool);
                return id;
            }
        }
    }

    /// Install `tool` under an explicit id, returning the one it replaced.
    pub fn insert(&self, id: ToolId, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tool)
    }

    pub fn remove(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
