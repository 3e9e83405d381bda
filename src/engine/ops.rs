//! Operation sets a pool handle dispatches to

use std::{fmt, sync::Arc};

use crate::{
    bridge::PoolBridge,
    error::{PoolBridgeError, Result},
};

use super::{handle::PoolHandle, object::ObjectRef};

/// Most operation sets the table accepts
pub const MAX_OPS: usize = 16;

/// Callback set backing a pool handle.
///
/// Every call receives the bridge context the handle belongs to, so
/// implementations keep no global state.
pub trait PoolOps: Send + Sync + fmt::Debug {
    /// Name the set is registered under
    fn name(&self) -> &'static str;

    /// Construct hook, called once when the handle is brought up
    fn alloc(&self, pool: &PoolHandle) -> Result<()>;

    /// Destruct hook
    fn free(&self, pool: &PoolHandle);

    /// Number of objects available in the pool
    fn get_count(&self, ctx: &PoolBridge, pool: &PoolHandle) -> usize;

    /// Return `objs` to the pool
    fn enqueue(&self, ctx: &PoolBridge, pool: &PoolHandle, objs: &[ObjectRef]) -> Result<()>;

    /// Fill every entry of `objs`, or fail without taking anything
    fn dequeue(&self, ctx: &PoolBridge, pool: &PoolHandle, objs: &mut [ObjectRef]) -> Result<()>;
}

/// Registry of named operation sets
#[derive(Debug, Default)]
pub struct OpsTable {
    ops: Vec<Arc<dyn PoolOps>>,
}

impl OpsTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation set, returns its index
    pub fn register(&mut self, ops: Arc<dyn PoolOps>) -> Result<usize> {
        if self.find(ops.name()).is_some() {
            return Err(PoolBridgeError::invalid_parameter(
                "ops",
                format!("Operation set '{}' already registered", ops.name()),
            ));
        }
        if self.ops.len() >= MAX_OPS {
            return Err(PoolBridgeError::invalid_parameter(
                "ops",
                format!("At most {} operation sets can be registered", MAX_OPS),
            ));
        }
        self.ops.push(ops);
        Ok(self.ops.len() - 1)
    }

    /// Look up an operation set by name
    pub fn find(&self, name: &str) -> Option<&Arc<dyn PoolOps>> {
        self.ops.iter().find(|ops| ops.name() == name)
    }

    /// Names of every registered set, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.ops.iter().map(|ops| ops.name()).collect()
    }

    /// Number of registered sets
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
