//! Ownership and caching of the kernels used by a test
//!
//! [`KernelManager`] holds a fixed list of kernel slots. Any slot can be
//! precomputed, which materializes its Gram matrix into a
//! [`PrecomputedKernel`] that shadows the raw kernel until the slot is
//! restored. [`KernelManager::kernel_at`] always returns the effective kernel,
//! so callers get identical values whether or not a slot is cached.
//!
//! Precomputing a slot that already has a cache, or whose raw kernel is itself
//! precomputed, does nothing. Restoring a slot without a cache does nothing.

use crate::execution::{auto_engine, ExecutionEngine};
use crate::kernel::{Kernel, PrecomputedKernel};
use crate::{Error, Result};
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct KernelSlot {
    kernel: Option<Box<dyn Kernel>>,
    cache: Option<PrecomputedKernel>,
}

/// Fixed set of kernel slots with optional Gram-matrix caches
#[derive(Debug, Default)]
pub struct KernelManager {
    slots: Vec<KernelSlot>,
}

/// Mutable handle to one kernel slot
///
/// Any mutation of the raw kernel discards the slot's cache, since the cache
/// would no longer describe the kernel.
pub struct KernelSlotMut<'a> {
    slot: &'a mut KernelSlot,
}

impl<'a> KernelSlotMut<'a> {
    /// Replace the slot's kernel
    pub fn set(self, kernel: Box<dyn Kernel>) {
        self.slot.cache = None;
        self.slot.kernel = Some(kernel);
    }

    /// Remove and return the slot's kernel
    pub fn take(self) -> Option<Box<dyn Kernel>> {
        self.slot.cache = None;
        self.slot.kernel.take()
    }

    /// Mutable access to the raw kernel, e.g. to bind new features
    pub fn raw_mut(self) -> Option<&'a mut Box<dyn Kernel>> {
        self.slot.cache = None;
        self.slot.kernel.as_mut()
    }
}

impl KernelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with `num_kernels` empty slots
    pub fn with_num_kernels(num_kernels: usize) -> Self {
        let mut slots = Vec::with_capacity(num_kernels);
        slots.resize_with(num_kernels, KernelSlot::default);
        Self { slots }
    }

    pub fn num_kernels(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a kernel in a new slot and return the slot index
    pub fn push_kernel(&mut self, kernel: Box<dyn Kernel>) -> usize {
        self.slots.push(KernelSlot {
            kernel: Some(kernel),
            cache: None,
        });
        self.slots.len() - 1
    }

    /// Settable handle to slot `index`
    pub fn kernel_at_mut(&mut self, index: usize) -> Result<KernelSlotMut<'_>> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .map(|slot| KernelSlotMut { slot })
            .ok_or_else(|| Error::index(index, len, "kernel slots"))
    }

    /// Shorthand for `kernel_at_mut(index)?.set(kernel)`
    pub fn set_kernel_at(&mut self, index: usize, kernel: Box<dyn Kernel>) -> Result<()> {
        self.kernel_at_mut(index)?.set(kernel);
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<&KernelSlot> {
        self.slots
            .get(index)
            .ok_or_else(|| Error::index(index, self.slots.len(), "kernel slots"))
    }

    /// The effective kernel of slot `index`: the cache if present, else the raw kernel
    pub fn kernel_at(&self, index: usize) -> Result<&dyn Kernel> {
        let slot = self.slot(index)?;
        if let Some(cache) = &slot.cache {
            return Ok(cache);
        }
        slot.kernel
            .as_deref()
            .ok_or_else(|| Error::Precondition(format!("kernel slot {index} is empty")))
    }

    /// The raw kernel of slot `index`, ignoring any cache
    pub fn raw_kernel_at(&self, index: usize) -> Result<&dyn Kernel> {
        self.slot(index)?
            .kernel
            .as_deref()
            .ok_or_else(|| Error::Precondition(format!("kernel slot {index} is empty")))
    }

    /// Whether slot `index` currently serves evaluations from a Gram matrix
    pub fn is_precomputed_at(&self, index: usize) -> Result<bool> {
        Ok(self.kernel_at(index)?.is_precomputed())
    }

    /// Gram matrix slot `index` is served from, shared rather than copied
    pub fn precomputed_matrix_at(&self, index: usize) -> Result<Option<Arc<DMatrix<f64>>>> {
        Ok(self.kernel_at(index)?.gram_matrix())
    }

    /// Materialize the Gram matrix of slot `index` using the default engine
    pub fn precompute_kernel_at(&mut self, index: usize) -> Result<()> {
        self.precompute_kernel_at_with(index, &auto_engine())
    }

    /// Materialize the Gram matrix of slot `index`, computing rows on `engine`
    #[instrument(skip(self, engine), fields(strategy = ?engine.strategy()))]
    pub fn precompute_kernel_at_with<E: ExecutionEngine>(
        &mut self,
        index: usize,
        engine: &E,
    ) -> Result<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| Error::index(index, len, "kernel slots"))?;
        let kernel = slot
            .kernel
            .as_deref()
            .ok_or_else(|| Error::Precondition(format!("kernel slot {index} is empty")))?;

        if slot.cache.is_some() || kernel.is_precomputed() {
            debug!(kernel = kernel.name(), "slot already precomputed, skipping");
            return Ok(());
        }

        let cache = PrecomputedKernel::from_kernel(kernel, engine)?;
        debug!(
            kernel = kernel.name(),
            rows = cache.num_lhs(),
            cols = cache.num_rhs(),
            "precomputed kernel matrix"
        );
        slot.cache = Some(cache);
        Ok(())
    }

    /// Discard the cache of slot `index`
    pub fn restore_kernel_at(&mut self, index: usize) -> Result<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| Error::index(index, len, "kernel slots"))?;
        if slot.cache.take().is_some() {
            debug!(slot = index, "restored raw kernel");
        }
        Ok(())
    }

    /// Discard every cache
    pub fn restore_all(&mut self) {
        for slot in &mut self.slots {
            slot.cache = None;
        }
    }
}
