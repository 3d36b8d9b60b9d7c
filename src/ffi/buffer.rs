//! Ownership transfer for engine-allocated result buffers.
//!
//! A successful engine call may hand back a descriptor (pointer + length or
//! shape) for memory the engine allocated. The caller must copy everything it
//! needs out of that memory and then release it through the matching free
//! entry point, exactly once. [`EngineBuffer`] enforces that order: the
//! descriptor is only reachable inside [`EngineBuffer::copy_out`], and the
//! release runs on drop, on every exit path.

use tracing::warn;

use super::symbols::Symbols;
use super::types::*;

/// A descriptor the engine expects back through a specific free entry point.
pub trait EngineOwned: Copy {
    /// Label used when a buffer has to be leaked.
    const KIND: &'static str;

    /// Hand the buffer back to the engine.
    ///
    /// Returns `false` when the free entry point is absent and nothing was
    /// released.
    ///
    /// # Safety
    ///
    /// `self` must describe a live engine allocation that has not been freed.
    unsafe fn release(self, symbols: &Symbols) -> bool;
}

impl EngineOwned for FfiClassResults {
    const KIND: &'static str = "class results";

    unsafe fn release(self, symbols: &Symbols) -> bool {
        match symbols.class_results_free {
            Some(free) => {
                free(self);
                true
            }
            None => false,
        }
    }
}

impl EngineOwned for FfiFloatArray {
    const KIND: &'static str = "float array";

    unsafe fn release(self, symbols: &Symbols) -> bool {
        match symbols.float_array_free {
            Some(free) => {
                free(self);
                true
            }
            None => false,
        }
    }
}

impl EngineOwned for FfiFloat2DArray {
    const KIND: &'static str = "float matrix";

    unsafe fn release(self, symbols: &Symbols) -> bool {
        match symbols.float_2d_array_free {
            Some(free) => {
                free(self);
                true
            }
            None => false,
        }
    }
}

impl EngineOwned for FfiRerankResults {
    const KIND: &'static str = "rerank results";

    unsafe fn release(mut self, symbols: &Symbols) -> bool {
        match symbols.rerank_results_free {
            Some(free) => {
                free(&mut self);
                true
            }
            None => false,
        }
    }
}

impl EngineOwned for FfiSearchResults {
    const KIND: &'static str = "search results";

    unsafe fn release(self, symbols: &Symbols) -> bool {
        match symbols.search_results_free {
            Some(free) => {
                free(self);
                true
            }
            None => false,
        }
    }
}

/// Guard over an engine-owned result buffer.
pub struct EngineBuffer<'a, T: EngineOwned> {
    raw: T,
    symbols: &'a Symbols,
}

impl<'a, T: EngineOwned> EngineBuffer<'a, T> {
    /// Take ownership of a descriptor returned by a successful engine call.
    ///
    /// # Safety
    ///
    /// `raw` must have been filled in by the engine resolved in `symbols`
    /// and must not be released anywhere else.
    pub unsafe fn new(raw: T, symbols: &'a Symbols) -> Self {
        Self { raw, symbols }
    }

    /// Copy host values out of the buffer, then release it.
    pub fn copy_out<R>(self, parse: impl FnOnce(&T) -> R) -> R {
        let out = parse(&self.raw);
        drop(self);
        out
    }
}

impl<T: EngineOwned> Drop for EngineBuffer<'_, T> {
    fn drop(&mut self) {
        // Leak over crash: without a free entry point there is no valid
        // address to hand the buffer back to.
        let released = unsafe { self.raw.release(self.symbols) };
        if !released {
            warn!(kind = T::KIND, "engine free entry point unavailable, leaking result buffer");
        }
    }
}
