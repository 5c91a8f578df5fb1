//! Heap built-ins
//!
//! - `malloc(size)`: uninitialized block, pointer to `elem_size`-byte elements
//! - `calloc(count, size)`: zeroed block, pointer to `size`-byte elements
//! - `free(ptr)`: validated by [`Diagnostics::check_free`]; `free(NULL)` is a no-op
//!
//! Request sizes are checked before the allocator sees them: zero bytes, an
//! overflowing `count * size` or more than the whole heap is an
//! `InvalidSize`; a request that fits the heap but not its free space is a
//! `CapacityExceeded`, which always halts.

use crate::diagnostics::{Diagnostics, Violation};
use crate::interpreter::engine::Simulator;
use crate::memory::value::Value;

impl Simulator {
    pub(crate) fn builtin_malloc(
        &mut self,
        index: usize,
        dest: &str,
        size: usize,
        elem_size: usize,
    ) -> Result<(), Violation> {
        let total = Diagnostics::check_heap_request(1, size, self.space.heap_capacity())?;
        let ptr = self.heap.malloc(&mut self.space, total, elem_size, index)?;
        self.bind(dest, Value::Pointer(ptr));
        Ok(())
    }

    pub(crate) fn builtin_calloc(
        &mut self,
        index: usize,
        dest: &str,
        count: usize,
        size: usize,
    ) -> Result<(), Violation> {
        Diagnostics::check_heap_request(count, size, self.space.heap_capacity())?;
        let ptr = self.heap.calloc(&mut self.space, count, size, index)?;
        self.bind(dest, Value::Pointer(ptr));
        Ok(())
    }

    pub(crate) fn builtin_free(&mut self, index: usize, ptr_name: &str) -> Result<(), Violation> {
        let ptr = self.pointer_operand(ptr_name)?;
        match Diagnostics::check_free(ptr_name, &ptr, &self.heap)? {
            Some(id) => self.heap.free(&mut self.space, id, index)?,
            None => log::debug!("free(NULL) through '{}' ignored", ptr_name),
        }
        Ok(())
    }
}
