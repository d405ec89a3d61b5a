//! Calling introspection helpers inside the inferior.
//!
//! Runtime libraries export helper functions that report their state into a
//! caller-supplied buffer (libdispatch's pending-items query is the canonical
//! example). [`HelperFunctionCaller`] owns one such buffer in the inferior,
//! allocated on first use and reused by every later call, and serializes
//! calls so concurrent users never share the buffer mid-call.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ExpressionResult, MemoryPermissions, ProcessMemory};
use crate::error::{Result, SymdexError};
use crate::types::{Address, ThreadId};

/// Size of the return buffer: room for four 64-bit result words.
pub const RETURN_BUFFER_SIZE: usize = 32;

/// How a helper function call is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperCallOptions
{
    /// Give up on the call after this long.
    pub timeout: Duration,
    /// Unwind the thread back to where it was if the call fails.
    pub unwind_on_error: bool,
    /// Do not stop at user breakpoints hit during the call.
    pub ignore_breakpoints: bool,
    /// Keep other threads suspended while the call runs.
    pub stop_others: bool,
    /// Retry with all threads running if the call times out on one.
    pub try_all_threads: bool,
}

impl Default for HelperCallOptions
{
    fn default() -> Self
    {
        Self {
            timeout: Duration::from_millis(500),
            unwind_on_error: true,
            ignore_breakpoints: true,
            stop_others: true,
            try_all_threads: false,
        }
    }
}

/// Result words of a pending-items query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingItems
{
    /// Buffer of item records allocated by the helper; the caller frees it
    /// by passing it back as `page_to_free` on the next call.
    pub items_buffer_ptr: Address,
    pub items_buffer_size: u64,
    pub count: u64,
}

/// Calls one helper function, passing it a cached return buffer.
pub struct HelperFunctionCaller
{
    process: Arc<dyn ProcessMemory>,
    function_name: String,
    function_address: Address,
    options: HelperCallOptions,
    return_buffer: Mutex<Option<Address>>,
}

impl std::fmt::Debug for HelperFunctionCaller
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HelperFunctionCaller")
            .field("function_name", &self.function_name)
            .field("function_address", &self.function_address)
            .field("options", &self.options)
            .field("return_buffer", &*self.return_buffer.lock())
            .finish()
    }
}

impl HelperFunctionCaller
{
    pub fn new(process: Arc<dyn ProcessMemory>, function_name: impl Into<String>, function_address: Address) -> Self
    {
        Self {
            process,
            function_name: function_name.into(),
            function_address,
            options: HelperCallOptions::default(),
            return_buffer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: HelperCallOptions) -> Self
    {
        self.options = options;
        self
    }

    pub fn function_name(&self) -> &str
    {
        &self.function_name
    }

    /// Address of the return buffer, if it has been allocated.
    pub fn return_buffer(&self) -> Option<Address>
    {
        *self.return_buffer.lock()
    }

    fn ensure_return_buffer(&self, slot: &mut Option<Address>) -> Result<Address>
    {
        if let Some(buffer) = *slot {
            return Ok(buffer);
        }
        let buffer = self
            .process
            .allocate_memory(RETURN_BUFFER_SIZE, MemoryPermissions::READ | MemoryPermissions::WRITE)
            .map_err(|err| {
                SymdexError::ResourceExhausted(format!(
                    "unable to allocate {RETURN_BUFFER_SIZE} byte return buffer for {}: {err}",
                    self.function_name
                ))
            })?;
        debug!(function = %self.function_name, buffer = %buffer, "allocated helper return buffer");
        *slot = Some(buffer);
        Ok(buffer)
    }

    /// Call the helper on `thread` and read `result_words` 64-bit words back
    /// from the return buffer.
    ///
    /// The buffer address is passed as the first argument, followed by
    /// `arguments`.
    ///
    /// ## Errors
    ///
    /// - `NotSafeToCall` if `thread` cannot run functions right now
    /// - `ResourceExhausted` if the return buffer cannot be allocated
    /// - `ExecutionFailed` if the call does not complete
    /// - `MemoryRead` if the result words cannot be read back
    pub fn call(&self, thread: ThreadId, arguments: &[u64], result_words: usize) -> Result<Vec<u64>>
    {
        if !self.process.safe_to_call_functions(thread) {
            return Err(SymdexError::NotSafeToCall(format!(
                "thread {} cannot run {}",
                thread.raw(),
                self.function_name
            )));
        }
        if result_words.checked_mul(8).is_none_or(|bytes| bytes > RETURN_BUFFER_SIZE) {
            return Err(SymdexError::InvalidArgument(format!(
                "{result_words} result words do not fit in a {RETURN_BUFFER_SIZE} byte buffer"
            )));
        }

        // Held until the results are read back so no other call reuses the buffer.
        let mut slot = self.return_buffer.lock();
        let buffer = self.ensure_return_buffer(&mut slot)?;

        let mut call_arguments = Vec::with_capacity(arguments.len() + 1);
        call_arguments.push(buffer.value());
        call_arguments.extend_from_slice(arguments);

        let result = self
            .process
            .call_function(thread, self.function_address, &call_arguments, &self.options);
        if result != ExpressionResult::Completed {
            warn!(function = %self.function_name, %result, "helper function call failed");
            return Err(SymdexError::ExecutionFailed {
                function: self.function_name.clone(),
                result,
            });
        }

        (0..result_words)
            .map(|word| self.process.read_uint(buffer.saturating_add(word as u64 * 8), 8))
            .collect()
    }

    /// Ask a pending-items helper for the work items queued on `queue`.
    ///
    /// `page_to_free` hands back the items buffer returned by the previous
    /// call so the helper can release it.
    ///
    /// ## Errors
    ///
    /// Same as [`HelperFunctionCaller::call`].
    pub fn get_pending_items(&self, thread: ThreadId, queue: Address, page_to_free: Option<(Address, u64)>) -> Result<PendingItems>
    {
        let (page, page_size) = page_to_free.map_or((0, 0), |(page, size)| (page.value(), size));
        let words = self.call(thread, &[queue.value(), page, page_size], 3)?;
        let items = PendingItems {
            items_buffer_ptr: Address::new(words[0]),
            items_buffer_size: words[1],
            count: words[2],
        };
        debug!(
            queue = %queue,
            items = items.count,
            buffer = %items.items_buffer_ptr,
            size = items.items_buffer_size,
            "pending items"
        );
        Ok(items)
    }
}

impl Drop for HelperFunctionCaller
{
    fn drop(&mut self)
    {
        if let Some(buffer) = self.return_buffer.get_mut().take() {
            if let Err(err) = self.process.deallocate_memory(buffer) {
                warn!(function = %self.function_name, buffer = %buffer, error = %err, "failed to free helper return buffer");
            }
        }
    }
}
