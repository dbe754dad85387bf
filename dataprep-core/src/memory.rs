//! Memory accounting for materialized results

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::value::Value;

/// Byte budget for one materialization.
///
/// Rows are charged as they are drained from the engine; a charge that would
/// exceed the budget fails with [`Error::ResourceExhausted`] instead of
/// truncating the result.
#[derive(Debug)]
pub struct MemoryBudget {
    /// The total memory budget in bytes
    total_budget: usize,

    /// The current memory usage in bytes
    current_usage: AtomicUsize,
}

impl MemoryBudget {
    /// Create a new memory budget with the given total budget
    pub fn new(total_budget: usize) -> Self {
        Self {
            total_budget,
            current_usage: AtomicUsize::new(0),
        }
    }

    /// A budget that never refuses
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Try to allocate memory, returns false if exceeds budget
    pub fn try_allocate(&self, bytes: usize) -> bool {
        let mut current = self.current_usage.load(Ordering::SeqCst);

        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if next > self.total_budget {
                return false;
            }

            match self.current_usage.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Allocate memory or fail with a resource-exhausted error
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        if self.try_allocate(bytes) {
            Ok(())
        } else {
            Err(Error::ResourceExhausted {
                requested: bytes,
                available: self.available(),
            })
        }
    }

    /// Release previously allocated memory
    pub fn release(&self, bytes: usize) {
        let prev = self.current_usage.fetch_sub(bytes, Ordering::SeqCst);

        debug_assert!(
            prev >= bytes,
            "Attempted to release more memory than allocated: prev={prev}, release={bytes}"
        );
    }

    /// Bytes currently charged
    pub fn current_usage(&self) -> usize {
        self.current_usage.load(Ordering::SeqCst)
    }

    /// Bytes still available
    pub fn available(&self) -> usize {
        self.total_budget.saturating_sub(self.current_usage())
    }
}

/// Approximate heap + inline footprint of one materialized row
pub fn estimate_row_bytes(row: &[Value]) -> usize {
    let inline = mem::size_of::<Value>() * row.len() + mem::size_of::<Vec<Value>>();
    let heap: usize = row
        .iter()
        .map(|value| match value {
            Value::Text(s) => s.capacity(),
            _ => 0,
        })
        .sum();
    inline + heap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_exhausted() {
        let budget = MemoryBudget::new(100);
        assert!(budget.allocate(60).is_ok());
        let err = budget.allocate(60).unwrap_err();
        match err {
            Error::ResourceExhausted { requested, available } => {
                assert_eq!(requested, 60);
                assert_eq!(available, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
        budget.release(60);
        assert_eq!(budget.current_usage(), 0);
        assert!(budget.allocate(100).is_ok());
    }

    #[test]
    fn test_unlimited_never_overflows() {
        let budget = MemoryBudget::unlimited();
        assert!(budget.allocate(usize::MAX).is_ok());
        assert!(!budget.try_allocate(1));
    }

    #[test]
    fn test_row_estimate_counts_text() {
        let short = estimate_row_bytes(&[Value::Integer(1)]);
        let long = estimate_row_bytes(&[Value::Text("x".repeat(1000))]);
        assert!(long >= short + 1000);
    }
}
