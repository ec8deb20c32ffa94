//! Utility
pub mod binary_heap;
