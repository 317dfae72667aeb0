//! Hardware abstraction for reductions: the front-end API, op definitions and per-device kernels.

pub mod cpu;
pub mod einsum;
pub mod frontend;
pub mod ops;
