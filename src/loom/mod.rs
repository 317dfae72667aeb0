//! The `loom` module provides the foundations that reductions are dispatched through.
//!
//! ## Key Components
//! 1. **Layouts and Axes**:
//!    - Row-major layouts (`Layout`) and their strides.
//!    - Axis selections (`Axes`) with negative indexing, and their single-axis decomposition.
//!
//! 2. **Device Abstraction**:
//!    - Hardware-agnostic execution via the `Device` trait.
//!    - Per-device op tables mapping each op type to its kernel.
//!
//! 3. **Numerical System**:
//!    - Scalar types (`f32`, `f16`, `u8`, etc.) and the arithmetic reductions need.
//!
//! 4. **Execution Model**:
//!    - Ops recorded on tapes (`TensorTape`) and executed lazily on read-back.
//!    - Asynchronous device tasks running blocking kernels off the runtime.

pub mod axis;
pub mod device;
pub mod layout;
pub mod num;
pub mod ops;
pub mod platform;
pub mod tensor;
