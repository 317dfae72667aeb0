//! Axis-aware tensor reductions behind a uniform front-end.
//!
//! Every reduction is recorded as an op on the tensor's tape and dispatched to whichever device
//! owns the tensor. The device looks the op up in its op table and runs the matching kernel.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use sigma::prelude::*;
//!
//! let cpu = CpuBuilder::new().add_default_ops().build().await;
//! let x = Tensor::create(&cpu, [2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! let y = x.reduce_sum(-1, false)?;
//! assert_eq!(y.back().await?.to_vec(), vec![6.0, 15.0]);
//! # Ok(())
//! # }
//! ```

pub mod hal;
pub mod loom;

pub mod prelude {
    pub use crate::{
        hal::frontend::einsum,
        loom::{
            axis::Axes,
            device::{Cpu, CpuBuilder, Device},
            layout::Layout,
            num::{Float, Number, Scalar},
            tensor::{Tensor, TensorError},
        },
    };
}
