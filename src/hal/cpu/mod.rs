use half::f16;

use super::ops::{
    CreateOp, EinsumOp, Max, Mean, Min, Prod, ReduceAxisOp, ReduceOp, SqrtOp, Sum, Var,
};
use crate::loom::device::CpuBuilder;

mod create;
mod einsum;
mod reduce;

pub use reduce::Fold;

macro_rules! add_number_ops {
    ($builder:expr, $($ty:ty),+) => {{
        let builder = $builder;
        $(
            let builder = builder
                .add_op::<CreateOp<$ty>>()
                .add_op::<ReduceOp<$ty, Sum>>()
                .add_op::<ReduceAxisOp<$ty, Prod>>()
                .add_op::<ReduceAxisOp<$ty, Min>>()
                .add_op::<ReduceAxisOp<$ty, Max>>()
                .add_op::<EinsumOp<$ty>>();
        )+
        builder
    }};
}

macro_rules! add_float_ops {
    ($builder:expr, $($ty:ty),+) => {{
        let builder = $builder;
        $(
            let builder = builder
                .add_op::<ReduceOp<$ty, Mean>>()
                .add_op::<ReduceOp<$ty, Var>>()
                .add_op::<SqrtOp<$ty>>();
        )+
        builder
    }};
}

impl CpuBuilder {
    /// Registers the kernels of every reduction for every supported data type.
    pub fn add_default_ops(self) -> Self {
        let builder = add_number_ops!(self, f32, f16, u8, u16, u32, i32);
        add_float_ops!(builder, f32, f16)
    }
}

/// Computes `f(index)` for every index in `0..len`.
fn generate<T, F>(len: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    #[cfg(not(feature = "rayon"))]
    let output = (0..len).map(f).collect();
    #[cfg(feature = "rayon")]
    let output = {
        use rayon::prelude::*;
        (0..len).into_par_iter().map(f).collect()
    };
    output
}
