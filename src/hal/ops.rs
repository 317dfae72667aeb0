use std::{any::Any, marker::PhantomData, sync::Arc};

use sigma_derive::TensorOp;

use super::einsum::EinsumPlan;
use crate::loom::{
    num::Scalar,
    ops::{InnerOp, TensorIr, TensorOp, TensorOpId},
};

/// Marks which reduction a reduce op performs.
pub trait Reducer: std::fmt::Debug + Clone + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy)]
pub struct Sum;

#[derive(Debug, Clone, Copy)]
pub struct Prod;

#[derive(Debug, Clone, Copy)]
pub struct Mean;

#[derive(Debug, Clone, Copy)]
pub struct Var;

#[derive(Debug, Clone, Copy)]
pub struct Min;

#[derive(Debug, Clone, Copy)]
pub struct Max;

impl Reducer for Sum {}
impl Reducer for Prod {}
impl Reducer for Mean {}
impl Reducer for Var {}
impl Reducer for Min {}
impl Reducer for Max {}

#[derive(Debug, Clone, TensorOp)]
#[tensor_op(crate = "crate", bound = "T: Scalar")]
pub struct CreateOp<T> {
    #[tensor_op]
    pub op: InnerOp<0, 1>,
    pub contents: Arc<[T]>,
}

/// Reduces several axes at once.
#[derive(Debug, Clone, TensorOp)]
#[tensor_op(crate = "crate", bound = "T: Scalar, R: Reducer")]
pub struct ReduceOp<T, R> {
    #[tensor_op]
    pub op: InnerOp<1, 1>,
    /// Sorted and distinct axes of the input.
    pub axes: Arc<[usize]>,
    pub keepdims: bool,
    pub phantom: PhantomData<(T, R)>,
}

/// Reduces exactly one axis.
#[derive(Debug, Clone, TensorOp)]
#[tensor_op(crate = "crate", bound = "T: Scalar, R: Reducer")]
pub struct ReduceAxisOp<T, R> {
    #[tensor_op]
    pub op: InnerOp<1, 1>,
    pub axis: usize,
    pub keepdims: bool,
    pub phantom: PhantomData<(T, R)>,
}

#[derive(Debug, Clone, TensorOp)]
#[tensor_op(crate = "crate", bound = "T: Scalar")]
pub struct SqrtOp<T> {
    #[tensor_op]
    pub op: InnerOp<1, 1>,
    pub phantom: PhantomData<T>,
}

/// Contracts any number of operands following an einsum plan.
#[derive(Debug, Clone)]
pub struct EinsumOp<T> {
    pub id: TensorOpId,
    pub inputs: Vec<TensorIr>,
    pub output: TensorIr,
    pub plan: Arc<EinsumPlan>,
    pub phantom: PhantomData<T>,
}

impl<T: Scalar> TensorOp for EinsumOp<T> {
    #[inline]
    fn id(&self) -> TensorOpId {
        self.id
    }

    #[inline]
    fn io(&self) -> Vec<TensorIr> {
        self.inputs
            .iter()
            .chain(std::iter::once(&self.output))
            .cloned()
            .collect()
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}
