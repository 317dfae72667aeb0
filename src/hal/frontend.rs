use std::{marker::PhantomData, sync::Arc};

use itertools::Itertools;
use sigma_derive::build_api;

use super::{
    einsum::{EinsumError, Equation},
    ops::{CreateOp, EinsumOp, Max, Mean, Min, Prod, ReduceAxisOp, ReduceOp, Reducer, SqrtOp, Sum, Var},
};
use crate::loom::{
    axis::Axes,
    device::{Device, DeviceError, DeviceEvent},
    layout::IntoLayout,
    num::{Float, Number, Scalar},
    ops::{InnerOp, TensorOp, TensorOpId},
    tensor::{Tensor, TensorError, TensorId},
};

build_api!(1);

impl<D: Device + Clone, T: Scalar> Tensor<D, T> {
    /// Replace the ops recorded on the tape of the tensor.
    fn replace_ops(&mut self, ops: Vec<Box<dyn TensorOp>>) -> Vec<Box<dyn TensorOp>> {
        let tape = self.tape_mut();
        std::mem::replace(&mut tape.ops, ops)
    }

    /// Create a new tensor with the given device, layout, and contents.
    pub fn create<L, C>(device: &D, layout: L, contents: C) -> Result<Self, TensorError>
    where
        L: IntoLayout,
        C: Into<Arc<[T]>>,
    {
        let layout = layout.into_layout();
        let contents: Arc<[T]> = contents.into();
        if layout.size() != contents.len() {
            return Err(TensorError::Create(layout, contents.len()));
        }

        let mut output = Tensor::<D, T>::init(device, layout);
        let op = InnerOp::new([], [output.ir()]);
        let op = CreateOp { op, contents };
        let ops: Vec<Box<dyn TensorOp>> = vec![Box::new(op)];
        output.replace_ops(ops);

        Ok(output)
    }

    /// Execute the tensor's tape on its device without reading anything back.
    #[inline]
    pub async fn execute(&self) -> Result<TensorId, DeviceError> {
        let (sender, receiver) = flume::bounded(0);
        let tape = self.tape().clone();
        let event = DeviceEvent::Execute { tape, sender };
        self.device().execute(event);
        receiver.recv_async().await?
    }

    /// Read back the contents of the tensor from the device.
    #[inline]
    pub async fn back(&self) -> Result<Box<[T]>, DeviceError> {
        let (sender, receiver) = flume::bounded(0);
        let tape = self.tape().clone();
        let event = DeviceEvent::Back { tape, sender };
        self.device().execute(event);
        let data = receiver.recv_async().await??;
        Ok(bytemuck::pod_collect_to_vec(&data.data).into_boxed_slice())
    }

    /// Records a reduction of all `axes` in one op.
    fn reduce<R: Reducer>(self, axes: &Axes, keepdims: bool) -> Result<Self, TensorError> {
        let layout = self.layout();
        let axes = axes.resolve(layout.len())?;
        let output = Tensor::init(&self.device(), layout.reduce(&axes, keepdims));

        let axes = axes.into();
        let phantom = PhantomData::<(T, R)>;
        let f = move |op| ReduceOp {
            op,
            axes,
            keepdims,
            phantom,
        };
        Ok(build_api_1(f, output, self))
    }

    /// Records a reduction of a single, already normalized `axis`.
    fn reduce_axis<R: Reducer>(self, axis: usize, keepdims: bool) -> Self {
        let layout = self.layout().reduce(&[axis], keepdims);
        let output = Tensor::init(&self.device(), layout);

        let phantom = PhantomData::<(T, R)>;
        let f = move |op| ReduceAxisOp {
            op,
            axis,
            keepdims,
            phantom,
        };
        build_api_1(f, output, self)
    }

    /// Records a reduction of `axes` as a chain of single-axis reductions.
    fn reduce_each<R: Reducer>(self, axes: &Axes, keepdims: bool) -> Result<Self, TensorError> {
        let steps = axes.collapse(self.layout().len(), keepdims)?;
        if steps.len() > 1 {
            log::trace!(
                "reduce {} over {axes} in {} single-axis steps",
                std::any::type_name::<R>(),
                steps.len()
            );
        }
        let output = steps
            .into_iter()
            .fold(self, |x, axis| x.reduce_axis::<R>(axis, keepdims));
        Ok(output)
    }

    /// Fails if any of `axes` has no elements.
    fn check_nonempty(&self, axes: &Axes) -> Result<(), TensorError> {
        let layout = self.layout();
        let axes = axes.resolve(layout.len())?;
        match axes.into_iter().find(|&axis| layout.dim(axis) == Some(0)) {
            Some(axis) => Err(TensorError::Empty(layout, axis)),
            None => Ok(()),
        }
    }
}

impl<D: Device + Clone, T: Number> Tensor<D, T> {
    /// # Sum (`reduce_sum`)
    /// Computes the sum of the tensor's elements along the given axes.
    ///
    /// ## Arguments
    /// * `axis` - Axis or axes to sum over; `..` sums over all axes. Negative axes count from the last one.
    /// * `keepdims` - Whether reduced axes are kept as modes of size `1`.
    ///
    /// ## Returns
    /// * `Result<Self, TensorError>` - The sums, or an error if an axis is out of range or repeated.
    #[inline]
    pub fn reduce_sum(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        self.reduce::<Sum>(&axis.into(), keepdims)
    }

    /// # Product (`reduce_prod`)
    /// Multiplies the tensor's elements along the given axes.
    ///
    /// The product kernel reduces one axis at a time, so several axes are reduced in
    /// ascending order, one after another.
    ///
    /// ## Arguments
    /// * `axis` - Axis or axes to multiply over; `..` multiplies over all axes.
    /// * `keepdims` - Whether reduced axes are kept as modes of size `1`.
    ///
    /// ## Returns
    /// * `Result<Self, TensorError>` - The products, or an error if an axis is out of range or repeated.
    #[inline]
    pub fn reduce_prod(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        self.reduce_each::<Prod>(&axis.into(), keepdims)
    }

    /// # Minimum (`reduce_min`)
    /// Computes the minimum of the tensor's elements along the given axes. NaN propagates.
    ///
    /// ## Arguments
    /// * `axis` - Axis or axes to take the minimum over; `..` means all axes.
    /// * `keepdims` - Whether reduced axes are kept as modes of size `1`.
    ///
    /// ## Returns
    /// * `Result<Self, TensorError>` - The minima, or an error if an axis is out of range,
    ///   repeated, or has no elements.
    #[inline]
    pub fn reduce_min(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        let axes = axis.into();
        self.check_nonempty(&axes)?;
        self.reduce_each::<Min>(&axes, keepdims)
    }

    /// # Maximum (`reduce_max`)
    /// Computes the maximum of the tensor's elements along the given axes. NaN propagates.
    ///
    /// ## Arguments
    /// * `axis` - Axis or axes to take the maximum over; `..` means all axes.
    /// * `keepdims` - Whether reduced axes are kept as modes of size `1`.
    ///
    /// ## Returns
    /// * `Result<Self, TensorError>` - The maxima, or an error if an axis is out of range,
    ///   repeated, or has no elements.
    #[doc(alias = "max")]
    #[inline]
    pub fn reduce_max(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        let axes = axis.into();
        self.check_nonempty(&axes)?;
        self.reduce_each::<Max>(&axes, keepdims)
    }
}

impl<D: Device + Clone, T: Float> Tensor<D, T> {
    /// # Mean (`reduce_mean`)
    /// Computes the arithmetic mean along the given axes. The mean over no elements is NaN.
    #[inline]
    pub fn reduce_mean(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        self.reduce::<Mean>(&axis.into(), keepdims)
    }

    /// # Variance (`reduce_var`)
    /// Computes the population variance (divided by `N`) along the given axes.
    #[inline]
    pub fn reduce_var(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        self.reduce::<Var>(&axis.into(), keepdims)
    }

    /// # Standard Deviation (`reduce_std`)
    /// The square root of [`reduce_var`](Self::reduce_var) over the same axes.
    #[inline]
    pub fn reduce_std(self, axis: impl Into<Axes>, keepdims: bool) -> Result<Self, TensorError> {
        Ok(self.reduce_var(axis, keepdims)?.sqrt())
    }

    /// Element-wise square root.
    #[inline]
    pub fn sqrt(self) -> Self {
        let phantom = PhantomData::<T>;
        let f = move |op| SqrtOp { op, phantom };
        let output = self.init_like();
        build_api_1(f, output, self)
    }
}

/// # Einstein Summation (`einsum`)
/// Sums the product of the operands' elements along the labels of a numpy-style `equation`,
/// e.g., `"ij,jk->ik"`.
///
/// The op runs on the device of the first operand; all operands must share it.
///
/// ## Returns
/// * `Result<Tensor<D, T>, TensorError>` - The contraction, or an error if the equation is
///   malformed or does not fit the operands.
pub fn einsum<D, T>(equation: &str, operands: &[Tensor<D, T>]) -> Result<Tensor<D, T>, TensorError>
where
    D: Device + Clone,
    T: Number,
{
    let [first, ..] = operands else {
        return Err(EinsumError::NoOperands.into());
    };
    let device = first.device();
    if operands.iter().any(|x| x.device().id() != device.id()) {
        return Err(TensorError::Device);
    }

    let equation: Equation = equation.parse()?;
    let shapes = operands.iter().map(|x| x.layout().shape()).collect_vec();
    let plan = Arc::new(equation.plan(&shapes)?);

    let mut output = Tensor::init(&device, plan.output.clone());
    let mut ops = operands
        .iter()
        .flat_map(|x| x.tape().ops.iter().cloned())
        .unique_by(|op| op.id())
        .collect_vec();

    let id = TensorOpId::new();
    let inputs = operands.iter().map(|x| x.ir()).collect();
    let op = EinsumOp::<T> {
        id,
        inputs,
        output: output.ir(),
        plan,
        phantom: PhantomData,
    };
    ops.push(Box::new(op));
    output.replace_ops(ops);

    Ok(output)
}
