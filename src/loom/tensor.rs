use std::{marker::PhantomData, sync::Arc};

use derive_more::{Deref, DerefMut, Display};
use thiserror::Error;

use super::{
    device::Device,
    layout::{IntoLayout, Layout},
    num::{DataType, Scalar},
    ops::{TensorIr, TensorOp},
};
use crate::hal::einsum::EinsumError;

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("tensor type error: data type {0} mismatches {1}")]
    Type(DataType, DataType),
    #[error("tensor creation error: layout {0}'s size not match data len {1}")]
    Create(Layout, usize),
    #[error("tensor reshape error: layout {0}'s size not match layout {1}'s")]
    Reshape(Layout, Layout),
    #[error("tensor axis error: axis {0} is out of range for {1} modes")]
    Axis(isize, usize),
    #[error("tensor axis error: axis {0} is repeated")]
    DuplicateAxis(usize),
    #[error("tensor reduction error: axis {1} of layout {0} is empty")]
    Empty(Layout, usize),
    #[error("tensor device error: operands live on different devices")]
    Device,
    #[error("tensor einsum error: {0}")]
    Einsum(#[from] EinsumError),
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct TensorId(uid::Id<TensorId>);

impl TensorId {
    #[inline]
    pub fn new() -> Self {
        Self(uid::Id::new())
    }
}

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Ops recorded to produce the tensor `id`, in execution order.
#[derive(Debug, Clone)]
pub struct TensorTape {
    pub id: TensorId,
    pub ops: Vec<Box<dyn TensorOp>>,
}

#[derive(Debug, Clone)]
pub struct TensorUntyped<D> {
    device: D,
    layout: Layout,
    r#type: DataType,
    id: TensorId,
    tape: Arc<TensorTape>,
}

impl<D: Device> TensorUntyped<D> {
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout.clone()
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn id(&self) -> TensorId {
        self.id
    }

    #[inline]
    pub fn tape(&self) -> &TensorTape {
        &self.tape
    }

    #[inline]
    pub fn tape_mut(&mut self) -> &mut TensorTape {
        Arc::make_mut(&mut self.tape)
    }

    #[inline]
    pub fn ir(&self) -> TensorIr {
        let layout = self.layout();
        let r#type = self.data_type();
        let id = self.id.get();
        TensorIr { layout, r#type, id }
    }

    /// Converts the untyped type to a typed one. Returns error if type mismatches.
    #[inline]
    pub fn try_into_typed<T: Scalar>(self) -> Result<Tensor<D, T>, TensorError> {
        if self.r#type != T::DATA_TYPE {
            return Err(TensorError::Type(self.r#type, T::DATA_TYPE));
        }
        Ok(Tensor {
            tensor: self,
            phantom: PhantomData,
        })
    }
}

impl<D: Device + Clone> TensorUntyped<D> {
    #[inline]
    pub fn device(&self) -> D {
        self.device.clone()
    }
}

/// A statically typed tensor. Good to fit into typed APIs.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct Tensor<D, T> {
    #[deref]
    #[deref_mut]
    tensor: TensorUntyped<D>,
    phantom: PhantomData<T>,
}

impl<D: Device, T: Scalar> Tensor<D, T> {
    /// Transform the tensor into an untyped one.
    #[inline]
    pub fn into_untyped(self) -> TensorUntyped<D> {
        self.tensor
    }

    /// Reshape the tensor, leaving the underlying data untouched.
    #[inline]
    pub fn reshape(mut self, layout: impl IntoLayout) -> Result<Self, TensorError> {
        let layout = layout.into_layout();
        if self.layout.size() != layout.size() {
            return Err(TensorError::Reshape(self.layout(), layout));
        }
        self.tensor.layout = layout;
        Ok(self)
    }
}

impl<D: Device + Clone, T: Scalar> Tensor<D, T> {
    /// Create a tensor handle with an empty tape. Its contents are produced by whatever op
    /// gets recorded onto it afterwards.
    #[inline]
    pub fn init(device: &D, layout: impl IntoLayout) -> Self {
        let device = device.clone();
        let layout = layout.into_layout();
        let r#type = T::DATA_TYPE;
        let id = TensorId::new();
        let ops = vec![];
        let tape = Arc::new(TensorTape { id, ops });
        let tensor = TensorUntyped {
            device,
            layout,
            r#type,
            id,
            tape,
        };
        let phantom = PhantomData;
        Self { tensor, phantom }
    }

    /// Create a tensor handle with the current device and layout.
    #[inline]
    pub fn init_like(&self) -> Self {
        Self::init(&self.device, self.layout())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use half::f16;

    use super::{Tensor, TensorError};
    use crate::loom::{device::CpuBuilder, layout::Layout};

    #[tokio::test]
    async fn test_reshape() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let x = Tensor::create(&cpu, [3, 4], data.clone())?;
        let y = x.clone().reshape([2, 2, 3])?;
        assert_eq!(y.layout(), Layout::from_shape([2, 2, 3]));
        assert_eq!(y.back().await?.to_vec(), data);

        assert!(matches!(x.reshape([5, 2]), Err(TensorError::Reshape(_, _))));
        Ok(())
    }

    #[tokio::test]
    async fn test_typed() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().build().await;

        let x = Tensor::<_, f32>::init(&cpu, [4]);
        let x = x.into_untyped();
        assert!(matches!(
            x.clone().try_into_typed::<f16>(),
            Err(TensorError::Type(_, _))
        ));
        assert!(x.try_into_typed::<f32>().is_ok());
        Ok(())
    }
}
