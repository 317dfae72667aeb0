use std::any::Any;

use derive_more::{Deref, Display};
use dyn_clone::DynClone;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{device::DeviceError, layout::Layout, num::DataType};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct TensorOpId(uid::Id<TensorOpId>);

impl TensorOpId {
    #[inline]
    pub fn new() -> Self {
        Self(uid::Id::new())
    }
}

impl Default for TensorOpId {
    fn default() -> Self {
        Self::new()
    }
}

/// What an op knows about one of the tensors it reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorIr {
    pub layout: Layout,
    pub r#type: DataType,
    pub id: usize,
}

pub trait TensorOp: std::fmt::Debug + DynClone + Send + Sync {
    /// Unique id of this op instance.
    fn id(&self) -> TensorOpId;
    /// Input and output tensors, inputs first.
    fn io(&self) -> Vec<TensorIr>;
    /// The op as [`Any`], for downcasting to the concrete op type.
    fn as_any(&self) -> &dyn Any;

    #[inline]
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

dyn_clone::clone_trait_object!(TensorOp);

impl<'a> dyn TensorOp + 'a {
    #[inline]
    pub fn downcast_ref<Op: TensorOp + 'static>(&self) -> Option<&Op> {
        self.as_any().downcast_ref()
    }
}

/// Defines how a backend executes an op.
#[trait_variant::make(BackendOp: Send)]
pub trait LocalBackendOp<B> {
    async fn execute(&self, backend: &mut B, io: Vec<TensorIr>) -> Result<(), DeviceError>;
}

/// An op with `I` inputs and `O` outputs and no parameters of its own.
#[derive(Debug, Clone)]
pub struct InnerOp<const I: usize, const O: usize> {
    pub id: TensorOpId,
    pub inputs: [TensorIr; I],
    pub outputs: [TensorIr; O],
}

impl<const I: usize, const O: usize> InnerOp<I, O> {
    #[inline]
    pub fn new(inputs: [TensorIr; I], outputs: [TensorIr; O]) -> Self {
        let id = TensorOpId::new();
        Self {
            id,
            inputs,
            outputs,
        }
    }
}

impl<const I: usize, const O: usize> TensorOp for InnerOp<I, O> {
    #[inline]
    fn id(&self) -> TensorOpId {
        self.id
    }

    #[inline]
    fn io(&self) -> Vec<TensorIr> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .cloned()
            .collect()
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}
