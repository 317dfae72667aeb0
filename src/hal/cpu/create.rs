use super::generate;
use crate::{
    hal::ops::{CreateOp, SqrtOp},
    loom::{
        device::{DeviceError, cpu::Backend},
        num::{Float, Scalar},
        ops::{BackendOp, TensorIr},
        platform::handle,
    },
};

impl<T: Scalar> BackendOp<Backend> for CreateOp<T> {
    async fn execute(&self, backend: &mut Backend, io: Vec<TensorIr>) -> Result<(), DeviceError> {
        backend.write(io[0].id, &self.contents);
        Ok(())
    }
}

impl<T: Float> BackendOp<Backend> for SqrtOp<T> {
    async fn execute(&self, backend: &mut Backend, io: Vec<TensorIr>) -> Result<(), DeviceError> {
        let x = backend.read::<T>(io[0].id)?;
        let output = handle(move || generate(x.len(), |index| x[index].sqrt())).await?;
        backend.write(io[1].id, &output);
        Ok(())
    }
}
