use std::{any::TypeId, sync::Arc};

use derive_more::{Deref, Display};
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use super::{
    ops::{TensorIr, TensorOp},
    platform::BoxFuture,
    tensor::{TensorId, TensorTape},
};

pub use cpu::{Cpu, CpuBuilder};

pub mod cpu;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct DeviceId(uid::Id<DeviceId>);

impl DeviceId {
    #[inline]
    pub fn new() -> Self {
        Self(uid::Id::new())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device error: buffer of tensor {0} is not found")]
    Tensor(usize),
    #[error("device error: op {0} is not supported")]
    Op(&'static str),
    #[error("device error: failed to receive from device: {0}")]
    Recv(#[from] flume::RecvError),
    #[error("device error: blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Bytes read back from a device.
#[derive(Debug, Clone)]
pub struct BackData {
    pub id: TensorId,
    pub data: Arc<[u8]>,
}

#[derive(Debug)]
pub enum DeviceEvent {
    /// Run every op on the tape that has not been committed yet.
    Execute {
        tape: TensorTape,
        sender: flume::Sender<Result<TensorId, DeviceError>>,
    },
    /// Run the tape and send back the contents of its output.
    Back {
        tape: TensorTape,
        sender: flume::Sender<Result<BackData, DeviceError>>,
    },
    /// Drop every buffer and committed op that none of the `retain` tapes refer to.
    Cleanup { retain: Vec<TensorTape> },
}

/// A handle to hardware that runs tensor tapes.
pub trait Device {
    fn id(&self) -> DeviceId;
    fn execute(&self, event: DeviceEvent);

    /// Frees everything on the device that the tapes of `retain` do not need.
    /// Tensors dropped this way are recomputed from their tapes when read again.
    #[inline]
    fn cleanup(&self, retain: Vec<TensorTape>) {
        self.execute(DeviceEvent::Cleanup { retain })
    }
}

/// Owns the buffers of a device and runs ops on them.
pub trait Backend: Send {
    /// Store the raw contents of a tensor.
    fn store(&mut self, id: usize, data: Arc<[u8]>);
    /// Fetch the raw contents of a tensor.
    fn fetch(&self, id: usize) -> Result<Arc<[u8]>, DeviceError>;
}

type OpFn<B> =
    for<'a> fn(&'a mut B, &'a dyn TensorOp, Vec<TensorIr>) -> BoxFuture<'a, Result<(), DeviceError>>;

/// Maps each op type to the function that executes it.
pub type OpVTable<B> = HashMap<TypeId, OpFn<B>>;

#[cfg(test)]
mod tests {
    use std::error::Error;

    use itertools::Itertools;

    use super::{CpuBuilder, Device, DeviceError, DeviceEvent};
    use crate::{
        hal::ops::CreateOp,
        loom::tensor::{Tensor, TensorTape},
    };

    #[tokio::test]
    async fn test_missing_op() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_op::<CreateOp<f32>>().build().await;

        let data = (0..6).map(|x| x as f32).collect_vec();
        let x = Tensor::create(&cpu, [2, 3], data.clone())?;
        assert_eq!(x.clone().back().await?.to_vec(), data);

        let x = x.reduce_sum(.., false)?;
        assert!(matches!(x.back().await, Err(DeviceError::Op(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_buffer() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let x = Tensor::<_, f32>::init(&cpu, [2, 3]);
        assert!(matches!(x.back().await, Err(DeviceError::Tensor(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_execute() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let x = Tensor::create(&cpu, [4], vec![1u32, 2, 3, 4])?;
        let y = x.reduce_sum(0, false)?;
        assert_eq!(y.execute().await?, y.id());
        // ops committed by the previous run are skipped
        assert_eq!(y.back().await?.to_vec(), vec![10]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        // reads the buffer of `id` without running anything
        let fetch = |id| {
            let (sender, receiver) = flume::bounded(0);
            let tape = TensorTape { id, ops: vec![] };
            cpu.execute(DeviceEvent::Back { tape, sender });
            receiver
        };

        let x = Tensor::create(&cpu, [2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
        let y = x.clone().reduce_sum(0, false)?;
        let z = Tensor::create(&cpu, [3], vec![5u8, 6, 7])?;
        y.execute().await?;
        z.execute().await?;
        assert!(fetch(z.id()).recv_async().await?.is_ok());

        cpu.cleanup(vec![y.tape().clone()]);
        assert!(matches!(
            fetch(z.id()).recv_async().await?,
            Err(DeviceError::Tensor(_))
        ));
        assert!(fetch(x.id()).recv_async().await?.is_ok());
        assert_eq!(fetch(y.id()).recv_async().await?.map(|data| data.id)?, y.id());

        // the pruned tensor is computed again from its tape
        assert_eq!(z.back().await?.to_vec(), vec![5, 6, 7]);
        Ok(())
    }
}
