use std::{any::TypeId, sync::Arc};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::{BackData, Device, DeviceError, DeviceEvent, DeviceId, OpVTable};
use crate::loom::{
    num::Scalar,
    ops::{BackendOp, TensorIr, TensorOp, TensorOpId},
    platform::{self, BoxFuture},
    tensor::{TensorId, TensorTape},
};

#[derive(Debug, Clone)]
pub struct Backend {
    /// Operators that the device is able to execute.
    ops: Arc<OpVTable<Self>>,
    /// Pool of CPU buffers.
    buffers: HashMap<usize, Arc<[u8]>>,
}

impl super::Backend for Backend {
    #[inline]
    fn store(&mut self, id: usize, data: Arc<[u8]>) {
        self.buffers.insert(id, data);
    }

    #[inline]
    fn fetch(&self, id: usize) -> Result<Arc<[u8]>, DeviceError> {
        self.buffers.get(&id).cloned().ok_or(DeviceError::Tensor(id))
    }
}

impl Backend {
    /// Read the contents of a tensor as typed elements.
    #[inline]
    pub fn read<T: Scalar>(&self, id: usize) -> Result<Vec<T>, DeviceError> {
        use super::Backend as _;
        let data = self.fetch(id)?;
        Ok(bytemuck::pod_collect_to_vec(&data))
    }

    /// Write typed elements as the contents of a tensor.
    #[inline]
    pub fn write<T: Scalar>(&mut self, id: usize, data: &[T]) {
        use super::Backend as _;
        let data: Arc<[u8]> = bytemuck::cast_slice(data).into();
        self.store(id, data);
    }

    /// Drops every buffer whose tensor id is not in `ids`.
    fn retain(&mut self, ids: &HashSet<usize>) {
        let count = self.buffers.len();
        self.buffers.retain(|id, _| ids.contains(id));
        log::trace!("cleanup dropped {} buffers", count - self.buffers.len());
    }

    /// Runs one op through the function registered for its type.
    async fn execute(&mut self, op: &dyn TensorOp) -> Result<(), DeviceError> {
        let id = op.as_any().type_id();
        let Some(&f) = self.ops.get(&id) else {
            log::error!("unable to execute op of type {}", op.name());
            return Err(DeviceError::Op(op.name()));
        };
        log::trace!("execute {}", op.name());
        f(self, op, op.io()).await
    }

    /// Runs all uncommitted ops on the tape in order. Returns the id of the tape's output.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(tape = %tape.id)))]
    async fn execute_tape(
        &mut self,
        commit: &mut HashSet<TensorOpId>,
        tape: &TensorTape,
    ) -> Result<TensorId, DeviceError> {
        for op in tape.ops.iter() {
            if commit.contains(&op.id()) {
                continue;
            }
            self.execute(op.as_ref()).await?;
            commit.insert(op.id());
        }
        Ok(tape.id)
    }
}

#[derive(Debug, Clone)]
pub struct Cpu {
    /// The unique identifier of the device.
    id: DeviceId,
    /// Sends events to the backend.
    sender: flume::Sender<DeviceEvent>,
}

impl Device for Cpu {
    #[inline]
    fn id(&self) -> DeviceId {
        self.id
    }

    #[inline]
    fn execute(&self, event: DeviceEvent) {
        _ = self.sender.send(event)
    }
}

#[derive(Debug, Default, Clone)]
pub struct CpuBuilder {
    pub ops: OpVTable<Backend>,
}

impl CpuBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the backend task and returns a handle to it.
    /// Must be called within a tokio runtime.
    pub async fn build(self) -> Cpu {
        let ops = Arc::new(self.ops);
        let buffers = HashMap::default();

        let (sender, receiver) = flume::unbounded();
        let backend = Backend { ops, buffers };
        let id = DeviceId::new();
        platform::spawn(serve(id, backend, receiver));

        Cpu { id, sender }
    }

    /// Registers the kernel of `Op`.
    pub fn add_op<Op: TensorOp + BackendOp<Backend> + 'static>(mut self) -> Self {
        let id = TypeId::of::<Op>();
        self.ops.insert(id, execute_op::<Op>);
        self
    }
}

fn execute_op<'a, Op>(
    backend: &'a mut Backend,
    op: &'a dyn TensorOp,
    io: Vec<TensorIr>,
) -> BoxFuture<'a, Result<(), DeviceError>>
where
    Op: TensorOp + BackendOp<Backend> + 'static,
{
    Box::pin(async move {
        match op.downcast_ref::<Op>() {
            Some(op) => op.execute(backend, io).await,
            None => Err(DeviceError::Op(op.name())),
        }
    })
}

async fn serve(id: DeviceId, mut backend: Backend, receiver: flume::Receiver<DeviceEvent>) {
    use super::Backend as _;

    log::debug!("cpu device {id} started");

    let mut commit = HashSet::default();

    while let Ok(event) = receiver.recv_async().await {
        match event {
            DeviceEvent::Execute { tape, sender } => {
                let id = backend.execute_tape(&mut commit, &tape).await;
                _ = sender.send_async(id).await
            }
            DeviceEvent::Back { tape, sender } => {
                let data = match backend.execute_tape(&mut commit, &tape).await {
                    Ok(id) => backend.fetch(id.get()).map(|data| BackData { id, data }),
                    Err(err) => Err(err),
                };
                _ = sender.send_async(data).await
            }
            DeviceEvent::Cleanup { retain } => {
                // keep the outputs of retained tapes and every tensor their ops touch
                let ids: HashSet<_> = retain
                    .iter()
                    .map(|tape| tape.id.get())
                    .chain(
                        retain
                            .iter()
                            .flat_map(|tape| tape.ops.iter())
                            .flat_map(|op| op.io())
                            .map(|ir| ir.id),
                    )
                    .collect();
                backend.retain(&ids);

                // forget committed ops unless retained
                let ops: HashSet<_> = retain
                    .iter()
                    .flat_map(|tape| tape.ops.iter().map(|op| op.id()))
                    .collect();
                commit.retain(|id| ops.contains(id));
            }
        }
    }

    log::debug!("cpu device {id} stopped");
}
