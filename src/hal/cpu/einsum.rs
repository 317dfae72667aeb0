use itertools::Itertools;

use super::generate;
use crate::{
    hal::{einsum::EinsumPlan, ops::EinsumOp},
    loom::{
        device::{DeviceError, cpu::Backend},
        num::Number,
        ops::{BackendOp, TensorIr},
        platform::handle,
    },
};

/// Sums, at every output index, the products of the operands over all contracted indices.
fn contract<T: Number>(inputs: &[Vec<T>], plan: &EinsumPlan) -> Vec<T> {
    let outputs = plan
        .operands
        .iter()
        .map(|operand| operand.output_offsets(plan))
        .collect_vec();
    let contracted = plan
        .operands
        .iter()
        .map(|operand| operand.contracted_offsets(plan))
        .collect_vec();
    let size = plan.contracted.size();

    generate(plan.output.size(), |index| {
        (0..size)
            .map(|k| {
                inputs
                    .iter()
                    .zip_eq(outputs.iter())
                    .zip_eq(contracted.iter())
                    .map(|((x, output), reduced)| x[output[index] + reduced[k]])
                    .fold(T::one(), T::mul)
            })
            .fold(T::zero(), T::add)
    })
}

impl<T: Number> BackendOp<Backend> for EinsumOp<T> {
    async fn execute(&self, backend: &mut Backend, io: Vec<TensorIr>) -> Result<(), DeviceError> {
        let (inputs, output) = io.split_at(self.inputs.len());
        let inputs = inputs
            .iter()
            .map(|input| backend.read::<T>(input.id))
            .collect::<Result<Vec<_>, _>>()?;
        let plan = self.plan.clone();
        let data = handle(move || contract(&inputs, &plan)).await?;
        backend.write(output[0].id, &data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use itertools::Itertools;

    use crate::{
        hal::{einsum::EinsumError, frontend::einsum},
        loom::{
            device::{Cpu, CpuBuilder},
            tensor::{Tensor, TensorError},
        },
    };

    #[tokio::test]
    async fn test_matmul() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let (m, k, n) = (3, 5, 4);
        let a = (0..m * k).map(|_| fastrand::i32(-5..5)).collect_vec();
        let b = (0..k * n).map(|_| fastrand::i32(-5..5)).collect_vec();
        let expected = (0..m)
            .cartesian_product(0..n)
            .map(|(i, j)| (0..k).map(|l| a[i * k + l] * b[l * n + j]).sum::<i32>())
            .collect_vec();

        let x = Tensor::create(&cpu, [m, k], a)?;
        let y = Tensor::create(&cpu, [k, n], b)?;
        let z = einsum("ij,jk->ik", &[x.clone(), y.clone()])?;
        assert_eq!(z.layout().shape().to_vec(), vec![m, n]);
        assert_eq!(z.back().await?.to_vec(), expected);

        let z = einsum("ij,jk", &[x, y])?;
        assert_eq!(z.back().await?.to_vec(), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_chain() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        // a three-operand contraction writes to the buffer after all of its inputs
        let x = Tensor::create(&cpu, [1, 2], vec![1i32, 2])?;
        let y = Tensor::create(&cpu, [2, 2], vec![1i32, 0, 0, 3])?;
        let z = Tensor::create(&cpu, [2, 1], vec![4i32, 5])?;
        let w = einsum("ij,jk,kl->il", &[x, y, z])?;
        assert_eq!(w.layout().shape().to_vec(), vec![1, 1]);
        assert_eq!(w.back().await?.to_vec(), vec![34]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unary() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let data = (0..9).map(|x| x as f32).collect_vec();
        let x = Tensor::create(&cpu, [3, 3], data)?;

        let trace = einsum("ii", &[x.clone()])?;
        assert_eq!(trace.back().await?.to_vec(), vec![12.0]);

        let diagonal = einsum("ii->i", &[x.clone()])?;
        assert_eq!(diagonal.back().await?.to_vec(), vec![0.0, 4.0, 8.0]);

        let transpose = einsum("ij->ji", &[x.clone()])?;
        let expected = vec![0.0, 3.0, 6.0, 1.0, 4.0, 7.0, 2.0, 5.0, 8.0];
        assert_eq!(transpose.back().await?.to_vec(), expected);

        let rows = einsum("ij->i", &[x.clone()])?;
        let expected = x.reduce_sum(-1, false)?.back().await?;
        assert_eq!(rows.back().await?, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_broadcast() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        // batched outer product with a broadcast batch mode
        let x = Tensor::create(&cpu, [2, 2], vec![1u32, 2, 3, 4])?;
        let y = Tensor::create(&cpu, [1, 3], vec![1u32, 10, 100])?;
        let z = einsum("...i,...j->...ij", &[x, y])?;
        assert_eq!(z.layout().shape().to_vec(), vec![2, 2, 3]);
        let expected = vec![1, 10, 100, 2, 20, 200, 3, 30, 300, 4, 40, 400];
        assert_eq!(z.back().await?.to_vec(), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;
        let other = CpuBuilder::new().add_default_ops().build().await;

        let x = Tensor::create(&cpu, [2, 3], vec![0.0f32; 6])?;
        let y = Tensor::create(&other, [3], vec![0.0f32; 3])?;

        assert!(matches!(
            einsum::<Cpu, f32>("i", &[]),
            Err(TensorError::Einsum(EinsumError::NoOperands))
        ));
        assert!(matches!(
            einsum("ij,j->i", &[x.clone(), y]),
            Err(TensorError::Device)
        ));
        assert!(matches!(
            einsum("ijk->i", &[x.clone()]),
            Err(TensorError::Einsum(EinsumError::Rank(_, _)))
        ));
        assert!(einsum("ij,ij->i", &[x.clone(), x]).is_ok());
        Ok(())
    }
}
