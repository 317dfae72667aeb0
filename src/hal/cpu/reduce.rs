use itertools::Itertools;

use super::generate;
use crate::{
    hal::ops::{Max, Mean, Min, Prod, ReduceAxisOp, ReduceOp, Reducer, Sum, Var},
    loom::{
        device::{DeviceError, cpu::Backend},
        layout::{Layout, offsets},
        num::{Float, Number},
        ops::{BackendOp, TensorIr},
        platform::handle,
    },
};

/// How a reducer folds one lane of elements into a single value.
pub trait Fold<T>: Reducer {
    fn fold(lane: impl Iterator<Item = T>) -> T;
}

impl<T: Number> Fold<T> for Sum {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        lane.fold(T::zero(), T::add)
    }
}

impl<T: Number> Fold<T> for Prod {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        lane.fold(T::one(), T::mul)
    }
}

impl<T: Number> Fold<T> for Min {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        lane.reduce(T::minimum).unwrap_or_else(T::zero)
    }
}

impl<T: Number> Fold<T> for Max {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        lane.reduce(T::maximum).unwrap_or_else(T::zero)
    }
}

impl<T: Float> Fold<T> for Mean {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        let (sum, count) = lane.fold((0.0, 0usize), |(sum, count), x| (sum + x.to_f32(), count + 1));
        T::from_f32(sum / count as f32)
    }
}

impl<T: Float> Fold<T> for Var {
    #[inline]
    fn fold(lane: impl Iterator<Item = T>) -> T {
        let (_, m2, count) = lane.fold((0.0f32, 0.0f32, 0usize), |(mean, m2, count), x| {
            let x = x.to_f32();
            let count = count + 1;
            let delta = x - mean;
            let mean = mean + delta / count as f32;
            let m2 = m2 + delta * (x - mean);
            (mean, m2, count)
        });
        T::from_f32(m2 / count as f32)
    }
}

/// Folds every lane spanned by `axes`. Outputs follow the row-major order of the kept axes.
fn reduce<T: Number, R: Fold<T>>(x: &[T], layout: &Layout, axes: &[usize]) -> Vec<T> {
    let shape = layout.shape();
    let stride = layout.stride();
    let (reduced, kept): (Vec<_>, Vec<_>) = (0..layout.len()).partition(|axis| axes.contains(axis));
    let select = |modes: &[usize]| -> (Vec<usize>, Vec<usize>) {
        modes.iter().map(|&axis| (shape[axis], stride[axis])).unzip()
    };

    let (kept_shape, kept_stride) = select(&kept);
    let (reduced_shape, reduced_stride) = select(&reduced);
    let bases = offsets(&kept_shape, &kept_stride);
    let lane = offsets(&reduced_shape, &reduced_stride);

    generate(bases.len(), |index| {
        let base = bases[index];
        R::fold(lane.iter().map(|&offset| x[base + offset]))
    })
}

/// Folds along a single `axis`, viewing the input as `[outer, dim, inner]`.
fn reduce_axis<T: Number, R: Fold<T>>(x: &[T], layout: &Layout, axis: usize) -> Vec<T> {
    let shape = layout.shape();
    let dim = shape[axis];
    let inner = layout.stride()[axis];
    let outer: usize = shape[..axis].iter().product();

    generate(outer * inner, |index| {
        let start = (index / inner) * dim * inner + index % inner;
        R::fold(x.iter().skip(start).step_by(inner).take(dim).copied())
    })
}

impl<T: Number, R: Fold<T>> BackendOp<Backend> for ReduceOp<T, R> {
    async fn execute(&self, backend: &mut Backend, io: Vec<TensorIr>) -> Result<(), DeviceError> {
        let layout = io[0].layout.clone();
        let axes = self.axes.clone();
        let x = backend.read::<T>(io[0].id)?;
        let output = handle(move || reduce::<T, R>(&x, &layout, &axes)).await?;
        backend.write(io[1].id, &output);
        Ok(())
    }
}

impl<T: Number, R: Fold<T>> BackendOp<Backend> for ReduceAxisOp<T, R> {
    async fn execute(&self, backend: &mut Backend, io: Vec<TensorIr>) -> Result<(), DeviceError> {
        let layout = io[0].layout.clone();
        let axis = self.axis;
        let x = backend.read::<T>(io[0].id)?;
        let output = handle(move || reduce_axis::<T, R>(&x, &layout, axis)).await?;
        backend.write(io[1].id, &output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use half::f16;
    use itertools::Itertools;

    use super::{Fold, reduce, reduce_axis};
    use crate::{
        hal::ops::{Max, Mean, Min, Prod, Sum, Var},
        loom::{device::CpuBuilder, layout::Layout, tensor::Tensor},
    };

    /// Reference reduction: walks every input index and pushes the element into its output lane.
    fn naive<R: Fold<f32>>(x: &[f32], shape: &[usize], axes: &[usize], keepdims: bool) -> Vec<f32> {
        let output = Layout::from_shape(shape.to_vec()).reduce(axes, keepdims);
        let stride = output.stride();
        let mut lanes = vec![vec![]; output.size()];

        let indices = shape.iter().map(|&dim| 0..dim).multi_cartesian_product();
        for (&value, index) in x.iter().zip_eq(indices) {
            let index = index
                .into_iter()
                .enumerate()
                .filter_map(|(axis, index)| match (axes.contains(&axis), keepdims) {
                    (false, _) => Some(index),
                    (true, true) => Some(0),
                    (true, false) => None,
                })
                .collect_vec();
            let position: usize = index.iter().zip_eq(stride.iter()).map(|(x, y)| x * y).sum();
            lanes[position].push(value);
        }
        lanes.into_iter().map(|lane| R::fold(lane.into_iter())).collect()
    }

    /// Powers of two, so that products stay exact in any order.
    fn random(size: usize) -> Vec<f32> {
        const VALUES: [f32; 6] = [-2.0, -1.0, -0.5, 0.5, 1.0, 2.0];
        (0..size).map(|_| VALUES[fastrand::usize(..VALUES.len())]).collect()
    }

    fn assert_close(x: &[f32], y: &[f32]) {
        for (x, y) in x.iter().zip_eq(y) {
            assert!((x - y).abs() <= 1e-4 * (1.0 + y.abs()), "{x} != {y}");
        }
    }

    #[test]
    fn test_fold() {
        assert_eq!(<Sum as Fold<u8>>::fold([200u8, 100].into_iter()), 44);
        assert_eq!(<Prod as Fold<f32>>::fold(std::iter::empty()), 1.0);
        assert_eq!(<Min as Fold<i32>>::fold([3, -2, 5].into_iter()), -2);
        assert_eq!(<Max as Fold<f32>>::fold([3.0, 7.5, -1.0].into_iter()), 7.5);
        assert!(<Max as Fold<f32>>::fold([3.0, f32::NAN, 7.0].into_iter()).is_nan());
        assert_eq!(<Mean as Fold<f32>>::fold([1.0, 2.0, 6.0].into_iter()), 3.0);
        assert!(<Mean as Fold<f32>>::fold(std::iter::empty()).is_nan());
        let x = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((<Var as Fold<f32>>::fold(x.into_iter()) - 4.0).abs() < 1e-5);
        assert_eq!(<Var as Fold<f32>>::fold([3.0].into_iter()), 0.0);
        let x = [f16::ONE, f16::ONE];
        assert_eq!(<Sum as Fold<f16>>::fold(x.into_iter()), f16::from_f32(2.0));
    }

    #[test]
    fn test_kernels() {
        let shape = [2, 3, 4];
        let layout = Layout::from_shape(shape);
        let x = (0..24).map(|x| x as f32).collect_vec();

        for axes in [vec![], vec![0], vec![1], vec![2], vec![0, 2], vec![1, 2], vec![0, 1, 2]] {
            let expected = naive::<Sum>(&x, &shape, &axes, false);
            assert_eq!(reduce::<f32, Sum>(&x, &layout, &axes), expected);
        }
        for axis in 0..3 {
            let expected = naive::<Max>(&x, &shape, &[axis], false);
            assert_eq!(reduce_axis::<f32, Max>(&x, &layout, axis), expected);
        }

        let empty = Layout::from_shape([2, 0, 3]);
        assert_eq!(reduce::<f32, Sum>(&[], &empty, &[1]), vec![0.0; 6]);
        assert_eq!(reduce_axis::<f32, Prod>(&[], &empty, 1), vec![1.0; 6]);
        assert!(reduce_axis::<f32, Prod>(&[], &empty, 2).is_empty());
    }

    #[tokio::test]
    async fn test_reduce_random() -> Result<(), Box<dyn Error>> {
        let cpu = CpuBuilder::new().add_default_ops().build().await;

        let shape = [3, 4, 5, 2];
        let x = random(shape.iter().product());
        let tensor = Tensor::create(&cpu, shape, x.clone())?;

        let cases: [(&[isize], &[usize]); 5] = [
            (&[0], &[0]),
            (&[-1, 1], &[1, 3]),
            (&[2, 0, -1], &[0, 2, 3]),
            (&[0, 1, 2, 3], &[0, 1, 2, 3]),
            (&[], &[]),
        ];
        for (axis, axes) in cases {
            for keepdims in [false, true] {
                let expected_shape = Layout::from_shape(shape).reduce(axes, keepdims).shape();

                let output = tensor.clone().reduce_sum(axis, keepdims)?;
                assert_eq!(output.layout().shape(), expected_shape);
                let expected = naive::<Sum>(&x, &shape, axes, keepdims);
                assert_close(&output.back().await?, &expected);

                let output = tensor.clone().reduce_prod(axis, keepdims)?;
                assert_eq!(output.layout().shape(), expected_shape);
                let expected = naive::<Prod>(&x, &shape, axes, keepdims);
                assert_close(&output.back().await?, &expected);

                let output = tensor.clone().reduce_min(axis, keepdims)?;
                assert_eq!(output.layout().shape(), expected_shape);
                let expected = naive::<Min>(&x, &shape, axes, keepdims);
                assert_eq!(output.back().await?.to_vec(), expected);

                let output = tensor.clone().reduce_max(axis, keepdims)?;
                assert_eq!(output.layout().shape(), expected_shape);
                let expected = naive::<Max>(&x, &shape, axes, keepdims);
                assert_eq!(output.back().await?.to_vec(), expected);

                let output = tensor.clone().reduce_mean(axis, keepdims)?;
                let expected = naive::<Mean>(&x, &shape, axes, keepdims);
                assert_close(&output.back().await?, &expected);

                let output = tensor.clone().reduce_var(axis, keepdims)?;
                let expected = naive::<Var>(&x, &shape, axes, keepdims);
                assert_close(&output.back().await?, &expected);

                let output = tensor.clone().reduce_std(axis, keepdims)?;
                assert_eq!(output.layout().shape(), expected_shape);
                let expected = expected.iter().map(|x| x.sqrt()).collect_vec();
                assert_close(&output.back().await?, &expected);
            }
        }
        Ok(())
    }
}
