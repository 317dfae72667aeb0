use std::sync::Arc;

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("({})", _0.iter().format(", "))]
pub struct Shape(Arc<[usize]>);

impl From<Vec<usize>> for Shape {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self(value.into())
    }
}

impl From<&[usize]> for Shape {
    #[inline]
    fn from(value: &[usize]) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.into())
    }
}

impl Shape {
    /// Number of elements covered by the shape.
    #[inline]
    pub fn size(&self) -> usize {
        self.iter().product()
    }

    /// Row-major strides of a contiguous buffer of this shape.
    pub fn contiguous_stride(&self) -> Shape {
        let mut stride = vec![1; self.len()];
        for index in (0..self.len().saturating_sub(1)).rev() {
            stride[index] = stride[index + 1] * self[index + 1];
        }
        stride.into()
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }
}

/// A row-major contiguous layout: a shape together with its strides.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{shape}:{stride}")]
pub struct Layout {
    shape: Shape,
    stride: Shape,
}

impl Layout {
    #[inline]
    pub fn from_shape(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let stride = shape.contiguous_stride();
        Self { shape, stride }
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape.clone()
    }

    #[inline]
    pub fn stride(&self) -> Shape {
        self.stride.clone()
    }

    /// Number of modes, i.e., the rank of the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    #[inline]
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.shape.get(axis).copied()
    }

    /// The layout left after reducing `axes`.
    /// Reduced axes become `1` if `keepdims`, and are removed otherwise.
    pub fn reduce(&self, axes: &[usize], keepdims: bool) -> Self {
        let shape = self
            .shape
            .iter()
            .enumerate()
            .filter_map(|(axis, &dim)| match (axes.contains(&axis), keepdims) {
                (false, _) => Some(dim),
                (true, true) => Some(1),
                (true, false) => None,
            })
            .collect_vec();
        Self::from_shape(shape)
    }
}

pub trait IntoLayout {
    fn into_layout(self) -> Layout;
}

impl IntoLayout for Layout {
    #[inline]
    fn into_layout(self) -> Layout {
        self
    }
}

macro_rules! impl_into_layout {
    ($($ty:ty),+) => {
        $(
            impl IntoLayout for $ty {
                #[inline]
                fn into_layout(self) -> Layout {
                    Layout::from_shape(self)
                }
            }
        )+
    };
}

impl_into_layout!(Shape, Vec<usize>, &[usize]);

impl<const N: usize> IntoLayout for [usize; N] {
    #[inline]
    fn into_layout(self) -> Layout {
        Layout::from_shape(self)
    }
}

/// Flat offsets of every index in `shape` walked in row-major order, given per-mode `stride`.
///
/// A zero extent yields no offsets; an empty shape yields the single offset `0`.
pub fn offsets(shape: &[usize], stride: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .zip_eq(stride.iter())
        .fold(vec![0], |bases, (&dim, &stride)| {
            bases
                .into_iter()
                .flat_map(|base| (0..dim).map(move |index| base + index * stride))
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::{Layout, offsets};

    #[test]
    fn test_contiguous_stride() {
        let layout = Layout::from_shape([2, 3, 4]);
        assert_eq!(layout.stride().to_vec(), vec![12, 4, 1]);
        assert_eq!(layout.size(), 24);
        assert_eq!(layout.to_string(), "(2, 3, 4):(12, 4, 1)");

        let scalar = Layout::from_shape([0usize; 0]);
        assert_eq!(scalar.size(), 1);
        assert!(scalar.is_empty());
    }

    #[test]
    fn test_reduce_layout() {
        let layout = Layout::from_shape([2, 3, 4]);
        assert_eq!(layout.reduce(&[0, 2], false), Layout::from_shape([3]));
        assert_eq!(layout.reduce(&[0, 2], true), Layout::from_shape([1, 3, 1]));
        assert_eq!(layout.reduce(&[], false), layout);
        assert_eq!(layout.reduce(&[0, 1, 2], false), Layout::from_shape([0usize; 0]));
    }

    #[test]
    fn test_offsets() {
        assert_eq!(offsets(&[2, 3], &[3, 1]), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(offsets(&[2, 2], &[1, 4]), vec![0, 4, 1, 5]);
        assert_eq!(offsets(&[], &[]), vec![0]);
        assert!(offsets(&[3, 0], &[1, 1]).is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_layout_serde() -> Result<(), serde_json::Error> {
        let layout = Layout::from_shape([4, 3]);
        let json = serde_json::to_string(&layout)?;
        assert_eq!(serde_json::from_str::<Layout>(&json)?, layout);
        Ok(())
    }
}
