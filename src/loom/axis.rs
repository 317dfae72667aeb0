use std::sync::Arc;

use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::tensor::TensorError;

/// Axes to reduce over. Negative axes count from the last mode.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axes {
    #[default]
    #[display("..")]
    All,
    #[display("{_0}")]
    One(isize),
    #[display("[{}]", _0.iter().format(", "))]
    Many(Arc<[isize]>),
}

impl From<std::ops::RangeFull> for Axes {
    #[inline]
    fn from(_: std::ops::RangeFull) -> Self {
        Self::All
    }
}

macro_rules! impl_from_axis {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Axes {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::One(value as isize)
                }
            }

            impl From<Vec<$ty>> for Axes {
                #[inline]
                fn from(value: Vec<$ty>) -> Self {
                    value.as_slice().into()
                }
            }

            impl From<&[$ty]> for Axes {
                #[inline]
                fn from(value: &[$ty]) -> Self {
                    Self::Many(value.iter().map(|&axis| axis as isize).collect())
                }
            }

            impl<const N: usize> From<[$ty; N]> for Axes {
                #[inline]
                fn from(value: [$ty; N]) -> Self {
                    value.as_slice().into()
                }
            }
        )+
    };
}

impl_from_axis!(isize, i32);

/// Maps a possibly negative `axis` into `0..dim`.
#[inline]
pub fn normalize(axis: isize, dim: usize) -> Result<usize, TensorError> {
    let signed = dim as isize;
    match axis {
        axis if (0..signed).contains(&axis) => Ok(axis as usize),
        axis if (-signed..0).contains(&axis) => Ok((signed + axis) as usize),
        axis => Err(TensorError::Axis(axis, dim)),
    }
}

impl Axes {
    /// Normalized, sorted and distinct axes of a tensor of `dim` modes.
    pub fn resolve(&self, dim: usize) -> Result<Vec<usize>, TensorError> {
        let axes = match self {
            Axes::All => return Ok((0..dim).collect()),
            Axes::One(axis) => vec![normalize(*axis, dim)?],
            Axes::Many(axes) => axes
                .iter()
                .map(|&axis| normalize(axis, dim))
                .collect::<Result<_, _>>()?,
        };
        let axes = axes.into_iter().sorted_unstable().collect_vec();
        match axes.iter().tuple_windows().find(|(x, y)| x == y) {
            Some((&axis, _)) => Err(TensorError::DuplicateAxis(axis)),
            None => Ok(axes),
        }
    }

    /// Single-axis steps that reduce the same axes as one multi-axis reduction would.
    ///
    /// Steps follow ascending axis order. Without `keepdims` every finished step removes a mode,
    /// so the `i`-th step's axis index is shifted down by `i`.
    pub fn collapse(&self, dim: usize, keepdims: bool) -> Result<Vec<usize>, TensorError> {
        let axes = self.resolve(dim)?;
        let steps = axes
            .into_iter()
            .enumerate()
            .map(|(index, axis)| if keepdims { axis } else { axis - index })
            .collect();
        Ok(steps)
    }
}
