use bytemuck::Pod;
use derive_more::Display;
use half::f16;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    F32,
    F16,
    U8,
    U16,
    U32,
    I32,
}

impl DataType {
    /// Returns the size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F16 => 2,
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 => 4,
            DataType::I32 => 4,
        }
    }
}

pub trait Zero {
    fn zero() -> Self;
}

pub trait One {
    fn one() -> Self;
}

macro_rules! impl_zero_one {
    ($ty:ty, $zero:expr, $one:expr) => {
        impl Zero for $ty {
            #[inline]
            fn zero() -> Self {
                $zero
            }
        }

        impl One for $ty {
            #[inline]
            fn one() -> Self {
                $one
            }
        }
    };
}

impl_zero_one!(f32, 0.0, 1.0);
impl_zero_one!(f16, f16::ZERO, f16::ONE);
impl_zero_one!(u8, 0, 1);
impl_zero_one!(u16, 0, 1);
impl_zero_one!(u32, 0, 1);
impl_zero_one!(i32, 0, 1);

pub trait Scalar: Sized + Pod + Zero + One + Send + Sync + std::fmt::Debug + sealed::Sealed {
    const DATA_TYPE: DataType;
}

impl Scalar for f32 {
    const DATA_TYPE: DataType = DataType::F32;
}

impl Scalar for f16 {
    const DATA_TYPE: DataType = DataType::F16;
}

impl Scalar for u8 {
    const DATA_TYPE: DataType = DataType::U8;
}

impl Scalar for u16 {
    const DATA_TYPE: DataType = DataType::U16;
}

impl Scalar for u32 {
    const DATA_TYPE: DataType = DataType::U32;
}

impl Scalar for i32 {
    const DATA_TYPE: DataType = DataType::I32;
}

/// Scalars that can be summed, multiplied and compared.
pub trait Number: Scalar + PartialOrd {
    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;

    /// The smaller of two values. NaN wins.
    #[inline]
    fn minimum(self, rhs: Self) -> Self {
        if is_nan(&self) {
            self
        } else if is_nan(&rhs) || rhs < self {
            rhs
        } else {
            self
        }
    }

    /// The larger of two values. NaN wins.
    #[inline]
    fn maximum(self, rhs: Self) -> Self {
        if is_nan(&self) {
            self
        } else if is_nan(&rhs) || rhs > self {
            rhs
        } else {
            self
        }
    }
}

#[inline]
fn is_nan<T: PartialOrd>(x: &T) -> bool {
    x.partial_cmp(x).is_none()
}

macro_rules! impl_number_int {
    ($($ty:ty),+) => {
        $(
            impl Number for $ty {
                #[inline]
                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                #[inline]
                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }
            }
        )+
    };
}

macro_rules! impl_number_float {
    ($($ty:ty),+) => {
        $(
            impl Number for $ty {
                #[inline]
                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }

                #[inline]
                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }
            }
        )+
    };
}

impl_number_int!(u8, u16, u32, i32);
impl_number_float!(f32, f16);

pub trait Float: Number {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;

    #[inline]
    fn sqrt(self) -> Self {
        Self::from_f32(self.to_f32().sqrt())
    }
}

impl Float for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Float for f16 {
    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }
}

mod sealed {
    use half::f16;

    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f16 {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{DataType, Float, Number, Scalar};

    #[test]
    fn test_nan_propagates() {
        assert!(f32::NAN.minimum(1.0).is_nan());
        assert!(1.0f32.minimum(f32::NAN).is_nan());
        assert!(f32::NAN.maximum(1.0).is_nan());
        assert!(1.0f32.maximum(f32::NAN).is_nan());
        assert_eq!(2.0f32.minimum(-3.0), -3.0);
        assert_eq!(2.0f32.maximum(-3.0), 2.0);
    }

    #[test]
    fn test_integers_wrap() {
        assert_eq!(250u8.add(10), 4);
        assert_eq!(16u8.mul(16), 0);
        assert_eq!(i32::MAX.add(1), i32::MIN);
        assert_eq!(7u32.minimum(3), 3);
    }

    #[test]
    fn test_f16_roundtrip() {
        let x = f16::from_f32(6.25);
        assert_eq!(Float::to_f32(x), 6.25);
        assert_eq!(Float::sqrt(x), f16::from_f32(2.5));
        assert_eq!(f16::DATA_TYPE, DataType::F16);
        assert_eq!(f16::DATA_TYPE.size(), size_of::<f16>());
    }
}
