//! Runtime support for code generated by ubogen.
//!
//! Generated structs implement [`Std140`] by writing their leaves in
//! buffer order and calling [`pad`] between them. Generated uniform
//! bindings forward values to a [`UniformSink`], which is the only part
//! that knows about the graphics API.
//!
//! Scalars are written little-endian. `bool` occupies a full 4-byte word
//! holding 0 or 1, as std140 requires.

use thiserror::Error;


mod sealed {
    pub trait Sealed {}
}

/// The scalar kinds a std140 buffer can hold.
pub trait Scalar: Copy + sealed::Sealed {
    const SIZE: usize;

    fn write_le(self, output: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_le(self, output: &mut Vec<u8>) {
                    output.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(i32, u32, f32, f64);

impl sealed::Sealed for bool {}

impl Scalar for bool {
    const SIZE: usize = 4;

    fn write_le(self, output: &mut Vec<u8>) {
        (self as u32).write_le(output);
    }

    fn read_le(bytes: &[u8]) -> Self {
        u32::read_le(bytes) != 0
    }
}

/// A value with a fixed std140 byte image.
pub trait Std140 {
    const STD140_SIZE: usize;

    /// Append exactly `STD140_SIZE` bytes to `output`.
    fn write_std140(&self, output: &mut Vec<u8>);

    fn to_std140_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(Self::STD140_SIZE);
        self.write_std140(&mut output);
        output
    }
}

macro_rules! impl_std140 {
    ($($ty:ty),*) => {
        $(
            impl Std140 for $ty {
                const STD140_SIZE: usize = <$ty as Scalar>::SIZE;

                fn write_std140(&self, output: &mut Vec<u8>) {
                    self.write_le(output);
                }
            }

            /// Vectors and matrix columns: elements are packed without padding.
            impl<const N: usize> Std140 for [$ty; N] {
                const STD140_SIZE: usize = <$ty as Scalar>::SIZE * N;

                fn write_std140(&self, output: &mut Vec<u8>) {
                    for element in self {
                        element.write_le(output);
                    }
                }
            }

            impl ReadStd140 for $ty {
                const SIZE: usize = <$ty as Scalar>::SIZE;

                fn read_std140(bytes: &[u8]) -> Self {
                    <$ty as Scalar>::read_le(bytes)
                }
            }

            impl<const N: usize> ReadStd140 for [$ty; N] {
                const SIZE: usize = <$ty as Scalar>::SIZE * N;

                fn read_std140(bytes: &[u8]) -> Self {
                    let size = <$ty as Scalar>::SIZE;
                    std::array::from_fn(|i| <$ty as Scalar>::read_le(&bytes[i * size..(i + 1) * size]))
                }
            }
        )*
    };
}

impl_std140!(bool, i32, u32, f32, f64);

/// Append `n` zero bytes.
pub fn pad(output: &mut Vec<u8>, n: usize) {
    output.resize(output.len() + n, 0);
}

pub fn std140_size<T: Std140>() -> usize {
    T::STD140_SIZE
}

/// A value [`Std140Reader`] can decode: a scalar or a vector of scalars.
pub trait ReadStd140: Sized {
    const SIZE: usize;

    fn read_std140(bytes: &[u8]) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("read of {size} bytes at offset {offset} runs past the end of a {len}-byte buffer")]
    OutOfBounds { offset: usize, size: usize, len: usize },
}

/// Reads leaves back out of a std140 buffer at known offsets.
pub struct Std140Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Std140Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Std140Reader { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn read_at<T: ReadStd140>(&self, offset: usize) -> Result<T, ReadError> {
        let end = offset
            .checked_add(<T as ReadStd140>::SIZE)
            .filter(|end| *end <= self.data.len())
            .ok_or(ReadError::OutOfBounds {
                offset,
                size: <T as ReadStd140>::SIZE,
                len: self.data.len(),
            })?;
        Ok(T::read_std140(&self.data[offset..end]))
    }

    /// Read at the current position and advance past the value.
    pub fn read<T: ReadStd140>(&mut self) -> Result<T, ReadError> {
        let value = self.read_at(self.pos)?;
        self.pos += <T as ReadStd140>::SIZE;
        Ok(value)
    }
}

/// A borrowed uniform value, flattened to the element slice the graphics
/// API expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Bool(&'a [bool]),
    Int(&'a [i32]),
    UInt(&'a [u32]),
    Float(&'a [f32]),
    Double(&'a [f64]),
    /// Column-major, `columns * rows` elements.
    FloatMatrix { columns: usize, rows: usize, data: &'a [f32] },
    DoubleMatrix { columns: usize, rows: usize, data: &'a [f64] },
}

impl UniformValue<'_> {
    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        match self {
            UniformValue::Bool(v) => v.len(),
            UniformValue::Int(v) => v.len(),
            UniformValue::UInt(v) => v.len(),
            UniformValue::Float(v) => v.len(),
            UniformValue::Double(v) => v.len(),
            UniformValue::FloatMatrix { data, .. } => data.len(),
            UniformValue::DoubleMatrix { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait AsUniform {
    fn as_uniform(&self) -> UniformValue<'_>;
}

macro_rules! impl_as_uniform {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl AsUniform for $ty {
                fn as_uniform(&self) -> UniformValue<'_> {
                    UniformValue::$variant(std::slice::from_ref(self))
                }
            }

            impl<const N: usize> AsUniform for [$ty; N] {
                fn as_uniform(&self) -> UniformValue<'_> {
                    UniformValue::$variant(&self[..])
                }
            }
        )*
    };
}

impl_as_uniform!(bool => Bool, i32 => Int, u32 => UInt, f32 => Float, f64 => Double);

impl<const R: usize, const C: usize> AsUniform for [[f32; R]; C] {
    fn as_uniform(&self) -> UniformValue<'_> {
        UniformValue::FloatMatrix {
            columns: C,
            rows: R,
            data: self.as_flattened(),
        }
    }
}

impl<const R: usize, const C: usize> AsUniform for [[f64; R]; C] {
    fn as_uniform(&self) -> UniformValue<'_> {
        UniformValue::DoubleMatrix {
            columns: C,
            rows: R,
            data: self.as_flattened(),
        }
    }
}

/// Destination of generated uniform setters.
///
/// `name` is the full uniform path as the shader sees it, including
/// `.field` and `[index]` parts for struct and array uniforms.
pub trait UniformSink {
    fn set_uniform(&mut self, name: &str, value: UniformValue<'_>);

    /// Upload the std140 bytes of a whole uniform block.
    fn set_uniform_block(&mut self, block: &str, bytes: &[u8]);
}

/// Raised by generated array setters before anything reaches the sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    #[error("index {index} is out of bounds for uniform {uniform}[{length}]")]
    Index {
        uniform: &'static str,
        index: usize,
        length: usize,
    },

    #[error("uniform {uniform} takes exactly {expected} values, got {actual}")]
    Length {
        uniform: &'static str,
        expected: usize,
        actual: usize,
    },
}
