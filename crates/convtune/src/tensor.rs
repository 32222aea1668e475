use crate::ConvolutionError;
use convtune_runtime::server::{Binding, Handle};
use core::fmt::Display;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DataType {
    /// 32 bit float.
    F32,
    /// 16 bit float.
    F16,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            DataType::F32 => core::mem::size_of::<f32>(),
            DataType::F16 => core::mem::size_of::<half::f16>(),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::F32 => f.write_str("f32"),
            DataType::F16 => f.write_str("f16"),
        }
    }
}

/// Host element types that map to a [DataType].
pub trait ConvElement: bytemuck::Pod + Send + Sync + 'static {
    /// The matching device data type.
    const DTYPE: DataType;
}

impl ConvElement for f32 {
    const DTYPE: DataType = DataType::F32;
}

impl ConvElement for half::f16 {
    const DTYPE: DataType = DataType::F16;
}

/// Shape, strides and element type of a tensor.
///
/// Dimensions follow the NCHW convention. Strides are in elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDescriptor {
    dtype: DataType,
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl TensorDescriptor {
    /// Create a descriptor with explicit strides.
    pub fn new(
        dtype: DataType,
        dims: impl Into<Vec<usize>>,
        strides: impl Into<Vec<usize>>,
    ) -> Result<Self, ConvolutionError> {
        let dims = dims.into();
        let strides = strides.into();

        if dims.len() != strides.len() {
            return Err(ConvolutionError::bad_parameter(format!(
                "{} dims but {} strides",
                dims.len(),
                strides.len()
            )));
        }

        Ok(Self {
            dtype,
            dims,
            strides,
        })
    }

    /// Create a descriptor with row major (packed) strides.
    pub fn new_packed(dtype: DataType, dims: impl Into<Vec<usize>>) -> Self {
        let dims = dims.into();
        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }

        Self {
            dtype,
            dims,
            strides,
        }
    }

    /// Create a packed descriptor for the element type `E`.
    pub fn packed<E: ConvElement>(dims: impl Into<Vec<usize>>) -> Self {
        Self::new_packed(E::DTYPE, dims)
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension lengths.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Strides in elements.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// The four NCHW dims, when the tensor has rank 4.
    pub fn nchw(&self) -> Option<[usize; 4]> {
        match self.dims.as_slice() {
            [n, c, h, w] => Some([*n, *c, *h, *w]),
            _ => None,
        }
    }

    /// The four NCHW strides, when the tensor has rank 4.
    pub fn nchw_strides(&self) -> Option<[usize; 4]> {
        match self.strides.as_slice() {
            [n, c, h, w] => Some([*n, *c, *h, *w]),
            _ => None,
        }
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of elements a buffer must hold to back this tensor, honouring the strides.
    pub fn element_space(&self) -> usize {
        if self.dims.iter().any(|dim| *dim == 0) {
            return 0;
        }

        1 + self
            .dims
            .iter()
            .zip(self.strides.iter())
            .map(|(dim, stride)| (dim - 1) * stride)
            .sum::<usize>()
    }

    /// Number of bytes a buffer must hold to back this tensor.
    pub fn byte_size(&self) -> usize {
        self.element_space() * self.dtype.size()
    }

    /// Whether the strides are the row major strides of the dims.
    pub fn is_packed(&self) -> bool {
        Self::new_packed(self.dtype, self.dims.clone()).strides == self.strides
    }

    /// Whether the innermost dimension is contiguous.
    pub fn is_unit_innermost(&self) -> bool {
        self.strides.last().is_none_or(|stride| *stride == 1)
    }
}

impl Display for TensorDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write_joined(f, &self.dims)?;
        f.write_str("s")?;
        write_joined(f, &self.strides)
    }
}

pub(crate) fn write_joined(f: &mut core::fmt::Formatter<'_>, values: &[usize]) -> core::fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str("x")?;
        }
        f.write_fmt(format_args!("{value}"))?;
    }
    Ok(())
}

/// A device buffer along with the descriptor of the tensor it holds.
#[derive(new, Debug, Clone, Copy)]
pub struct TensorHandleRef<'a> {
    /// Device buffer.
    pub handle: &'a Handle,
    /// Tensor layout.
    pub desc: &'a TensorDescriptor,
}

impl TensorHandleRef<'_> {
    /// Binding over the whole buffer.
    pub fn binding(&self) -> Binding {
        self.handle.binding()
    }

    /// Whether the buffer is large enough to back the tensor.
    pub fn is_bound(&self) -> bool {
        self.handle.size >= self.desc.byte_size() && self.desc.byte_size() > 0
    }
}

/// Scratch memory supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Workspace<'a> {
    handle: Option<&'a Handle>,
    size: usize,
}

impl<'a> Workspace<'a> {
    /// No workspace.
    pub fn none() -> Self {
        Self::default()
    }

    /// The whole buffer is available as workspace.
    pub fn new(handle: &'a Handle) -> Self {
        Self {
            handle: Some(handle),
            size: handle.size,
        }
    }

    /// Only the first `size` bytes of the buffer are available as workspace.
    pub fn with_size(handle: &'a Handle, size: usize) -> Self {
        Self {
            handle: Some(handle),
            size: usize::min(size, handle.size),
        }
    }

    /// Usable size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether a strategy needing `required` bytes can run with this workspace.
    pub fn fits(&self, required: usize) -> bool {
        required == 0 || (self.handle.is_some() && self.size >= required)
    }

    /// Binding over the usable part of the workspace.
    pub fn binding(&self) -> Option<Binding> {
        self.handle
            .map(|handle| handle.binding_range(0, self.size))
    }
}

/// Options of an algorithm search.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of results returned.
    pub request_count: usize,
    /// Enumerate kernel tilings instead of using the heuristic one.
    pub exhaustive: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            request_count: 1,
            exhaustive: false,
        }
    }
}
