use crate::{ConvolutionError, TensorDescriptor};

/// Padding, stride and dilation of a 2D convolution, each as `(h, w)`.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConvolutionParams {
    /// Zero padding added on both sides.
    pub padding: (usize, usize),
    /// Step between two windows.
    pub stride: (usize, usize),
    /// Spacing between two filter taps.
    pub dilation: (usize, usize),
}

impl Default for ConvolutionParams {
    fn default() -> Self {
        Self {
            padding: (0, 0),
            stride: (1, 1),
            dilation: (1, 1),
        }
    }
}

/// A 2D convolution with fixed parameters.
///
/// All the search, execution and workspace sizing entry points hang off this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolutionDescriptor {
    params: ConvolutionParams,
}

impl ConvolutionDescriptor {
    /// Create a descriptor, rejecting zero strides or dilations.
    pub fn new(params: ConvolutionParams) -> Result<Self, ConvolutionError> {
        if params.stride.0 == 0 || params.stride.1 == 0 {
            return Err(ConvolutionError::bad_parameter(format!(
                "stride must be positive, got {:?}",
                params.stride
            )));
        }
        if params.dilation.0 == 0 || params.dilation.1 == 0 {
            return Err(ConvolutionError::bad_parameter(format!(
                "dilation must be positive, got {:?}",
                params.dilation
            )));
        }

        Ok(Self { params })
    }

    /// The convolution parameters.
    pub fn params(&self) -> &ConvolutionParams {
        &self.params
    }

    /// NCHW dims of the forward output for an input and a filter.
    ///
    /// Each spatial extent is `(in + 2·pad - dilation·(filter - 1) - 1) / stride + 1`.
    pub fn forward_output_dims(
        &self,
        input: &TensorDescriptor,
        weights: &TensorDescriptor,
    ) -> Result<[usize; 4], ConvolutionError> {
        let [n, c, h, w] = input.nchw().ok_or_else(|| {
            ConvolutionError::bad_parameter(format!("input must have rank 4, got {}", input.rank()))
        })?;
        let [k, wc, fh, fw] = weights.nchw().ok_or_else(|| {
            ConvolutionError::bad_parameter(format!(
                "filter must have rank 4, got {}",
                weights.rank()
            ))
        })?;

        if c != wc {
            return Err(ConvolutionError::bad_parameter(format!(
                "input has {c} channels but the filter expects {wc}"
            )));
        }

        let p = &self.params;
        let out_h = output_extent(h, fh, p.padding.0, p.stride.0, p.dilation.0).ok_or_else(|| {
            ConvolutionError::bad_parameter(format!(
                "filter height {fh} does not fit an input of height {h}"
            ))
        })?;
        let out_w = output_extent(w, fw, p.padding.1, p.stride.1, p.dilation.1).ok_or_else(|| {
            ConvolutionError::bad_parameter(format!(
                "filter width {fw} does not fit an input of width {w}"
            ))
        })?;

        Ok([n, k, out_h, out_w])
    }

    /// Packed descriptor of the forward output for an input and a filter.
    pub fn forward_output_descriptor(
        &self,
        input: &TensorDescriptor,
        weights: &TensorDescriptor,
    ) -> Result<TensorDescriptor, ConvolutionError> {
        let dims = self.forward_output_dims(input, weights)?;
        Ok(TensorDescriptor::new_packed(input.dtype(), dims))
    }
}

fn output_extent(
    input: usize,
    filter: usize,
    padding: usize,
    stride: usize,
    dilation: usize,
) -> Option<usize> {
    if filter == 0 {
        return None;
    }
    let window = dilation * (filter - 1) + 1;
    let padded = input + 2 * padding;

    padded.checked_sub(window).map(|span| span / stride + 1)
}
