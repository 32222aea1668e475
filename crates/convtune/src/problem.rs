use crate::{ConvolutionError, ConvolutionParams, DataType, Direction, NetworkConfig, TensorDescriptor};

/// The sizes of a 2D convolution, in forward terms.
///
/// `h`, `w` are the spatial dims of `x` (or `dx`) and `out_h`, `out_w` those of `y` (or `dy`),
/// whatever the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvShape {
    /// Batch size.
    pub n: usize,
    /// Input channels.
    pub c: usize,
    /// Input height.
    pub h: usize,
    /// Input width.
    pub w: usize,
    /// Output channels.
    pub k: usize,
    /// Filter height.
    pub fh: usize,
    /// Filter width.
    pub fw: usize,
    /// Output height.
    pub out_h: usize,
    /// Output width.
    pub out_w: usize,
}

impl ConvShape {
    /// Whether the filter is 1x1.
    pub fn is_1x1(&self) -> bool {
        self.fh == 1 && self.fw == 1
    }

    /// Number of output pixels of one channel.
    pub fn out_spatial(&self) -> usize {
        self.out_h * self.out_w
    }

    /// Number of input pixels of one channel.
    pub fn in_spatial(&self) -> usize {
        self.h * self.w
    }

    /// Length of one unfolded column, `C·fh·fw`.
    pub fn col_len(&self) -> usize {
        self.c * self.fh * self.fw
    }
}

/// A validated convolution problem: the three tensors seen from the forward pass, the
/// parameters, the direction and the fingerprint shared by every kernel built for it.
#[derive(Debug, Clone)]
pub struct ConvProblem {
    /// Which pass is computed.
    pub direction: Direction,
    /// `x`, or `dx` for backward data.
    pub input: TensorDescriptor,
    /// `w`, or `dw` for backward weights.
    pub weights: TensorDescriptor,
    /// `y`, or `dy` for both backward passes.
    pub output: TensorDescriptor,
    /// Convolution parameters.
    pub params: ConvolutionParams,
    /// Problem fingerprint.
    pub config: NetworkConfig,
    /// Problem sizes.
    pub shape: ConvShape,
}

impl ConvProblem {
    /// Build a problem from rank 4 descriptors.
    pub fn new(
        direction: Direction,
        input: &TensorDescriptor,
        weights: &TensorDescriptor,
        output: &TensorDescriptor,
        params: ConvolutionParams,
    ) -> Result<Self, ConvolutionError> {
        let not_4d = || ConvolutionError::unsupported("only 2D convolutions on 4D tensors are supported");

        let [n, c, h, w] = input.nchw().ok_or_else(not_4d)?;
        let [k, _, fh, fw] = weights.nchw().ok_or_else(not_4d)?;
        let [_, _, out_h, out_w] = output.nchw().ok_or_else(not_4d)?;

        let config = NetworkConfig::build(direction, input, weights, output, &params);

        Ok(Self {
            direction,
            input: input.clone(),
            weights: weights.clone(),
            output: output.clone(),
            params,
            config,
            shape: ConvShape {
                n,
                c,
                h,
                w,
                k,
                fh,
                fw,
                out_h,
                out_w,
            },
        })
    }

    /// Element type shared by the three tensors.
    pub fn dtype(&self) -> DataType {
        self.input.dtype()
    }

    /// Size of one element in bytes.
    pub fn elem_size(&self) -> usize {
        self.dtype().size()
    }

    /// Whether the filter is 1x1.
    pub fn is_1x1(&self) -> bool {
        self.shape.is_1x1()
    }

    /// Whether all three tensors use row major strides.
    pub fn is_packed(&self) -> bool {
        self.input.is_packed() && self.weights.is_packed() && self.output.is_packed()
    }

    /// Whether unit stride and zero padding on both axes.
    pub fn is_unit_stride_unpadded(&self) -> bool {
        self.params.stride == (1, 1) && self.params.padding == (0, 0)
    }
}
