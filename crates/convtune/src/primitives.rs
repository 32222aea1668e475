use crate::{ConvShape, ConvolutionParams, DataType};
use convtune_runtime::server::{Binding, ComputeServer, LaunchError};
use core::time::Duration;

/// Geometry of an unfold (im2col) of one sample.
///
/// The column matrix is `C·fh·fw` rows by `out_h·out_w` columns, row major.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Im2ColArgs {
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub filter_h: usize,
    pub filter_w: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub dtype: DataType,
}

impl Im2ColArgs {
    /// Unfold of one input sample of a problem.
    pub fn new(shape: &ConvShape, params: &ConvolutionParams, dtype: DataType) -> Self {
        Self {
            channels: shape.c,
            in_h: shape.h,
            in_w: shape.w,
            filter_h: shape.fh,
            filter_w: shape.fw,
            out_h: shape.out_h,
            out_w: shape.out_w,
            pad_h: params.padding.0,
            pad_w: params.padding.1,
            stride_h: params.stride.0,
            stride_w: params.stride.1,
            dilation_h: params.dilation.0,
            dilation_w: params.dilation.1,
            dtype,
        }
    }

    /// Number of elements of the column matrix.
    pub fn col_len(&self) -> usize {
        self.channels * self.filter_h * self.filter_w * self.out_h * self.out_w
    }
}

/// Shape of a row major matrix multiplication `C[m×n] (+)= op(A)[m×k] · op(B)[k×n]`.
///
/// A transposed operand is stored with its two dims swapped.
#[allow(missing_docs)]
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmGeometry {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub dtype: DataType,
}

/// A matrix multiplication solution picked by the server for one geometry.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmPlan {
    /// The geometry the plan solves.
    pub geometry: GemmGeometry,
    /// Server specific solution index.
    pub variant: usize,
}

/// Operands of one matrix multiplication.
#[allow(missing_docs)]
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmCall {
    pub a: Binding,
    pub b: Binding,
    pub c: Binding,
    /// Add to `c` instead of overwriting it.
    pub accumulate: bool,
}

/// Library primitives used by the GEMM algorithms.
///
/// Both primitives record their time like a kernel launch when profiling is enabled.
pub trait ConvolutionServer: ComputeServer {
    /// Unfold one input sample into `col`, returning the recorded time (zero when profiling is
    /// disabled).
    fn im2col(
        &mut self,
        args: &Im2ColArgs,
        input: Binding,
        col: Binding,
    ) -> Result<Duration, LaunchError>;

    /// Whether the device provides a matrix multiplication primitive.
    fn gemm_available(&self) -> bool;

    /// Pick a solution for `geometry`, possibly by running candidates on the given operands.
    fn find_gemm_plan(
        &mut self,
        geometry: &GemmGeometry,
        a: Binding,
        b: Binding,
        c: Binding,
    ) -> Result<GemmPlan, LaunchError>;

    /// Run a matrix multiplication with a plan returned by
    /// [find_gemm_plan](ConvolutionServer::find_gemm_plan).
    fn run_gemm(&mut self, plan: &GemmPlan, call: GemmCall) -> Result<(), LaunchError>;
}
