use super::Applicability;
use crate::{ConvProblem, Direction, GemmGeometry, Im2ColArgs};

/// Convolution through an unfold of each sample followed by a matrix multiplication.
///
/// Forward computes `y[K×out_hw] = w[K×C·fh·fw] · col[C·fh·fw×out_hw]`, backward weights
/// accumulates `dw[K×C·fh·fw] += dy[K×out_hw] · colᵀ` over the batch. 1x1 filters multiply the
/// input sample directly and need no workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmStrategy {
    geometry: GemmGeometry,
    im2col: Option<Im2ColArgs>,
    workspace: usize,
    input_sample_bytes: usize,
    output_sample_bytes: usize,
}

impl GemmStrategy {
    /// Lower a forward or backward weights problem.
    pub fn new(problem: &ConvProblem, gemm_available: bool) -> Applicability<Self> {
        if !gemm_available {
            return Applicability::not_applicable("the device has no GEMM primitive");
        }
        if problem.direction == Direction::BackwardData {
            return Applicability::not_applicable("GEMM does not compute the data gradient");
        }
        if !problem.is_packed() {
            return Applicability::not_applicable("tensors must be packed");
        }

        let shape = &problem.shape;
        let dtype = problem.dtype();
        let im2col = if shape.is_1x1() {
            if !problem.is_unit_stride_unpadded() {
                return Applicability::not_applicable(
                    "1x1 filters multiply the input directly and need unit stride without padding",
                );
            }
            None
        } else {
            Some(Im2ColArgs::new(shape, &problem.params, dtype))
        };

        let geometry = match problem.direction {
            Direction::Forward => {
                GemmGeometry::new(shape.k, shape.out_spatial(), shape.col_len(), false, false, dtype)
            }
            Direction::BackwardWeights | Direction::BackwardData => {
                GemmGeometry::new(shape.k, shape.col_len(), shape.out_spatial(), false, true, dtype)
            }
        };
        let workspace = im2col
            .map(|args| args.col_len() * dtype.size())
            .unwrap_or_default();

        Applicability::Applicable(Self {
            geometry,
            im2col,
            workspace,
            input_sample_bytes: shape.c * shape.in_spatial() * dtype.size(),
            output_sample_bytes: shape.k * shape.out_spatial() * dtype.size(),
        })
    }

    /// Shape of the multiplication run for each sample.
    pub fn geometry(&self) -> &GemmGeometry {
        &self.geometry
    }

    /// Unfold of each sample, `None` for 1x1 filters.
    pub fn im2col(&self) -> Option<&Im2ColArgs> {
        self.im2col.as_ref()
    }

    /// Workspace needed, in bytes.
    pub fn workspace(&self) -> usize {
        self.workspace
    }

    /// Byte offset of sample `index` in `x`.
    pub fn input_offset(&self, index: usize) -> usize {
        index * self.input_sample_bytes
    }

    /// Byte offset of sample `index` in `y` or `dy`.
    pub fn output_offset(&self, index: usize) -> usize {
        index * self.output_sample_bytes
    }

    /// Byte length of one sample of `x`.
    pub fn input_sample_bytes(&self) -> usize {
        self.input_sample_bytes
    }

    /// Byte length of one sample of `y` or `dy`.
    pub fn output_sample_bytes(&self) -> usize {
        self.output_sample_bytes
    }
}
