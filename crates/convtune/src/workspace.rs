use crate::{ConvolutionDescriptor, TensorDescriptor};

/// Number of output pixels a backward weights work group accumulates before its partial result
/// has to be reduced across batch groups.
pub(crate) const BATCH_GROUP_PIXELS: usize = 16 * 1024;

/// Split of the batch for the direct backward weights kernel: `(batch_per_group, groups)`.
pub(crate) fn batch_groups(batch: usize, out_spatial: usize) -> (usize, usize) {
    let per_group = usize::max(1, BATCH_GROUP_PIXELS / out_spatial.max(1));
    (per_group, batch.div_ceil(per_group))
}

impl ConvolutionDescriptor {
    /// Scratch bytes needed by the GEMM forward algorithm: the unfolded input of one sample.
    ///
    /// Zero for 1x1 filters, which multiply the input directly.
    pub fn forward_workspace_size(&self, weights: &TensorDescriptor, output: &TensorDescriptor) -> usize {
        unfold_size(weights, output)
    }

    /// Scratch bytes needed by the GEMM backward weights algorithm.
    pub fn backward_weights_workspace_size_gemm(
        &self,
        dy: &TensorDescriptor,
        dw: &TensorDescriptor,
    ) -> usize {
        unfold_size(dw, dy)
    }

    /// Scratch bytes needed by the direct backward weights algorithm: one partial weight
    /// gradient per batch group when the batch is split.
    pub fn backward_weights_workspace_size_direct(
        &self,
        dy: &TensorDescriptor,
        x: &TensorDescriptor,
        dw: &TensorDescriptor,
    ) -> usize {
        let (Some([_, _, out_h, out_w]), Some([n, ..]), Some([k, c, fh, fw])) =
            (dy.nchw(), x.nchw(), dw.nchw())
        else {
            return 0;
        };

        let (_, groups) = batch_groups(n, out_h * out_w);
        if groups <= 1 {
            return 0;
        }

        groups * k * c * fh * fw * dw.dtype().size()
    }

    /// Scratch bytes needed by every backward weights algorithm.
    pub fn backward_weights_workspace_size(
        &self,
        dy: &TensorDescriptor,
        x: &TensorDescriptor,
        dw: &TensorDescriptor,
    ) -> usize {
        usize::max(
            self.backward_weights_workspace_size_gemm(dy, dw),
            self.backward_weights_workspace_size_direct(dy, x, dw),
        )
    }
}

fn unfold_size(weights: &TensorDescriptor, output: &TensorDescriptor) -> usize {
    let (Some([_, c, fh, fw]), Some([_, _, out_h, out_w])) = (weights.nchw(), output.nchw())
    else {
        return 0;
    };

    if fh == 1 && fw == 1 {
        return 0;
    }

    c * fh * fw * out_h * out_w * weights.dtype().size()
}
