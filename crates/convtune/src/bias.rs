use crate::{AlgorithmFamily, ConvolutionError, KernelKey, NetworkConfig, Stage, TensorHandleRef};
use convtune_runtime::{
    client::ComputeClient,
    kernel::{CompileOptions, KernelPlan, WorkSize},
    server::{Bindings, ComputeServer},
};

/// Program of the bias gradient kernel.
pub const BIAS_PROGRAM: &str = "conv_bwd_bias";

const GROUP_SIZE: usize = 256;
const LOCAL_MEMORY: usize = 256;
const READ_UNIT: usize = 4;

/// Compute the bias gradient `db[k] = Σ dy[n, k, h, w]`.
///
/// `db` holds one value per channel of `dy`, of the same element type, and is written
/// contiguously. Each channel map of `dy` must be contiguous.
pub fn backward_bias<S: ComputeServer>(
    client: &ComputeClient<S>,
    dy: TensorHandleRef<'_>,
    db: TensorHandleRef<'_>,
) -> Result<(), ConvolutionError> {
    if !dy.is_bound() || !db.is_bound() {
        return Err(ConvolutionError::bad_parameter(
            "the dy and db buffers must back their tensors",
        ));
    }
    if dy.desc.dtype() != db.desc.dtype() {
        return Err(ConvolutionError::bad_parameter(format!(
            "dy holds {:?} but db holds {:?}",
            dy.desc.dtype(),
            db.desc.dtype()
        )));
    }
    if dy.desc.rank() < 2 || db.desc.rank() < 2 {
        return Err(ConvolutionError::bad_parameter(
            "dy and db need a channel dimension",
        ));
    }
    if dy.desc.dims()[1] != db.desc.dims()[1] {
        return Err(ConvolutionError::bad_parameter(format!(
            "dy has {} channels but db has {}",
            dy.desc.dims()[1],
            db.desc.dims()[1]
        )));
    }

    let (Some([n, k, h, w]), Some([batch_stride, channel_stride, row_stride, col_stride])) =
        (dy.desc.nchw(), dy.desc.nchw_strides())
    else {
        return Err(ConvolutionError::unsupported("only 4D gradients are supported"));
    };
    if col_stride != 1 || (h > 1 && row_stride != w) {
        return Err(ConvolutionError::unsupported(
            "each channel map of dy must be contiguous",
        ));
    }

    let map = h * w;
    let options = CompileOptions::default()
        .define("GROUP_SZ0", GROUP_SIZE)
        .define("GROUP_SZ1", 1)
        .define("LCL_MEMSZ", LOCAL_MEMORY)
        .define("UNITSIZE", READ_UNIT)
        .define("OUT_WIDTH", w)
        .define("OUT_HEIGHT", h)
        .define("OUT_BATCH_SZ", n)
        .define("OUT_CHANNEL_STRIDE", channel_stride)
        .define("OUT_BATCH_STRIDE", batch_stride)
        .define("WK_SIZE", map.div_ceil(READ_UNIT))
        .define("N_PIX_OFF", map % READ_UNIT);

    let config = NetworkConfig::bias(dy.desc, db.desc);
    let id = KernelKey::new(AlgorithmFamily::BackwardBias, Stage::Main, 0, &config).id();
    let kernel = client.get_or_compile(id, || {
        KernelPlan::new(
            BIAS_PROGRAM,
            BIAS_PROGRAM,
            options,
            WorkSize::new_1d(GROUP_SIZE),
            WorkSize::new_2d(GROUP_SIZE, k),
        )
    })?;

    client.launch(
        &kernel,
        Bindings::new().with_buffers([dy.binding(), db.binding()]),
    )?;

    Ok(())
}
