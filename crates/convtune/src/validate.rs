use crate::{ConvProblem, ConvolutionDescriptor, ConvolutionError, Direction, TensorHandleRef};

/// Check the tensors of a convolution and build its problem.
///
/// `input` is `x` (or `dx`), `weights` is `w` (or `dw`) and `output` is `y` (or `dy`).
pub(crate) fn validate(
    conv: &ConvolutionDescriptor,
    direction: Direction,
    input: &TensorHandleRef<'_>,
    weights: &TensorHandleRef<'_>,
    output: &TensorHandleRef<'_>,
) -> Result<ConvProblem, ConvolutionError> {
    for (name, tensor) in [("input", input), ("weights", weights), ("output", output)] {
        if !tensor.is_bound() {
            return Err(ConvolutionError::bad_parameter(format!(
                "the {name} buffer holds {} bytes but the tensor {} needs {}",
                tensor.handle.size,
                tensor.desc,
                tensor.desc.byte_size()
            )));
        }
    }

    let (x, w, y) = (input.desc, weights.desc, output.desc);

    if x.rank() != w.rank() || x.rank() != y.rank() {
        return Err(ConvolutionError::bad_parameter(format!(
            "tensor ranks differ: {}, {} and {}",
            x.rank(),
            w.rank(),
            y.rank()
        )));
    }
    if x.dtype() != w.dtype() || x.dtype() != y.dtype() {
        return Err(ConvolutionError::bad_parameter(format!(
            "data types differ: {}, {} and {}",
            x.dtype(),
            w.dtype(),
            y.dtype()
        )));
    }
    if x.rank() < 3 {
        return Err(ConvolutionError::bad_parameter(format!(
            "tensors must have at least 3 dims, got {}",
            x.rank()
        )));
    }

    let (x_dims, w_dims, y_dims) = (x.dims(), w.dims(), y.dims());
    match direction {
        Direction::Forward if x_dims[1] != w_dims[1] => {
            return Err(ConvolutionError::bad_parameter(format!(
                "x has {} channels but w expects {}",
                x_dims[1], w_dims[1]
            )));
        }
        Direction::BackwardData if y_dims[1] != w_dims[0] => {
            return Err(ConvolutionError::bad_parameter(format!(
                "dy has {} channels but w has {} filters",
                y_dims[1], w_dims[0]
            )));
        }
        Direction::BackwardWeights if y_dims[0] != x_dims[0] || y_dims[1] != w_dims[0] => {
            return Err(ConvolutionError::bad_parameter(format!(
                "dy {y} does not match x {x} and dw {w}"
            )));
        }
        _ => {}
    }

    if x.rank() != 4 {
        return Err(ConvolutionError::unsupported(format!(
            "only 4D tensors are supported, got rank {}",
            x.rank()
        )));
    }

    let expected = conv.forward_output_dims(x, w)?;
    if y_dims != expected {
        return Err(ConvolutionError::bad_parameter(format!(
            "output dims {y_dims:?} do not match the convolution output {expected:?}"
        )));
    }

    ConvProblem::new(direction, x, w, y, *conv.params())
}
