#![warn(missing_docs)]

//! Convolution algorithm selection and execution.
//!
//! A [ConvolutionDescriptor] holds the padding, stride and dilation of a 2D convolution. Given
//! the tensors of a problem, the `find_*_algorithm` functions benchmark every applicable
//! strategy on the device and rank them. The `forward`, `backward_data` and `backward_weights`
//! functions then run a chosen algorithm, reusing the kernels compiled during the search.

#[macro_use]
extern crate derive_new;

mod algorithm;
mod bias;
mod descriptor;
mod error;
mod execute;
mod key;
mod launch;
mod primitives;
mod problem;
mod search;
mod staged;
mod tensor;
mod validate;
mod workspace;

/// Strategy constructors, lowering a problem into kernel plans.
pub mod strategy;

pub use algorithm::*;
pub use bias::*;
pub use descriptor::*;
pub use error::*;
pub use key::*;
pub use primitives::*;
pub use problem::*;
pub use staged::*;
pub use tensor::*;
