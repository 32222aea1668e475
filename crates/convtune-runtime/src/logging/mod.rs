mod profiling;
mod server;

pub use profiling::*;
pub use server::*;
