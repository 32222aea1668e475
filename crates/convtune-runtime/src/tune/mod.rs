mod local;
mod tune_cache;
mod util;

pub use local::*;
pub use tune_cache::*;
pub use util::*;

use core::{
    fmt::{Debug, Display},
    hash::Hash,
};

/// Trait alias for the keys of the tuning caches.
pub trait AutotuneKey:
    Clone + Debug + PartialEq + Eq + Hash + Display + Send + Sync + 'static
{
}

impl AutotuneKey for String {}
