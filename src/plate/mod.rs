//! Plate resolution
//!
//! - [`PlateValidator`]: plate grammar and normalisation
//! - [`PlateResolver`]: one current plate from a stream of detection batches
//! - [`Debouncer`]: delay between a valid plate and the open request

pub mod debounce;
pub mod resolver;
pub mod validation;

pub use debounce::{DebounceKey, Debouncer};
pub use resolver::{PlateResolver, ResolverUpdate};
pub use validation::{PlateError, PlateValidator};
