//! Transfer engines.
//!
//! - [`copy()`]: drive any [`Source`](crate::core::Source) into any
//!   [`Sink`](crate::core::Sink)
//! - [`UnloadSource`]: rows of a table or query
//! - [`LoadSink`]: batched insert/update/delete into a table

mod copy;
pub mod load;
mod unload;

pub use copy::copy;
pub use load::{LoadOptions, LoadSink};
pub use unload::UnloadSource;
