//! Transfer orchestration: runs the engines over a resolved table list.
//!
//! - [`Exporter`]: tables (or a query) to data files
//! - [`Importer`]: data files into tables, with the optional delete phase
//!
//! Both check a cancellation token before each table, report [`Progress`]
//! to an optional callback and return a [`TransferReport`].

mod export;
mod import;
mod progress;
mod report;

pub use export::Exporter;
pub use import::Importer;
pub use progress::{Phase, Progress, ProgressFn};
pub use report::{RunStatus, TableResult, TransferReport};
