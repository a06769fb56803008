//! Music library: the track model, container detection and the catalog
//! scanned from the music directory at start-up.

mod catalog;
mod format;
mod model;
mod scan;

pub use catalog::Catalog;
pub use format::{AudioFormat, DECODED_BYTES_PER_SAMPLE, sample_rate_supported};
#[cfg(test)]
pub use format::{Metadata, Probe};
pub use model::Track;
pub use scan::scan;
