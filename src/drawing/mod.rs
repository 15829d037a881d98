pub mod dwgread;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use types::{DrawingHandle, DwgStatus, LoadOutcome, ObjectRecord, Supertype};

/// Loads a drawing file into a [`DrawingHandle`].
///
/// A load that the library rejects is not an `Err`: it comes back as a
/// [`LoadOutcome`] whose status carries the library's error bits. `Err` is
/// reserved for the reader itself being unusable (tool missing, etc).
pub trait DrawingReader {
    fn load(&self, path: &Path) -> Result<LoadOutcome>;
}
