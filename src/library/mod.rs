//! A file-system backed host list: scan a directory of cover images and
//! serve it, optionally filtered, as a [`SourceList`](crate::models::SourceList).

pub mod list;
pub mod scanner;

pub use list::LibraryList;
pub use scanner::{is_artwork_extension, LibraryScanner, ScanConfig};
