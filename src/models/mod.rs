pub mod cover;
pub mod source;

pub use cover::*;
pub use source::*;
