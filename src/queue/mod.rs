mod focus;
mod indexed;

pub use focus::{Dequeued, FocusOrderedQueue};
pub use indexed::IndexedPriorityMap;
