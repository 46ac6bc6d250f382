pub mod listing;
pub mod target;

// Re-exports for convenience
pub use listing::*;
pub use target::*;
