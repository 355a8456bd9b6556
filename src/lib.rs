pub mod config;
pub mod engine;
pub mod executor;
pub mod harvest;
pub mod model;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export common types for convenience
pub use config::*;
pub use engine::*;
pub use executor::*;
pub use model::*;
pub use traits::*;
