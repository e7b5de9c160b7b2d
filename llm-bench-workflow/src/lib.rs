pub mod aggregator;
pub mod generator;
pub mod harness;
pub mod loader;
pub mod reporting;

pub use aggregator::*;
pub use generator::*;
pub use harness::*;
pub use loader::*;
pub use reporting::*;
