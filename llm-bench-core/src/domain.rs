pub mod ids;
pub mod task;
pub mod sample;
pub mod score;
pub mod report;

pub use ids::*;
pub use task::*;
pub use sample::*;
pub use score::*;
pub use report::*;
