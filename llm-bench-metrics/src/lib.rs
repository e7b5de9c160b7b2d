pub mod normalize;
pub mod calculators;
pub mod scorer;
pub mod aggregators;

pub use normalize::*;
pub use calculators::*;
pub use scorer::*;
pub use aggregators::*;
