pub mod arbiter;
pub mod keywords;
pub mod model;

pub use arbiter::*;
pub use keywords::*;
pub use model::*;
