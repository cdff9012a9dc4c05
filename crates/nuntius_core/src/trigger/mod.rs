mod expr;
pub use expr::*;

mod ops;
pub use ops::*;

mod spec;
pub use spec::*;

pub mod dsl;
