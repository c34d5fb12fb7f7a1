pub mod dense;
pub mod parameter;

pub use dense::Dense;
pub use parameter::Parameter;
