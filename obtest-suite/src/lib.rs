pub mod builder;
pub mod suite;

pub use builder::Builder;
pub use suite::TestSuite;
