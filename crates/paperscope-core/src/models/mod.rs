pub mod dataset;
pub mod identifiers;
pub mod record;

pub use dataset::*;
pub use identifiers::*;
pub use record::*;
