//! Concrete identifier lookup services.

pub mod pubmed;

pub use pubmed::PubmedLookup;
