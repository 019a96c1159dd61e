pub mod bibtex;

pub use bibtex::{generate_bibliography, generate_bibtex};
