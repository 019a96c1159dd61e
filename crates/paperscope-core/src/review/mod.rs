pub mod highlight;
pub mod machine;
pub mod session;

pub use highlight::Highlighter;
pub use machine::{ReviewAction, SessionEnd, Transition, step};
pub use session::ReviewSession;
