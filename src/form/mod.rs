pub mod remember;
pub mod state;

pub use remember::{FileRememberStore, MemoryRememberStore, RememberStore, RememberedState};
pub use state::{FormSnapshot, FormState};
