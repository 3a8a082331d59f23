mod binding;
mod cache;
mod key;
mod layout;

pub use binding::*;
pub use cache::*;
pub use key::*;
pub use layout::*;
