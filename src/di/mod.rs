mod container;
mod injectable;
mod key;
mod pass;

pub use container::{Binding, Container};
pub use injectable::{Dependencies, Injectable};
pub(crate) use injectable::{Erased, downcast, erase};
pub use key::{Lifetime, ProvideKey};
pub use pass::ResolutionPass;
