pub mod closure;
pub mod common;
pub mod folder;
pub mod object;
pub mod project;
pub mod replacement;
pub mod scope;

pub use closure::*;
pub use common::*;
pub use folder::*;
pub use object::*;
pub use project::*;
pub use replacement::*;
pub use scope::*;
