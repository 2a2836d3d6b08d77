pub mod closure;
pub mod copy_move;
pub mod errors;
pub mod export;
pub mod folder_chain;
pub mod import;
pub mod reference_model;

pub use closure::*;
pub use copy_move::*;
pub use errors::*;
pub use export::*;
pub use folder_chain::*;
pub use import::*;
pub use reference_model::*;
