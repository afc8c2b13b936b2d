pub mod bar;
pub mod errors;
pub mod events;

pub use bar::*;
pub use errors::*;
pub use events::*;
