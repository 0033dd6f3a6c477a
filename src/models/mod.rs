pub mod discovery;
pub mod entry;
pub mod title;

pub use discovery::*;
pub use entry::*;
pub use title::*;
