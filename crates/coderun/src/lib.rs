//! coderun: edit and run table snippets from a template gallery.

pub mod session;
pub mod setup;

pub use session::Session;
