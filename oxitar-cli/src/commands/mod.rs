//! Command implementations for OxiTar CLI.

pub mod add;
pub mod append;
pub mod detect;
pub mod merge;

pub use add::cmd_add;
pub use append::cmd_append;
pub use detect::cmd_detect;
pub use merge::cmd_merge;
