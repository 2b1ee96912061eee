//! CLI commands implementation

pub mod access;
pub mod forms;
pub mod init;
pub mod relations;
pub mod status;
pub mod submissions;
pub mod users;

pub use access::*;
pub use forms::*;
pub use init::*;
pub use relations::*;
pub use status::*;
pub use submissions::*;
pub use users::*;
