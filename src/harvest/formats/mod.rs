//! Connector implementations.
//!
//! - `folder` - directory tree input and output (`FOLDER`)
//! - `stream` - JSON lines to stdout or any writer (`CONSOLE`)

pub mod folder;
pub mod stream;

pub use folder::{FolderInput, FolderInputConnector, FolderOutput, FolderOutputConnector};
pub use stream::{ConsoleConnector, StreamOutput};
