pub mod error;
pub mod span;
pub mod types;

pub use error::*;
pub use span::{apply_edits, EditError, LineIndex, TextEdit, TextSpan};
pub use types::*;
