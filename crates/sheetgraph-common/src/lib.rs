pub mod address;
pub mod coord;
pub mod error;
pub mod value;

pub use address::*;
pub use coord::{MAX_COL, MAX_ROW, column_to_letters, letters_to_column};
pub use error::*;
pub use value::*;
