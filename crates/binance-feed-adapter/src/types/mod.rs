/*
[INPUT]:  Exchange vocabulary and canonical market contracts
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - canonical market model
[UPDATE]: When canonical types are added or changed
*/

pub mod enums;
pub mod models;
pub mod validate;

pub use enums::*;
pub use models::*;
pub use validate::{Validate, Violation};
