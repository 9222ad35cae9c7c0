//! Domain model module declarations.

pub mod instance;
pub mod response;
pub mod tool;
