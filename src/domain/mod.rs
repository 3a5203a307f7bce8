//! Pure domain model: entities, windows, errors, and store interfaces

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod window;
