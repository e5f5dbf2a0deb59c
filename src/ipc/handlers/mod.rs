pub mod auth;
pub mod catalog;
pub mod core;
pub mod feedback;
pub mod students;
