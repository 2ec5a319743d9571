pub mod admins;
pub mod core;
pub mod marksheets;
pub mod mirror;
pub mod students;
