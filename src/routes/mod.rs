pub mod admin;
pub mod articles;
pub mod auth;
pub mod files;
pub mod journals;
pub mod submissions;
