pub mod admin;
pub mod approval;
pub mod auth;
pub mod blog;
pub mod blog_admin;
pub mod blog_ai;
pub mod public;
