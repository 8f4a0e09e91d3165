pub mod auth;
pub mod comments;
pub mod issues;
pub mod projects;
pub mod users;
