//! HTTP request handlers.

pub mod auth;
pub mod comments;
pub mod health;
pub mod issues;
pub mod members;
pub mod projects;
