//! Request middleware.

pub mod auth;
pub mod permission;
pub mod tenant;
