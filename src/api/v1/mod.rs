//! API Version 1 endpoints

pub mod feed;
pub mod like;
pub mod routes;
pub mod user;
pub mod video;
