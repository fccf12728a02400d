//! The budget accounting engine and its HTTP surface.

pub mod domain;
pub mod http;
pub mod models;
pub mod services;
