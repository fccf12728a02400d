pub mod authentication;
pub mod budgeting;
pub mod cli;
pub mod database;
pub mod http_err;
pub mod repos;
pub mod server;
