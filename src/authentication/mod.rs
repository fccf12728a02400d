pub mod session;

pub mod http;

pub use session::Session;
