// Request middleware and shared session state

pub mod auth;
pub mod session;
