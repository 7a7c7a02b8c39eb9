// Models module - Backend record and form representations

pub mod application;
pub mod card_request;

pub use application::Application;
pub use card_request::CardRequest;
