// OAuth providers

pub mod google;
