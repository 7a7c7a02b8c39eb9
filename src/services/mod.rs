// Services module - Business logic

pub mod asset_loader;
pub mod card_export;
pub mod card_template;
pub mod document;
pub mod oauth;
pub mod portal_api;
pub mod rasterizer;
pub mod render_target;
pub mod review_queue;
pub mod validity;
