pub mod article;
pub mod journal;
pub mod query;
pub mod response;
pub mod shortcode;
pub mod user;
