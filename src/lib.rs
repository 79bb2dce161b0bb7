pub mod config;
pub mod context;
pub mod discord;
pub mod dispatch;
pub mod gmail;
pub mod model;
pub mod poller;
pub mod reactions;
pub mod scraper;
