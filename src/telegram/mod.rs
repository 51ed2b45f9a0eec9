pub mod api;
pub mod bot;
pub mod history;
pub mod types;
