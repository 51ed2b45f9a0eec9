pub mod analysis;
pub mod audit;
pub mod backfill;
pub mod chatlog;
pub mod config;
pub mod event;
pub mod generate;
pub mod line;
pub mod links;
pub mod normalizer;
pub mod paths;
pub mod pipeline;
pub mod seen;
pub mod state;
pub mod util;
