//! Klaviyo newsletter archiver: imports sent email campaigns from the
//! Klaviyo API and materializes one sanitized, queryable record per message.

pub mod campaigns;
pub mod config;
pub mod db;
pub mod klaviyo;
pub mod messages;
pub mod model;
pub mod pipeline;
pub mod render;
