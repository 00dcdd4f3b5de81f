pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod part_info;
pub mod template;
