pub mod audit;
pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod messages;
pub mod model;
pub mod notify;
pub mod observability;
