pub mod app;
pub mod cli;
pub mod config;
pub mod source;
pub mod timeline;
pub mod ui;
pub mod viewport;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use source::{FetchError, FileSource, GoalSource, GraphQlSource};
pub use timeline::{GoalId, GoalRecord, TimelineEntry};
