pub mod connections;
pub mod monitoring;
pub mod topology;
pub mod vpods;
