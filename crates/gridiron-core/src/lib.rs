// Gridiron core: slate import, smart scoring, and lineup optimization.

pub mod config;
pub mod db;
pub mod optimizer;
pub mod scoring;
pub mod slate;
pub mod store;
