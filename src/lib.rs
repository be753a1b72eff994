pub mod api;
pub mod app;
pub mod cli;
pub mod lobby;
pub mod registration;
pub mod storage;
pub mod ui;
pub mod utils;
