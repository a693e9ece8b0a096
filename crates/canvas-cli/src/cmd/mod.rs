pub mod action;
pub mod config;
pub mod init;
pub mod receipt;
pub mod tile;
pub mod verb;
pub mod widget;
