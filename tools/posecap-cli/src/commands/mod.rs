pub mod check;
pub mod config;
pub mod header;
pub mod replay;
