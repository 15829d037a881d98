pub mod cli;
pub mod config;
pub mod convert;
pub mod drawing;
pub mod inspect;
pub mod models;
pub mod server;
pub mod util;
