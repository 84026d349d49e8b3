mod config;
pub use config::{Config, get_or_create_config};
mod env_var;
pub use env_var::EnvVar;
mod opts;

pub use opts::Opts;
