//! `config` command: print the effective configuration.

use std::path::Path;

use multifetch::ConfigFile;

use crate::error::CliError;

/// Run the config command.
pub fn run(path: Option<&Path>) -> Result<(), CliError> {
    let config = super::load_config(path)?;

    let source = path
        .map(Path::to_path_buf)
        .or_else(ConfigFile::default_path)
        .filter(|p| p.exists());
    match source {
        Some(p) => println!("Config file: {}", p.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!();

    println!("[cache]");
    println!("size_limit = {}", config.cache_size_limit);
    println!();
    println!("[network]");
    println!("max_connections = {}", config.maximum_number_of_threads);
    println!("timeout_secs = {}", config.connection_timeout.as_secs());
    println!();
    println!("[headers]");
    let mut headers: Vec<_> = config.http_headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        println!("{} = {}", name, value);
    }
    println!();
    println!("[events]");
    println!("capacity = {}", config.event_capacity);

    Ok(())
}
