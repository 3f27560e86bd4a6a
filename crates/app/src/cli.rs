use anyhow::Result;

use crate::cloud;

pub(crate) fn handle_commands(args: &[String]) -> Result<bool> {
    match args.get(1).map(|s| s.as_str()) {
        Some("capture") => {
            let config = cloud::BatchConfig::from_args(args)?;
            cloud::run_batch(&config)?;
            Ok(true)
        }
        Some("serve") => {
            let config = cloud::ServeConfig::from_args(args)?;
            cloud::run_stream(&config)?;
            Ok(true)
        }
        Some("devices") => {
            for serial in depth_ingest::enumerate() {
                println!("{serial}");
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub(crate) fn print_usage() {
    println!("usage: depthcloud <capture|serve|devices> [flags]");
    println!();
    println!("  capture | save consecutive point cloud frames to files");
    println!("  serve   | cache frames in memory and expose them over HTTP");
    println!("  devices | list attached device serial numbers");
    println!();
    println!("{}", cloud::config::CAPTURE_USAGE);
    println!();
    println!("{}", cloud::config::SERVE_USAGE);
}
