use log::info;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Config file given as the first command line argument.
pub static CONFIG_ARG: LazyLock<Option<PathBuf>> = LazyLock::new(|| config_path(std::env::args()));

fn config_path(args: impl Iterator<Item = String>) -> Option<PathBuf> {
    let args: Vec<String> = args.collect();
    if args.len() > 1 {
        let path = args[1].clone();
        info!("config arg: {}", path);
        return Some(PathBuf::from(path));
    }
    None
}

pub fn init_config_arg() -> Option<PathBuf> {
    CONFIG_ARG.clone()
}
