use std::{ffi::OsString, net::SocketAddr, path::PathBuf};

use anyhow::Context;

mod animation;
mod asset;
mod camera;
mod config;
mod controls;
mod lighting;
mod listing;
mod math;
mod model;
mod rendering;
mod scene_graph;
mod server;
mod texture;
mod ui;
mod viewer;
mod window;

use config::AppConfig;

const USAGE: &str = "\
Usage:
  modelview serve [--bind ADDR] [--models-dir DIR] [--config FILE]
  modelview [view] [--server URL] [--models-dir DIR] [--debug] [--config FILE] [MODEL_URL]";

#[derive(Debug)]
enum Command {
    Serve(AppConfig),
    View {
        config: AppConfig,
        model_url: Option<String>,
    },
    Help,
}

fn parse_args(mut args: pico_args::Arguments) -> anyhow::Result<Command> {
    if args.contains(["-h", "--help"]) {
        return Ok(Command::Help);
    }

    let subcommand = args.subcommand().context("Invalid subcommand")?;

    let config_path: Option<PathBuf> = args.opt_value_from_str("--config")?;
    let mut config = match config_path {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::default(),
    };

    let models_dir: Option<PathBuf> = args.opt_value_from_str("--models-dir")?;

    // A bare model URL may stand in for the view subcommand
    let leading_url = match subcommand.as_deref() {
        Some("serve") => {
            if let Some(bind) = args.opt_value_from_str::<_, SocketAddr>("--bind")? {
                config.server.bind = bind;
            }
            if let Some(models_dir) = models_dir {
                config.server.models_dir = models_dir;
            }

            reject_leftovers(args.finish())?;
            return Ok(Command::Serve(config));
        }
        None | Some("view") => None,
        Some(url) => Some(url.to_string()),
    };

    if let Some(server_url) = args.opt_value_from_str("--server")? {
        config.viewer.server_url = Some(server_url);
    }
    if let Some(models_dir) = models_dir {
        config.viewer.models_dir = models_dir;
    }
    if args.contains("--debug") {
        config.viewer.debug_mode = true;
    }

    let mut free = args.finish().into_iter();
    let model_url = match leading_url {
        Some(url) => Some(url),
        None => free
            .next()
            .map(|url| {
                url.into_string()
                    .map_err(|url| anyhow::anyhow!("Model URL is not UTF-8: {:?}", url))
            })
            .transpose()?,
    };
    reject_leftovers(free.collect())?;

    Ok(Command::View { config, model_url })
}

fn reject_leftovers(leftovers: Vec<OsString>) -> anyhow::Result<()> {
    if leftovers.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Unexpected arguments: {:?}\n\n{}", leftovers, USAGE)
    }
}

fn init_logging(debug_mode: bool) {
    let mut builder = pretty_env_logger::formatted_builder();

    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            let level = if debug_mode {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            };
            builder.filter_level(level);
        }
    }

    builder.init();
}

fn main() -> anyhow::Result<()> {
    match parse_args(pico_args::Arguments::from_env())? {
        Command::Help => {
            println!("{}", USAGE);
        }
        Command::Serve(config) => {
            init_logging(config.viewer.debug_mode);

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(server::serve(config.server))?;
        }
        Command::View { config, model_url } => {
            init_logging(config.viewer.debug_mode);

            pollster::block_on(window::run(config.viewer, model_url))?;
        }
    }

    Ok(())
}
