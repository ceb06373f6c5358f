//! Load images through a headless texture cache and report on it.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use texcache_config::{ConfigSource, TextureCacheConfig, init_tracing};
use texcache_core::{HeadlessGpu, TextureCache};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "texcache-inspect",
    about = "Load images through a headless texture cache and report on it"
)]
struct Cli {
    /// Config file to use instead of the environment lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration as TOML
    Config,
    /// Load images and dump the cache contents
    Load {
        /// Image names or paths, resolved against the search paths
        #[arg(required = true)]
        images: Vec<String>,
        /// Decode on the loader thread instead of the calling thread
        #[arg(long = "async")]
        async_load: bool,
        /// Simulate a lost GPU context and rebuild every texture
        #[arg(long)]
        reload: bool,
        /// Give up waiting for async loads after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

fn load_config(
    path: Option<PathBuf>,
) -> Result<(TextureCacheConfig, ConfigSource)> {
    match path {
        Some(path) => {
            let config = TextureCacheConfig::load_from_file(&path)?;
            Ok((config, ConfigSource::File(path)))
        }
        None => TextureCacheConfig::load_from_env(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config)?;
    init_tracing(&config.log_filter)?;
    info!(?source, "configuration loaded");

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Load {
            images,
            async_load,
            reload,
            timeout_secs,
        } => {
            let mut cache =
                TextureCache::new(HeadlessGpu::new(), config.cache.clone());

            if async_load {
                let timeout = Duration::from_secs(timeout_secs);
                load_async(&mut cache, &images, timeout)?;
            } else {
                for image in &images {
                    if let Err(err) = cache.add_image(image) {
                        warn!(
                            image = %image,
                            error = %err,
                            "failed to load image"
                        );
                    }
                }
            }

            if reload {
                cache.backend_mut().lose_context();
                let report = cache.reload_all_textures();
                for failure in &report.failures {
                    warn!(
                        texture = %failure.texture,
                        source = %failure.source,
                        error = %failure.error,
                        "reload failed"
                    );
                }
                println!(
                    "reloaded {} textures ({} failed, {} pruned)",
                    report.reloaded,
                    report.failures.len(),
                    report.pruned
                );
            }

            println!("{}", cache.dump_cached_texture_info());
            println!("{cache}");
        }
    }

    Ok(())
}

fn load_async(
    cache: &mut TextureCache<HeadlessGpu>,
    images: &[String],
    timeout: Duration,
) -> Result<()> {
    for image in images {
        let name = image.clone();
        cache.add_image_async_with(image, move |outcome| {
            if let Err(err) = outcome {
                warn!(image = %name, error = %err, "async load failed");
            }
        });
    }

    let interval = cache.settings().drain_interval();
    let deadline = Instant::now() + timeout;
    while cache.pipeline_stats().outstanding > 0 {
        if Instant::now() >= deadline {
            let stats = cache.pipeline_stats();
            bail!(
                "timed out with {} async loads outstanding ({} queued)",
                stats.outstanding,
                stats.queued
            );
        }
        cache.tick();
        std::thread::sleep(interval);
    }

    let stats = cache.pipeline_stats();
    info!(decoded = stats.decoded_total, "async loads finished");
    cache.shutdown();
    Ok(())
}

