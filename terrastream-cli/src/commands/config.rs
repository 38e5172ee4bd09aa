//! Layer configuration commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use terrastream::config::{format_size, LayerConfig};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file and summarize the pyramid it describes
    Check {
        /// Path to the INI file
        file: PathBuf,
    },

    /// Print the default configuration as commented INI
    Defaults,

    /// Write the default configuration to a file
    Init {
        /// Destination path
        file: PathBuf,

        /// Layer name to write
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Check { file } => run_check(&file),
        ConfigCommands::Defaults => {
            print!("{}", LayerConfig::default().to_ini_string());
            Ok(())
        }
        ConfigCommands::Init { file, name, force } => run_init(&file, name, force),
    }
}

/// Load `path` the same way the simulator does.
pub fn load(path: &Path) -> Result<LayerConfig, CliError> {
    LayerConfig::load(path).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn run_check(path: &Path) -> Result<(), CliError> {
    let config = load(path)?;
    let levels = config.level_set().map_err(|e| CliError::Config {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    println!("{}: OK", path.display());
    println!();
    println!("Layer:    {}", config.display_name());
    println!(
        "Format:   {} (.{})",
        config.format.mime_type, config.format.extension
    );
    println!("Store:    {}", config.store_directory().display());
    println!(
        "Cache:    {} high / {} low",
        format_size(config.cache.high_watermark),
        format_size(config.cache.low_watermark)
    );
    println!(
        "Fetch:    {} workers, queue {}",
        config.fetch.workers, config.fetch.queue_capacity
    );
    println!(
        "LOD:      split scale {}, eager level 0 {}",
        config.lod.split_scale,
        if config.lod.force_level_zero_loads {
            "on"
        } else {
            "off"
        }
    );
    println!();
    println!("Coverage: {}", levels.sector());
    println!("Level-0 tiles: {}", levels.top_level_tiles().len());
    println!();
    println!("  Level  Tile delta   Texel (rad)   Expiry");
    for level in levels.levels() {
        let expiry = match level.expiry() {
            Some(d) => format!("{}s", d.as_secs()),
            None => "never".to_string(),
        };
        println!(
            "  {:>5}  {:>10.5}  {:>12.8}   {}{}",
            level.index(),
            level.tile_delta(),
            level.texel_size(),
            expiry,
            if level.is_empty() { "  (empty)" } else { "" }
        );
    }
    Ok(())
}

fn run_init(path: &Path, name: Option<String>, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::FileExists(path.to_path_buf()));
    }
    let config = name.map(LayerConfig::named).unwrap_or_default();
    config.save_to(path).map_err(|source| CliError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_check() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("layers/bluemarble.ini");

        run_init(&path, Some("bluemarble".into()), false).unwrap();
        assert_eq!(load(&path).unwrap().name, "bluemarble");
        run_check(&path).unwrap();
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("layer.ini");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            run_init(&path, None, false),
            Err(CliError::FileExists(_))
        ));
        run_init(&path, None, true).unwrap();
    }

    #[test]
    fn test_check_reports_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.ini");
        std::fs::write(&path, "[levels]\ncount = 0\n").unwrap();

        let err = run_check(&path).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
