//! Configuration view and validation commands: `toonflow config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use toonflow::init::get_toonflow_dir;
    use toonflow::toonflow_config::{CONFIG_FILE, ToonflowToml};

    let toonflow_dir = get_toonflow_dir(project_dir);
    let config_path = toonflow_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Toonflow Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                ToonflowToml::load(&config_path)?
            } else {
                println!("No toonflow.toml found at {}", config_path.display());
                println!("Using default configuration:");
                ToonflowToml::default()
            };
            println!();

            println!("[pipeline]");
            println!("  auto_next = {}", toml.pipeline.auto_next);
            println!(
                "  regeneration_delay_ms = {}",
                toml.pipeline.regeneration_delay_ms
            );
            println!();

            println!("[cache]");
            println!("  restore_window_secs = {}", toml.cache.restore_window_secs);
            println!(
                "  similarity_threshold = {}",
                toml.cache.similarity_threshold
            );
            println!("  key_prefix = \"{}\"", toml.cache.key_prefix);
            println!();

            println!("[generator]");
            match &toml.generator.command {
                Some(cmd) => println!("  command = \"{}\"", cmd),
                None => println!("  command = (offline)"),
            }
            if !toml.generator.args.is_empty() {
                println!("  args = {:?}", toml.generator.args);
            }
            println!("  timeout_secs = {}", toml.generator.timeout_secs);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  json = {}", toml.logging.json);
            println!();

            // Effective values after environment overrides
            println!("Effective values (with env overrides):");
            println!("  auto_next = {}", toml.auto_next());
            println!(
                "  generator = \"{}\"",
                toml.generator_command()
                    .unwrap_or_else(|| "offline".to_string())
            );
            println!();

            if !config_path.exists() {
                println!("Run 'toonflow config init' to create a toonflow.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No toonflow.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ToonflowToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("toonflow.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !toonflow_dir.exists() {
                std::fs::create_dir_all(&toonflow_dir)?;
            }

            let toml = ToonflowToml::default();
            toml.save(&config_path)?;

            println!("Created toonflow.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [pipeline] auto_next, regeneration_delay_ms");
            println!("  - [cache] restore_window_secs, similarity_threshold, key_prefix");
            println!("  - [generator] command, args, timeout_secs");
            println!();
        }
    }

    Ok(())
}
