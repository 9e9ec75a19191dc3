//! Project initialization command.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use toonflow::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized toonflow project at {}",
            result.toonflow_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .toonflow/");
        println!("  ├── toonflow.toml  # Project configuration (use `toonflow config`)");
        println!("  ├── state          # Pipeline event journal");
        println!("  ├── audit/         # Revision audit trail (use `toonflow audit`)");
        println!("  └── logs/          # Daily log files");
        println!();
        println!("Next steps:");
        println!("  1. Optionally set [generator] command in toonflow.toml");
        println!("  2. Run `toonflow start \"<premise>\"` to write the script");
        println!("  3. Run `toonflow status` to follow the pipeline");
    } else if was_initialized {
        println!(
            "Toonflow project already initialized at {}",
            result.toonflow_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed toonflow initialization at {}",
            result.toonflow_dir.display()
        );
    }

    Ok(())
}
