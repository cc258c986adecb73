use crate::cli::ConfigCommand;
use crate::error::Result;
use aqreact::core::config::SimulationConfig;
use tracing::info;

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Validate { file } => {
            let config = SimulationConfig::from_toml_file(&file)?;
            info!(path = %file.display(), "Configuration loaded.");

            let groups: Vec<&str> = config
                .phases
                .keys()
                .map(|kind| kind.section_name())
                .collect();
            println!("'{}' is valid.", file.display());
            println!("  reactive: enabled={}", config.reactive.enabled);
            println!("  timing: {}", config.reactive.timing);
            println!("  reaction steps: {}", config.reactive.tsteps.len());
            if groups.is_empty() {
                println!("  phase groups: none");
            } else {
                println!("  phase groups: {}", groups.join(", "));
            }
            Ok(())
        }
        ConfigCommand::Show { file } => {
            let config = SimulationConfig::from_toml_file(&file)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
