use super::commands::{Cli, Commands, ConfigCommands, LogCommands};
use anyhow::{Context, Result};
use cogito::Config;
use cogito::guard::ResponseInspector;
use cogito::llm::OpenAiCompatibleProvider;
use cogito::thoughts::HybridLogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Log { log_command } => run_log(log_command, &config).await,
        Commands::Check { file } => {
            let text = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("Failed to read completion from stdin")?;
                    buf
                }
            };
            let inspector = ResponseInspector::from_config(&config)?;
            let report = inspector.report(&text);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Config {
            config_command: ConfigCommands::Show,
        } => {
            print!("{}", toml::to_string_pretty(&redacted(&config))?);
            Ok(())
        }
    }
}

/// Copy of `config` safe to print: secrets replaced with a placeholder.
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.provider.api_key.as_deref().is_some_and(|key| !key.is_empty()) {
        shown.provider.api_key = Some("[REDACTED]".into());
    }
    shown
}

async fn run_log(command: LogCommands, config: &Config) -> Result<()> {
    let store = Arc::new(HybridLogStore::from_config(config));
    let provider = &config.provider;
    let mut client = OpenAiCompatibleProvider::with_timeout(
        &provider.name,
        &provider.base_url,
        provider.api_key.as_deref(),
        Duration::from_secs(provider.timeout_secs),
    );
    if let Some(model) = provider.model.as_deref() {
        client = client.with_default_model(model);
    }
    let commands = cogito::LogCommands::new(store, Arc::new(client), config);

    match command {
        LogCommands::Show { index, session } => {
            let entry = commands.fetch(&session, index).await?;
            println!("[{}]\n{}", entry.time, entry.content);
        }
        LogCommands::Summarize { index, session } => {
            let summary = commands.summarize(&session, index).await?;
            println!("{summary}");
        }
    }
    Ok(())
}
