use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, default_config_dir};
use crate::embeddings::gemini::API_KEY_ENV;

/// Walk through the configuration interactively and offer to save it.
#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 studyrag Configuration").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Gemini API").bold().yellow());
    eprintln!(
        "The API key is read from the {} environment variable and never stored.",
        style(API_KEY_ENV).cyan()
    );
    eprintln!();

    configure_gemini(&mut config)?;
    configure_chunking(&mut config)?;

    eprintln!();
    if std::env::var(API_KEY_ENV).is_err() {
        eprintln!(
            "{}",
            style(format!("⚠ {API_KEY_ENV} is not set in this shell.")).yellow()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

/// Print the current configuration.
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gemini:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.gemini.endpoint).cyan());
    eprintln!(
        "  Generative model: {}",
        style(config.gemini.generative_model.as_deref().unwrap_or("(auto)")).cyan()
    );
    eprintln!(
        "  Embedding model: {}",
        style(config.gemini.embedding_model.as_deref().unwrap_or("(auto)")).cyan()
    );
    eprintln!(
        "  Timeout: {}s",
        style(config.gemini.timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Chunk size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!(
        "  Chunk overlap: {}",
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retry:").bold().yellow());
    eprintln!(
        "  Max attempts: {}",
        style(config.retry.max_attempts).cyan()
    );
    eprintln!(
        "  Backoff base: {}s",
        style(config.retry.backoff_base_secs).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load_default().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            let mut config = Config::default();
            config.base_dir = default_config_dir()?;
            Ok(config)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_gemini(config: &mut Config) -> Result<()> {
    let generative: String = Input::new()
        .with_prompt("Generative model (empty for automatic discovery)")
        .default(
            config
                .gemini
                .generative_model
                .clone()
                .unwrap_or_default(),
        )
        .allow_empty(true)
        .interact_text()?;
    config.gemini.generative_model = (!generative.trim().is_empty()).then(|| generative.trim().to_string());

    let embedding: String = Input::new()
        .with_prompt("Embedding model (empty for automatic discovery)")
        .default(config.gemini.embedding_model.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    config.gemini.embedding_model = (!embedding.trim().is_empty()).then(|| embedding.trim().to_string());

    Ok(())
}

fn configure_chunking(config: &mut Config) -> Result<()> {
    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());

    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(config.chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunk size must be greater than zero")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(config.chunking.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), String> {
            if *input >= chunk_size {
                Err(format!(
                    "Overlap must be smaller than the chunk size ({chunk_size})"
                ))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.chunking.chunk_size = chunk_size;
    config.chunking.chunk_overlap = chunk_overlap;

    Ok(())
}
