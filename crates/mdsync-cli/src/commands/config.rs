//! Config command handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use mdsync_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "notes_dir, data_dir, database_id, notion_token, api_base_url, \
     notion_version, full_page, batch_size, pass_through_unknown, log_file, watch_debounce_ms, \
     properties.title, properties.slug, properties.date, properties.tags, properties.status, \
     properties.type, properties.author, properties.managed";

/// Show current configuration
pub fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config = Config::load_with_override(config_path).context("Failed to load configuration")?;
    let token = config.notion_token.as_ref().map(|_| "(set)");

    match output.format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&config).context("Failed to encode config")?;
            // Never echo the secret
            if let Some(object) = value.as_object_mut() {
                object.insert("notion_token".to_string(), serde_json::json!(token));
            }
            println!("{}", value);
        }
        OutputFormat::Quiet => {
            println!("{}", config.notes_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);
            let props = &config.properties;

            println!("Configuration:");
            println!("  notes_dir:            {}", config.notes_dir.display());
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  database_id:          {}", or_unset(config.database_id.as_deref()));
            println!("  notion_token:         {}", or_unset(token));
            println!("  api_base_url:         {}", config.api_base_url);
            println!("  notion_version:       {}", config.notion_version);
            println!("  full_page:            {}", config.full_page);
            println!("  batch_size:           {}", config.batch_size);
            println!("  pass_through_unknown: {}", config.pass_through_unknown);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  watch_debounce_ms:    {}", config.watch_debounce_ms);
            println!(
                "  retry:                {} attempts, {}ms x{}",
                config.retry.max_attempts, config.retry.base_delay_ms, config.retry.factor
            );
            println!();
            println!("Properties:");
            println!("  title:   {}", props.title);
            println!("  slug:    {}", props.slug);
            println!("  date:    {}", or_unset(props.date.as_deref()));
            println!("  tags:    {}", or_unset(props.tags.as_deref()));
            println!("  status:  {}", or_unset(props.status.as_deref()));
            println!("  type:    {}", or_unset(props.kind.as_deref()));
            println!("  author:  {}", or_unset(props.author.as_deref()));
            println!("  managed: {}", or_unset(props.managed.as_deref()));
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

/// `none` or an empty string clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Apply one `key = value` assignment
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "notes_dir" => config.notes_dir = PathBuf::from(value),
        "data_dir" => config.data_dir = PathBuf::from(value),
        "database_id" => config.database_id = optional(value),
        "notion_token" => config.notion_token = optional(value),
        "api_base_url" => config.api_base_url = value.to_string(),
        "notion_version" => config.notion_version = value.to_string(),
        "full_page" => {
            config.full_page = value
                .parse()
                .context("Invalid value for full_page. Use 'true' or 'false'.")?;
        }
        "batch_size" => {
            let size: usize = value
                .parse()
                .context("Invalid value for batch_size. Use a number from 1 to 100.")?;
            if !(1..=100).contains(&size) {
                bail!("batch_size must be between 1 and 100");
            }
            config.batch_size = size;
        }
        "pass_through_unknown" => {
            config.pass_through_unknown = value
                .parse()
                .context("Invalid value for pass_through_unknown. Use 'true' or 'false'.")?;
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        "watch_debounce_ms" => {
            config.watch_debounce_ms = value
                .parse()
                .context("Invalid value for watch_debounce_ms. Use milliseconds.")?;
        }
        "properties.title" | "properties.slug" if value.is_empty() => {
            bail!("{} cannot be empty", key);
        }
        "properties.title" => config.properties.title = value.to_string(),
        "properties.slug" => config.properties.slug = value.to_string(),
        "properties.date" => config.properties.date = optional(value),
        "properties.tags" => config.properties.tags = optional(value),
        "properties.status" => config.properties.status = optional(value),
        "properties.type" => config.properties.kind = optional(value),
        "properties.author" => config.properties.author = optional(value),
        "properties.managed" => config.properties.managed = optional(value),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "notion_token" { "(set)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}
