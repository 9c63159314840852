use anyhow::{anyhow, bail, Context, Result};
use toml_edit::{DocumentMut, Item, TableLike, Value};

use almanac_etl::{config, Config};

/// Settings that `config get` and `config set` understand.
const KEYS: &[&str] = &[
    "output_dir",
    "format",
    "buckets",
    "backend",
    "max_batch_size",
    "max_retries",
    "retry_min_delay_ms",
    "retry_max_delay_ms",
    "min_request_interval_ms",
    "request_timeout_secs",
    "max_subclass_depth",
    "user_agent_contact",
    "feed_base_url",
    "sparql_url",
    "entity_api_url",
    "logging.level",
    "logging.coloured",
    "logging.report_caller",
];

fn check_key(key: &str) -> Result<()> {
    if KEYS.contains(&key) {
        Ok(())
    } else {
        bail!("Unknown config key: {}\n\nValid keys: {}", key, KEYS.join(", "))
    }
}

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = config::config_file_path();

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    if config.user_agent_contact.is_none() {
        println!("# user_agent_contact is not set");
    }

    println!("\nPriority: CLI args > ENV vars (ALMANAC_*) > Config file > Defaults");

    Ok(())
}

/// Look up a dotted key in the effective configuration.
fn lookup(config: &Config, key: &str) -> Result<Option<toml::Value>> {
    let mut current = toml::Value::try_from(config).context("Failed to render configuration")?;
    for part in key.split('.') {
        match current.get(part) {
            Some(next) => current = next.clone(),
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Get a specific config value, or print the raw config file.
pub fn get_config(key: Option<&str>) -> Result<()> {
    let Some(key) = key else {
        let config_path = config::config_file_path();
        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'almanac config init' to create it.");
        }
        return Ok(());
    };

    check_key(key)?;
    let config = Config::load()?;
    match lookup(&config, key)? {
        Some(toml::Value::String(s)) => println!("{}", s),
        Some(value) => println!("{}", value),
        None => println!("<not set>"),
    }

    Ok(())
}

/// Parse a command-line value as a TOML literal, falling back to a plain
/// string so `almanac config set backend entity` works unquoted.
fn parse_value(raw: &str) -> Value {
    raw.parse::<Value>().unwrap_or_else(|_| Value::from(raw))
}

/// Set a dotted key in a TOML document, creating tables as needed.
fn set_dotted(doc: &mut DocumentMut, key: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow!("Empty config key"))?;

    let mut table: &mut dyn TableLike = doc.as_table_mut();
    for part in parents {
        table = table
            .entry(part)
            .or_insert(toml_edit::table())
            .as_table_like_mut()
            .ok_or_else(|| anyhow!("{} is not a table in the config file", part))?;
    }
    table.insert(last, Item::Value(value));
    Ok(())
}

/// Apply `key = value` to config file contents, checking the result still
/// loads.
fn updated_contents(contents: &str, key: &str, value: &str) -> Result<String> {
    check_key(key)?;

    let mut doc: DocumentMut = contents.parse().context("Failed to parse config file")?;
    set_dotted(&mut doc, key, parse_value(value))?;
    let updated = doc.to_string();

    let config: Config = toml::from_str(&updated)
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    config.validate()?;

    Ok(updated)
}

/// Set a config value.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    let config_path = config::config_file_path();

    config::ensure_config_file()?;
    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;

    let updated = updated_contents(&contents, key, value)?;
    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, value);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure almanac.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
