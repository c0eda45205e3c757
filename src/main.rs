use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use schemed_config::{Format, LoadOptions, get_config, render};

/// Validate a configuration file against a JSON Schema, filling in defaults.
#[derive(Parser)]
#[command(name = "schemed-config", version, about)]
struct Args {
    /// Configuration file language.
    #[arg(short, long, value_enum, default_value_t = Language::Yaml)]
    language: Language,
    /// Do not write synthesized defaults back to the configuration file.
    #[arg(long)]
    no_write_back: bool,
    /// Keep configuration keys as authored instead of lowercasing them.
    #[arg(long)]
    keep_key_case: bool,
    /// File containing the schema.
    schema: PathBuf,
    /// File the schema has to be applied to.
    config: PathBuf,
}

#[derive(ValueEnum, Clone, Copy)]
enum Language {
    /// YAML with schema validation and default synthesis.
    Yaml,
    /// TOML, pass-through parse only.
    Toml,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let options = LoadOptions {
        format: match args.language {
            Language::Yaml => Format::Yaml,
            Language::Toml => Format::Toml,
        },
        write_back: !args.no_write_back,
        lower_keys: !args.keep_key_case,
    };

    let doc = get_config(&args.config, &args.schema, &options)?;
    let text = match args.language {
        Language::Yaml => render::to_yaml(&doc)?,
        Language::Toml => render::to_toml(&doc)?,
    };
    print!("{text}");
    Ok(())
}
