//! Thin command-line front end: one input in, the processed document on
//! stdout. Directory walking and output placement belong to outer build
//! tooling, not here.

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use hxp_engine::{Options, Preprocessor, ProcessOptions, Value};
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hxp", version, about = "Hypertext execution preprocessor")]
struct Args {
    /// Input document: a file path, inline source text, or `-` for stdin.
    input: String,

    /// Root directory for `/`-prefixed include references.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Working directory for relative include references.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Output-relative path handed to URL-rewriting hooks.
    #[arg(long)]
    rel_path: Option<String>,

    /// Script-block tag name (repeatable; replaces the default set).
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Seed a context variable, NAME=JSON (repeatable).
    #[arg(long = "set", value_name = "NAME=JSON")]
    context: Vec<String>,

    /// Seed a constant, NAME=JSON (repeatable).
    #[arg(long = "define", value_name = "NAME=JSON")]
    constants: Vec<String>,

    /// Enable the built-in URL-rewriting hook.
    #[arg(long)]
    builtin_hooks: bool,
}

fn parse_binding(spec: &str) -> Result<(String, Value)> {
    let Some((name, raw)) = spec.split_once('=') else {
        bail!("binding '{spec}' is not NAME=JSON");
    };
    let json: serde_json::Value = serde_json::from_str(raw)
        .with_context(|| format!("binding '{name}' carries invalid JSON"))?;
    Ok((name.to_string(), Value::from(json)))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let constants = args
        .constants
        .iter()
        .map(|spec| parse_binding(spec))
        .collect::<Result<Vec<_>>>()?;
    let context = args
        .context
        .iter()
        .map(|spec| parse_binding(spec))
        .collect::<Result<Vec<_>>>()?;

    let mut options = Options {
        constants,
        root_dir: args.root,
        register_builtin_hooks: args.builtin_hooks,
        ..Options::default()
    };
    if !args.tags.is_empty() {
        options.tag_names = args.tags;
    }
    let engine = Preprocessor::new(options)?;

    let input = if args.input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("reading stdin")?;
        buffer
    } else {
        args.input
    };

    let output = engine.process(
        &input,
        ProcessOptions {
            context,
            cwd: args.cwd,
            rel_path: args.rel_path,
            ..ProcessOptions::default()
        },
    )?;

    std::io::stdout()
        .write_all(output.as_bytes())
        .context("writing output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_parse_name_and_json() {
        let (name, value) = parse_binding("count=3").unwrap();
        assert_eq!(name, "count");
        assert_eq!(value, Value::Int(3));
        let (_, value) = parse_binding(r#"title="Home""#).unwrap();
        assert_eq!(value, Value::Str("Home".to_string()));
        assert!(parse_binding("nojson").is_err());
        assert!(parse_binding("bad={").is_err());
    }
}
