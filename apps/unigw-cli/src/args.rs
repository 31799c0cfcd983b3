use clap::{Args, Parser, Subcommand};
use figment::Figment;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Command-line client for the carrier IoT gateway
#[derive(Debug, Parser)]
#[command(name = "unigw")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// YAML configuration file; `UNIGW_*` environment variables override it
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Gateway base URL (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Log verbosity (-v info, -vv debug, -vvv trace); `RUST_LOG` wins when set
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Apply command-line overrides on top of file and environment sources.
    #[must_use]
    pub fn update_figment(&self, mut fig: Figment) -> Figment {
        if let Some(server_url) = &self.server_url {
            fig = fig.merge(("server_url", server_url));
        }
        if let Command::Call(call) = &self.command
            && let Some(retry_count) = call.retry_count
        {
            fig = fig.merge(("retry_count", retry_count));
        }
        fig
    }

    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign and send one gateway call, print the decoded response
    Call(CallArgs),
    /// Sign an empty envelope with the configured credentials and print it
    Sign,
    /// Print the SM3 digest of TEXT as lowercase hex
    Sm3 {
        text: String,
    },
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// API name, e.g. `cn.iot.usernumber.check`
    pub api_name: String,

    #[arg(long, default_value = "1.0")]
    pub api_version: String,

    /// Declared API type: empty, `json`, or anything else for XML
    #[arg(long, default_value = "")]
    pub api_type: String,

    /// String parameter, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Parameter whose value is JSON, repeatable
    #[arg(long = "json-param", value_name = "KEY=JSON", value_parser = parse_json_param)]
    pub json_params: Vec<(String, Value)>,

    /// Extra attempts after a failed one (overrides config)
    #[arg(long)]
    pub retry_count: Option<usize>,
}

impl CallArgs {
    /// Business parameters; a JSON value wins over a plain one with the same key.
    #[must_use]
    pub fn param_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.params {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        for (key, value) in &self.json_params {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn parse_json_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = parse_param(raw)?;
    let value = serde_json::from_str(&value).map_err(|e| format!("invalid JSON for '{key}': {e}"))?;
    Ok((key, value))
}
