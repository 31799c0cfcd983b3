mod args;

use anyhow::{Context, Result};
use args::{CallArgs, Cli, Command};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use unigw_crypto::TokenSigner;
use unigw_sdk::{
    ApiType, CommonJsonRequest, GatewayClient, GatewayConfig, GatewayRequest, GatewayResponse,
};

const APP_ENV_VAR_PREFIX: &str = "UNIGW_";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match &cli.command {
        Command::Sm3 { text } => {
            println!("{}", unigw_crypto::digest_hex(text.as_bytes()));
            Ok(())
        }
        Command::Sign => sign(&load_config(&cli)?),
        Command::Call(call) => run_call(load_config(&cli)?, call).await,
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut fig = Figment::new();
    if let Some(path) = cli.config.as_deref() {
        anyhow::ensure!(path.is_file(), "config file {} not found", path.display());
        fig = fig.merge(Yaml::file(path));
    }
    let fig = cli.update_figment(fig.merge(Env::prefixed(APP_ENV_VAR_PREFIX)));
    let config = GatewayConfig::from_figment(&fig).context("failed to load configuration")?;
    tracing::debug!(server_url = %config.server_url, app_id = %config.app_id, "configuration loaded");
    Ok(config)
}

fn sign(config: &GatewayConfig) -> Result<()> {
    let signed = TokenSigner::new(config.utc_offset_minutes)
        .make_token(&config.app_id, config.app_secret.expose())?;
    let out = json!({
        "app_id": config.app_id,
        "token": signed.token,
        "timestamp": signed.timestamp,
        "trans_id": signed.trans_id,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_call(config: GatewayConfig, call: &CallArgs) -> Result<()> {
    let client = GatewayClient::from_config(config).context("failed to build gateway client")?;
    let mut request = CommonJsonRequest::new(&call.api_name, &call.api_version)
        .with_api_type(ApiType::from_name(&call.api_type))
        .with_params(call.param_map());

    let response = client
        .execute(&mut request)
        .await
        .with_context(|| format!("call to {} failed", call.api_name))?;

    tracing::info!(
        api = %call.api_name,
        trans_id = request.trans_id(),
        success = response.as_ref().is_some_and(GatewayResponse::is_success),
        "gateway call finished"
    );

    let out = match response {
        Some(response) => json!({
            "trans_id": request.trans_id(),
            "success": response.is_success(),
            "status": response.status(),
            "message": response.message(),
            "data": response.data(),
            "body": response.body(),
        }),
        None => json!({
            "trans_id": request.trans_id(),
            "success": false,
            "body": "",
        }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
