use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use rand::{rng, RngCore};
use tracing::{error, info};

use tokensign::{
    adapters::{SoftToken, SoftTokenFactory, SOFT_TOKEN_VERSION},
    completion_channel,
    model::HexCode,
    sha256, Challenge, Completion, Countdown, DeviceId, KeyHandle, SignMode, SignerConfig,
    SingleSigner, StatusCode, TokenSignError,
};

#[derive(Parser, Debug)]
#[command(name = "tokensign")]
#[command(about = "Challenge-response signing against a single security token", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one signer against an in-memory software token
    Simulate {
        /// Whether to enroll a new credential or sign with an existing one
        #[arg(long, default_value = "sign")]
        mode: ModeArg,

        /// App id to build a challenge for (repeatable, tried in order)
        #[arg(long = "app-id", required = true)]
        app_ids: Vec<String>,

        /// App id the token already holds a credential for (repeatable)
        #[arg(long = "enrolled")]
        enrolled: Vec<String>,

        /// Number of opens the token answers with busy
        #[arg(long, default_value_t = 0)]
        busy_opens: u32,

        /// Number of sign requests the token answers with "touch required"
        #[arg(long, default_value_t = 0)]
        touches: u32,

        /// Status the token answers the first open with, without a handle
        /// (e.g. gone, busy, 0x6984)
        #[arg(long, value_parser = parse_status)]
        open_status: Option<StatusCode>,

        /// Give up after this many milliseconds. Unbounded if not provided
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Log URL forwarded to the device factory
        #[arg(long)]
        log_url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Enroll,
    Sign,
}

impl From<ModeArg> for SignMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Enroll => SignMode::Enroll,
            ModeArg::Sign => SignMode::Sign,
        }
    }
}

fn parse_status(arg: &str) -> Result<StatusCode, TokenSignError> {
    Ok(arg.parse::<StatusCode>()?)
}

struct Simulation {
    mode: SignMode,
    app_ids: Vec<String>,
    enrolled: Vec<String>,
    busy_opens: u32,
    touches: u32,
    open_status: Option<StatusCode>,
    timeout: Option<Duration>,
    log_url: Option<String>,
}

fn foreign_key_handle() -> KeyHandle {
    let mut bytes = vec![0u8; 64];
    rng().fill_bytes(&mut bytes);
    KeyHandle::new(bytes)
}

/// Run one signer; the inner error is the signing outcome when it is not a success.
async fn simulate(sim: Simulation) -> anyhow::Result<Result<(), TokenSignError>> {
    let device_id = DeviceId::new("soft", 0);
    let token = Arc::new(SoftToken::new(SOFT_TOKEN_VERSION));

    let mut registered = Vec::new();
    for app_id in &sim.enrolled {
        let (key_handle, _) = token.register(sha256(app_id.as_bytes())).await;
        registered.push((app_id.as_str(), key_handle));
    }
    token.stay_busy_for(sim.busy_opens).await;
    token.require_touches(sim.touches).await;
    if let Some(status) = sim.open_status {
        token.fail_next_open(status).await;
    }

    let challenges: Vec<Challenge> = sim
        .app_ids
        .iter()
        .map(|app_id| {
            let key_handle = registered
                .iter()
                .find(|(enrolled, _)| *enrolled == app_id)
                .map(|(_, key_handle)| key_handle.clone())
                .unwrap_or_else(foreign_key_handle);
            Challenge::new(
                sha256(format!("challenge for {}", app_id).as_bytes()),
                sha256(app_id.as_bytes()),
                key_handle,
            )
        })
        .collect();

    let mut factory = SoftTokenFactory::new();
    factory.insert(device_id.clone(), token);

    let deadline = match sim.timeout {
        Some(timeout) => Countdown::new(timeout),
        None => Countdown::unbounded(),
    };
    let mut config = SignerConfig::default();
    if let Some(log_url) = sim.log_url {
        config = config.with_log_url(log_url);
    }

    let (sink, completion) = completion_channel();
    let signer = SingleSigner::spawn(
        Arc::new(factory),
        device_id,
        sim.mode,
        sink,
        deadline,
        config,
    );
    signer
        .submit_challenges(challenges.clone())
        .await
        .context("failed to submit challenges")?;

    let completion = completion
        .await
        .context("signer finished without an outcome")?;
    let status = completion.status();
    println!("status: {} ({})", status, HexCode(status));

    match &completion {
        Completion::Signed { challenge, info, .. } => {
            if let Some(index) = challenges.iter().position(|c| c == challenge) {
                println!("app id: {}", sim.app_ids[index]);
            }
            if let Some(info) = info {
                println!("payload: {}", hex::encode(info));
            }
        }
        Completion::Unenrolled { .. } => {
            info!("Token holds no credential for the supplied app ids");
        }
        Completion::Failed { status } => return Ok(Err(TokenSignError::Device(*status))),
    }

    Ok(Ok(()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .init();

    match cli.command {
        Commands::Simulate {
            mode,
            app_ids,
            enrolled,
            busy_opens,
            touches,
            open_status,
            timeout_ms,
            log_url,
        } => {
            let sim = Simulation {
                mode: mode.into(),
                app_ids,
                enrolled,
                busy_opens,
                touches,
                open_status,
                timeout: timeout_ms.map(Duration::from_millis),
                log_url,
            };
            if let Err(err) = simulate(sim).await? {
                error!("Signing did not succeed: {}", err);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
