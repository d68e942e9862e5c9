use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use flwr::client::Client;
use flwr::config::{ClientConfig, Transport};
use flwr::typing;
use flwr::{logging, start};
use tracing::{error, info};

/// Connect a demo node to a Flower server and serve tasks until disconnected.
#[derive(Debug, Parser)]
#[command(name = "flwr-client", version)]
struct Cli {
    /// YAML configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server address, e.g. `127.0.0.1:9092` or `dns:///fleet.example.com:9092`.
    #[arg(long)]
    server_address: Option<String>,

    /// `rere` (Fleet API) or `bidi` (legacy stream).
    #[arg(long)]
    transport: Option<Transport>,

    #[arg(long)]
    tls: bool,

    /// PEM file with root certificates to trust (implies --tls).
    #[arg(long)]
    root_certificates: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> flwr::Result<ClientConfig> {
        let mut cfg = match &self.config {
            Some(path) => ClientConfig::load_required(path)?,
            None => ClientConfig::default(),
        };
        if let Some(address) = self.server_address {
            cfg.server_address = address;
        }
        if let Some(transport) = self.transport {
            cfg.transport = transport;
        }
        if self.root_certificates.is_some() {
            cfg.root_certificates = self.root_certificates;
            cfg.use_tls = true;
        }
        cfg.use_tls |= self.tls;
        Ok(cfg)
    }
}

/// Returns a one-byte model and reports one example for every round.
struct DemoClient;

impl Client for DemoClient {
    fn get_parameters(&self, _ins: typing::GetParametersIns) -> typing::GetParametersRes {
        info!("get_parameters");
        typing::GetParametersRes {
            status: typing::Status::ok(),
            parameters: typing::Parameters {
                tensors: vec![vec![1]],
                tensor_type: String::new(),
            },
        }
    }

    fn get_properties(&self, _ins: typing::GetPropertiesIns) -> typing::GetPropertiesRes {
        info!("get_properties");
        typing::GetPropertiesRes {
            status: typing::Status::ok(),
            properties: Default::default(),
        }
    }

    fn fit(&self, ins: typing::FitIns) -> typing::FitRes {
        info!(tensors = ins.parameters.tensors.len(), "fit");
        typing::FitRes {
            status: typing::Status::ok(),
            parameters: ins.parameters,
            num_examples: 1,
            metrics: Default::default(),
        }
    }

    fn evaluate(&self, _ins: typing::EvaluateIns) -> typing::EvaluateRes {
        info!("evaluate");
        typing::EvaluateRes {
            status: typing::Status::ok(),
            loss: 1.0,
            num_examples: 1,
            metrics: Default::default(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match Cli::parse().into_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = logging::init_logging(&cfg.logging) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    match start::start_client(&cfg, Arc::new(DemoClient)).await {
        Ok(outcome) => {
            match outcome.reconnect_after {
                Some(after) => info!(?after, "server asked to reconnect later"),
                None => info!("disconnect and shut down"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "client stopped");
            ExitCode::FAILURE
        }
    }
}
