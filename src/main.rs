use std::{io, path::PathBuf, process::ExitCode};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use email_backend::{
    client::{ClientConfig, MailClient},
    config::{self, Config, TracingConfig},
    observability::logging,
    server::{self, Server},
};

#[derive(Parser)]
#[command(name = "email-backend")]
#[command(about = "The Email microservice", version)]
#[command(long_about = "To get started run the serve subcommand which will start a server

    email-backend serve

After that you can test it with the send-mail subcommand:

    email-backend send-mail a b c

Or over HTTP 1.1 with curl:

    curl -k https://localhost:9091/v1alpha1/email \\
        -H 'Content-Type: application/json' -d '{\"message\":\"abc\"}'")]
struct Cli {
    /// Config file (defaults to $EMAIL_BACKEND_CONFIG, then config.yaml).
    /// EMAIL_BACKEND_* environment variables override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Turn on debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launches the Email backend service
    Serve(ServeArgs),
    /// Sends every message through the gRPC API and prints the responses
    SendMail(SendMailArgs),
    /// Writes the shell completion script to stdout
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Interface the server listens on
    #[arg(long)]
    host: Option<String>,

    /// The port on which the server will listen for incoming requests
    #[arg(short, long)]
    port: Option<u16>,

    /// PEM certificate presented to clients
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// PEM private key matching the certificate
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Serve plaintext HTTP/1.1 and h2c instead of TLS
    #[arg(long)]
    insecure: bool,
}

#[derive(Args)]
struct SendMailArgs {
    /// Server URI
    #[arg(short, long, default_value = "https://localhost:9091")]
    address: String,

    /// Root certificate used to verify the server
    #[arg(long, default_value = "certs/server.pem", conflicts_with = "insecure")]
    ca_file: PathBuf,

    /// Override the name checked against the server certificate
    #[arg(long)]
    server_name: Option<String>,

    /// Connect without TLS (h2c)
    #[arg(long)]
    insecure: bool,

    /// Messages to send, one request each
    #[arg(required = true)]
    messages: Vec<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(cert_file) = self.cert_file {
            config.server.cert_file = cert_file;
        }
        if let Some(key_file) = self.key_file {
            config.server.key_file = key_file;
        }
        if self.insecure {
            config.server.secure = false;
        }
    }
}

async fn serve(config: Config) -> ExitCode {
    tracing::info!(
        "Initialize backend server on {}:{}",
        config.server.host,
        config.server.port
    );

    let server = match Server::build(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(server::shutdown_signal(
        server.handle(),
        config.server.shutdown_grace_period,
    ));

    match server.serve().await {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn send_mail(args: SendMailArgs) -> ExitCode {
    let client_config = ClientConfig {
        address: args.address,
        ca_file: (!args.insecure).then_some(args.ca_file),
        server_name: args.server_name,
    };

    let mut client = match MailClient::connect(client_config).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    for message in args.messages {
        match client.send_mail(message).await {
            Ok(response) => match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("Unable to format response: {e}"),
            },
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_completion(shell: Shell, out: &mut impl io::Write) {
    clap_complete::generate(shell, &mut Cli::command(), "email-backend", out);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Completion { shell } = cli.command {
        print_completion(shell, &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let loaded = config::resolve_config_file(cli.config.as_deref()).and_then(|file| {
        config::load_config(file.as_deref()).map(|config| (file, config))
    });
    let (file, mut config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            let _telemetry = logging::init(cli.debug, &TracingConfig::default());
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Log setup
    let _telemetry = logging::init(cli.debug || config.debug, &config.tracing);

    match file {
        Some(path) if path.ends_with(config::EXAMPLE_CONFIG_FILE) => tracing::warn!(
            "Using '{}'. This file should not be used and should be replaced with actual data",
            path.display()
        ),
        Some(path) => tracing::info!("Loaded configuration from '{}'", path.display()),
        None => tracing::info!("No config file found, using defaults and environment variables"),
    }

    match cli.command {
        Commands::Serve(args) => {
            args.apply(&mut config);
            serve(config).await
        }
        Commands::SendMail(args) => send_mail(args).await,
        Commands::Completion { .. } => ExitCode::SUCCESS,
    }
}
