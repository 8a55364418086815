use balloon::{
    Address,
    aprs::parse,
    aprsis::{
        self,
        AprsIsClient,
    },
    config::{
        Config,
        FlightArgs,
        TncArgs,
    },
    flight::Flight,
    link::Link,
    tnc,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
            shutdown.cancel();
        }
    });

    match args.command {
        Command::Fly(args) => {
            let config = Config::try_from(args)?;
            Flight::new(config).run(shutdown).await?;
        }
        Command::Monitor(args) => {
            let link = Link::new("tnc", args.transport()?);
            let (_outbound_tx, outbound_rx) = mpsc::channel(1);
            let (inbound_tx, mut inbound_rx) = mpsc::channel(16);

            let task = tokio::spawn({
                let shutdown = shutdown.clone();
                async move { tnc::run(&link, outbound_rx, inbound_tx, shutdown).await }
            });

            while let Some(packet) = inbound_rx.recv().await {
                println!("{packet}");
                println!("  {:?}", parse(&packet));
            }

            task.await??;
        }
        Command::AprsIs {
            server,
            callsign,
            filter,
        } => {
            let mut client = AprsIsClient::connect(&server, &callsign, filter.as_deref()).await?;

            loop {
                let packet = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    packet = client.next_packet() => packet?,
                };
                let Some(packet) = packet
                else {
                    break;
                };

                println!("{packet}");
                println!("  {:?}", parse(&packet));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the flight controller.
    Fly(FlightArgs),
    /// Prints packets received by the TNC.
    Monitor(TncArgs),
    /// Prints packets received from APRS-IS.
    AprsIs {
        #[clap(long, env = "BALLOON_APRS_IS_SERVER", default_value = aprsis::DEFAULT_SERVER)]
        server: String,

        #[clap(long, env = "BALLOON_CALLSIGN")]
        callsign: Address,

        /// Server-side filter, e.g. `r/47.2/-122.4/100`.
        #[clap(long)]
        filter: Option<String>,
    },
}
