use adns::dns::ResolverArgs;
use adns::lookup::{self, Target};
use adns_client::QueryFlags;
use adns_client::dns::{RecordClass, RecordType};
use clap::Parser;
use std::process::ExitCode;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;

/// adns-ptr: Look up the PTR records of an IP address or reverse-lookup name
#[derive(Debug, Parser)]
#[command(name = "adns-ptr", version = clap::crate_version!())]
struct PtrConfig {
    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case-insensitive).
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    #[command(flatten)]
    resolver: ResolverArgs,

    /// IPv4 or IPv6 address to look up, or a name under in-addr.arpa or ip6.arpa.
    #[arg(required = true)]
    address: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = PtrConfig::parse();

    let console_subscriber =
        adns::tracing::console_subscriber(opts.log_level).expect("failed to setup console logging");
    tracing::subscriber::set_global_default(console_subscriber).expect("failed to initialize console logging");

    let target = Target::name_or_addr(&opts.address);
    lookup::run(&opts.resolver, &target, RecordType::PTR, RecordClass::INET, QueryFlags::default()).await
}
