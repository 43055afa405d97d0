use adns::dns::ResolverArgs;
use adns::lookup::{self, Target};
use adns_client::QueryFlags;
use adns_client::dns::{RecordClass, RecordType};
use clap::Parser;
use std::process::ExitCode;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;

/// adns-ns: Look up the NS records of a domain
#[derive(Debug, Parser)]
#[command(name = "adns-ns", version = clap::crate_version!())]
struct NsConfig {
    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case-insensitive).
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    #[command(flatten)]
    resolver: ResolverArgs,

    /// Apply the search list from resolv.conf to relative domain names.
    #[arg(long, default_value_t = false)]
    search: bool,

    /// Domain name to look up.
    #[arg(required = true)]
    domain: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = NsConfig::parse();

    let console_subscriber =
        adns::tracing::console_subscriber(opts.log_level).expect("failed to setup console logging");
    tracing::subscriber::set_global_default(console_subscriber).expect("failed to initialize console logging");

    let flags = QueryFlags {
        search: opts.search,
        ..Default::default()
    };

    lookup::run(&opts.resolver, &Target::Name(opts.domain), RecordType::NS, RecordClass::INET, flags).await
}
