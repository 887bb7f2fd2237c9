use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "stream-cancel",
    version,
    about = "Serve and probe streaming fixtures that must stop when the client disconnects"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run the fixture server
    Serve(ServeArgs),

    /// Prime each route, drop the connection, and check how far it streamed
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// TOML config file; every field is optional
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `listen` from the config file
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Args, Debug)]
pub(crate) struct ProbeArgs {
    /// Base URL of a running fixture server
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    pub base_url: String,

    /// Route to probe; repeat for several. Defaults to every fixture route
    #[arg(long = "route")]
    pub routes: Vec<String>,

    /// Largest counter value that still counts as cancelled in time
    #[arg(long, default_value_t = 5)]
    pub max: u64,

    /// Print the reports as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_defaults() {
        let cli = Cli::try_parse_from(["stream-cancel", "probe"]).expect("parse");
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.base_url, "http://127.0.0.1:3000");
        assert!(args.routes.is_empty());
        assert_eq!(args.max, 5);
    }

    #[test]
    fn serve_accepts_listen_override() {
        let cli = Cli::try_parse_from([
            "stream-cancel",
            "--json-logs",
            "serve",
            "--listen",
            "0.0.0.0:9000",
        ])
        .expect("parse");
        assert!(cli.json_logs);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen, Some("0.0.0.0:9000".parse().expect("addr")));
        assert!(args.config.is_none());
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["stream-cancel", "serve", "--listen", "nowhere"]).is_err());
    }
}
