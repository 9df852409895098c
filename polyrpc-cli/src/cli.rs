use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "polyrpc", about = "Local smoke-test harness for a polyrpc-core service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the bundled demo service over Connect, gRPC, gRPC-Web and JSON-RPC on one port.
    Serve {
        /// Port to listen on (0 for ephemeral)
        #[arg(short = 'p', long = "port", default_value_t = 0)]
        port: u16,
    },
    /// Print the demo service's descriptor set as `.proto` source, without starting a listener.
    Descriptors,
}
