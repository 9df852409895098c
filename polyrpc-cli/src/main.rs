mod cli;
mod demo;
mod transport;

use std::process;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use polyrpc_core::{Router, RouterOptions};
use prost_reflect::DescriptorPool;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => {
            if let Err(err) = serve(port).await {
                eprintln!("Failed to serve demo service: {err}");
                process::exit(1);
            }
        }
        Command::Descriptors => {
            if let Err(err) = print_descriptors() {
                eprintln!("Failed to build descriptors: {err}");
                process::exit(1);
            }
        }
    }
}

async fn serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let (service, descriptor_set) = demo::build()?;
    let mut router = Router::new(RouterOptions::default());
    router.register_service(service, descriptor_set)?;

    let addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse()?;
    transport::serve(Arc::new(router), addr).await?;
    Ok(())
}

fn print_descriptors() -> Result<(), Box<dyn std::error::Error>> {
    let (_service, descriptor_set) = demo::build()?;
    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set)?;
    for file in pool.files() {
        print!("{}", polyrpc_core::proto_text::format_proto_file(&file));
    }
    Ok(())
}
