//! # vg — VIGILIA client
//!
//! Ships one request to a running hub over TCP and prints the raw
//! response. The request comes from the command line or stdin:
//!
//! - `vg query "GET servicegroups" "Columns: name num_services"`
//! - `vg query < request.txt`

use std::io::Read;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// 🛰 VIGILIA — live monitoring status queries.
#[derive(Parser)]
#[command(name = "vg", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a query to the hub and print the response.
    Query {
        /// Hub address.
        #[arg(long, default_value = "127.0.0.1:6557")]
        connect: String,

        /// Request lines; stdin is read when none are given.
        lines: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    match cli.command {
        Commands::Query { connect, lines } => {
            let mut request = if lines.is_empty() {
                let mut text = String::new();
                if std::io::stdin().read_to_string(&mut text).is_err() {
                    eprintln!("Error: could not read request from stdin");
                    std::process::exit(1);
                }
                text
            } else {
                lines.join("\n")
            };
            // One blank line terminates the request.
            while request.ends_with('\n') {
                request.pop();
            }
            request.push_str("\n\n");

            rt.block_on(async move {
                let mut stream = match TcpStream::connect(&connect).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        eprintln!("Error: cannot connect to {connect}: {e}");
                        std::process::exit(1);
                    }
                };
                if let Err(e) = stream.write_all(request.as_bytes()).await {
                    eprintln!("Error: send failed: {e}");
                    std::process::exit(1);
                }
                let mut response = Vec::new();
                if let Err(e) = stream.read_to_end(&mut response).await {
                    eprintln!("Error: receive failed: {e}");
                    std::process::exit(1);
                }
                print!("{}", String::from_utf8_lossy(&response));
            });
        }
    }
}
