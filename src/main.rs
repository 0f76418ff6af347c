use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = openvpn_cred_management::cli::Cli::parse();
    cli.run()
}
