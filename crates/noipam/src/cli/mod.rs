//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use serde::Serialize;
use serde_json::{Value, json};

use crate::api::{CreateEndpointRequest, CreateNetworkRequest};
use crate::config::DriverConfig;
use crate::driver::Driver;
use crate::options::{GENERIC_DATA, INTERNAL, MODE_OPT, PARENT_OPT, RawOptions};

/// Noipam - macvlan networks without IP address management
#[derive(Parser)]
#[command(name = "noipam")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for driver state
    #[arg(
        long,
        global = true,
        env = "NOIPAM_ROOT",
        default_value = "/var/lib/noipam"
    )]
    pub root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show driver capabilities
    Capabilities,

    /// Manage networks
    Network {
        /// Network subcommand.
        #[command(subcommand)]
        command: NetworkCommand,
    },

    /// Manage endpoints
    Endpoint {
        /// Endpoint subcommand.
        #[command(subcommand)]
        command: EndpointCommand,
    },
}

/// Network commands.
#[derive(Subcommand)]
pub enum NetworkCommand {
    /// Create a network
    Create {
        /// Network ID
        network_id: String,

        /// Parent interface; a dummy link is created when empty
        #[arg(short, long, default_value = "")]
        parent: String,

        /// Macvlan mode (bridge, private, vepa, passthru)
        #[arg(short, long, default_value = "")]
        mode: String,

        /// Isolate the network from external connectivity
        #[arg(long)]
        internal: bool,

        /// IPv4 pool handed over by the runtime (only 0.0.0.0/0 is accepted)
        #[arg(long = "ipv4-pool")]
        ipv4_pools: Vec<String>,

        /// Extra driver options as key=value
        #[arg(short = 'o', long = "opt", value_parser = parse_key_val)]
        opts: Vec<(String, String)>,
    },

    /// Delete a network and its endpoints
    Rm {
        /// Network ID
        network_id: String,
    },

    /// List networks
    Ls {
        /// Only display network IDs
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Endpoint commands.
#[derive(Subcommand)]
pub enum EndpointCommand {
    /// Create an endpoint
    Create {
        /// Network ID
        network_id: String,

        /// Endpoint ID
        endpoint_id: String,

        /// MAC address to assign; generated when omitted
        #[arg(long)]
        mac: Option<String>,
    },

    /// Create the endpoint's host interface
    Join {
        /// Network ID
        network_id: String,

        /// Endpoint ID
        endpoint_id: String,
    },

    /// Detach an endpoint
    Leave {
        /// Network ID
        network_id: String,

        /// Endpoint ID
        endpoint_id: String,
    },

    /// Delete an endpoint and its interface
    Rm {
        /// Network ID
        network_id: String,

        /// Endpoint ID
        endpoint_id: String,
    },

    /// Show endpoint details
    Inspect {
        /// Network ID
        network_id: String,

        /// Endpoint ID
        endpoint_id: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid option '{s}', expected key=value"))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be set up or the command fails.
    pub fn execute(self) -> Result<()> {
        if matches!(self.command, Commands::Capabilities) {
            return print_json(&Driver::capabilities());
        }

        let config = DriverConfig::default().with_root(self.root);
        let driver = Driver::with_defaults(config)
            .map_err(|e| eyre!("Failed to initialize driver: {e}"))?;
        driver
            .restore()
            .map_err(|e| eyre!("Failed to restore driver state: {e}"))?;

        match self.command {
            Commands::Capabilities => print_json(&Driver::capabilities()),
            Commands::Network { command } => execute_network(&driver, command),
            Commands::Endpoint { command } => execute_endpoint(&driver, command),
        }
    }
}

fn execute_network(driver: &Driver, command: NetworkCommand) -> Result<()> {
    match command {
        NetworkCommand::Create {
            network_id,
            parent,
            mode,
            internal,
            ipv4_pools,
            opts,
        } => {
            let mut generic = RawOptions::new();
            generic.insert(PARENT_OPT.to_string(), Value::String(parent));
            generic.insert(MODE_OPT.to_string(), Value::String(mode));
            for (key, value) in opts {
                generic.insert(key, Value::String(value));
            }

            let mut request = CreateNetworkRequest::new(network_id.as_str());
            request
                .options
                .insert(GENERIC_DATA.to_string(), Value::Object(generic));
            request
                .options
                .insert(INTERNAL.to_string(), Value::Bool(internal));
            for pool in ipv4_pools {
                request = request.with_ipv4_pool(pool);
            }

            let creation = driver
                .create_network(&request)
                .map_err(|e| eyre!("Failed to create network: {e}"))?;
            print_json(&json!({ "network": network_id, "status": creation }))
        }

        NetworkCommand::Rm { network_id } => {
            driver
                .delete_network(&network_id)
                .map_err(|e| eyre!("Failed to delete network: {e}"))?;
            println!("Network {network_id} deleted");
            Ok(())
        }

        NetworkCommand::Ls { quiet } => {
            let networks = driver.networks();
            if quiet {
                for network in networks {
                    println!("{}", network.id);
                }
                Ok(())
            } else {
                print_json(&networks)
            }
        }
    }
}

fn execute_endpoint(driver: &Driver, command: EndpointCommand) -> Result<()> {
    match command {
        EndpointCommand::Create {
            network_id,
            endpoint_id,
            mac,
        } => {
            let mut request = CreateEndpointRequest::new(network_id, endpoint_id);
            if let Some(mac) = mac {
                request = request.with_mac(mac);
            }
            let response = driver
                .create_endpoint(&request)
                .map_err(|e| eyre!("Failed to create endpoint: {e}"))?;
            print_json(&response)
        }

        EndpointCommand::Join {
            network_id,
            endpoint_id,
        } => {
            let joined = driver
                .join(&network_id, &endpoint_id)
                .map_err(|e| eyre!("Failed to join endpoint: {e}"))?;
            print_json(&joined)
        }

        EndpointCommand::Leave {
            network_id,
            endpoint_id,
        } => {
            driver
                .leave(&network_id, &endpoint_id)
                .map_err(|e| eyre!("Failed to leave endpoint: {e}"))?;
            println!("Endpoint {endpoint_id} left");
            Ok(())
        }

        EndpointCommand::Rm {
            network_id,
            endpoint_id,
        } => {
            driver
                .delete_endpoint(&network_id, &endpoint_id)
                .map_err(|e| eyre!("Failed to delete endpoint: {e}"))?;
            println!("Endpoint {endpoint_id} deleted");
            Ok(())
        }

        EndpointCommand::Inspect {
            network_id,
            endpoint_id,
        } => {
            let info = driver
                .endpoint_info(&network_id, &endpoint_id)
                .map_err(|e| eyre!("Failed to inspect endpoint: {e}"))?;
            print_json(&info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_network_create() {
        let cli = Cli::try_parse_from([
            "noipam", "--root", "/tmp/x", "network", "create", "net1", "-p", "eth0.10", "-m",
            "vepa", "-o", "foo=bar",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
        let Commands::Network {
            command: NetworkCommand::Create {
                parent, mode, opts, ..
            },
        } = cli.command
        else {
            panic!("expected network create");
        };
        assert_eq!(parent, "eth0.10");
        assert_eq!(mode, "vepa");
        assert_eq!(opts, vec![("foo".to_string(), "bar".to_string())]);
    }

    #[test]
    fn rejects_malformed_opts() {
        assert!(parse_key_val("novalue").is_err());
        assert_eq!(
            parse_key_val("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
    }
}
