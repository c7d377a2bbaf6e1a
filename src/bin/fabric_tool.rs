use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use shardfabric::{
    ConfigProvider, ConnectionNameResolver, DatabaseConfigurations, FabricOptions,
    HealthRegistry, Role, ShardContext,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fabric-tool")]
#[command(about = "Inspect shard/replica connection routing for a configuration file")]
struct Cli {
    /// JSON file of connection configurations keyed by name
    #[arg(long, short)]
    config: PathBuf,

    /// Environment segment of connection names
    #[arg(long, short, default_value = "development")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Topology {
    #[arg(long)]
    prefix: Option<String>,
    #[arg(long)]
    shard_by: Option<String>,
    #[arg(long)]
    replicated: bool,
}

impl Topology {
    fn options(&self) -> FabricOptions {
        let mut options = FabricOptions::new();
        if let Some(prefix) = &self.prefix {
            options = options.prefix(prefix);
        }
        if let Some(group) = &self.shard_by {
            options = options.shard_by(group);
        }
        if self.replicated {
            options = options.replicated();
        }
        options
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the connection name a call would resolve to
    Resolve {
        #[command(flatten)]
        topology: Topology,
        /// Active shard for --shard-by
        #[arg(long)]
        shard: Option<String>,
        #[arg(long, default_value = "slave")]
        role: String,
    },
    /// List shards of a group configured for the environment
    Shards {
        #[command(flatten)]
        topology: Topology,
    },
    /// List replica groups with their lag check settings
    Replicas,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let configs = DatabaseConfigurations::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Resolve { topology, shard, role } => {
            let options = topology.options();
            options.validate()?;
            let role: Role = role.parse()?;

            let mut shards = ShardContext::new();
            match (&options.shard_by, shard) {
                (Some(group), Some(value)) => shards.activate([(group, value)]),
                (Some(group), None) => return Err(anyhow!("--shard is required with --shard-by {}", group)),
                (None, _) => {}
            }

            let resolver = ConnectionNameResolver::new(&options, &cli.env);
            let name = resolver.resolve(&shards, role)?;
            match configs.lookup(&name) {
                Some(config) => println!("{} -> {}", name, config.to_url()),
                None => println!("{} (not configured)", name),
            }
        }
        Command::Shards { topology } => {
            let resolver = ConnectionNameResolver::new(&topology.options(), &cli.env);
            for shard in resolver.shard_names(configs.names())? {
                println!("{}", shard);
            }
        }
        Command::Replicas => {
            let health = HealthRegistry::from_configurations(&configs);
            if health.is_empty() {
                println!("No replica configurations");
            }
            for status in health.iter() {
                println!(
                    "{}: check every {:?}, behind above {:?}",
                    status.name(),
                    status.poller().check_interval(),
                    status.poller().threshold()
                );
            }
        }
    }

    Ok(())
}
