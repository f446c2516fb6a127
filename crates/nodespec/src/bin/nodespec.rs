use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use cli_table::format::{Justify, Separator};
use cli_table::{Cell, CellStruct, Style, Table, print_stdout};

use nodespec::common::format::human_size;
use nodespec::common::setup::setup_logging;
use nodespec::resources::{MEMORY_RESOURCE_NAME, OBJECT_STORE_MEMORY_RESOURCE_NAME};
use nodespec::{Map, ResolveContext, ResourcePolicy, ResourceSpec};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputMode {
    Cli,
    Json,
}

/// Resolves the resources that this node offers to the cluster.
#[derive(Parser)]
#[command(version, about)]
struct RootOptions {
    /// Number of CPUs offered by the node [default: detected]
    #[arg(long)]
    num_cpus: Option<f64>,

    /// Number of accelerators offered by the node [default: detected]
    #[arg(long)]
    num_gpus: Option<f64>,

    /// Memory for tasks and actors in bytes [default: what remains after the object store]
    #[arg(long)]
    memory: Option<u64>,

    /// Object store size in bytes [default: a proportion of available memory]
    #[arg(long)]
    object_store_memory: Option<u64>,

    /// Memory cap of each redis shard in bytes
    #[arg(long)]
    redis_max_memory: Option<u64>,

    /// Custom resources as a JSON object, e.g. '{"custom": 2}'
    #[arg(long, value_parser = parse_resources)]
    resources: Option<Map<String, f64>>,

    /// Resolve resources for the head node
    #[arg(long)]
    head: bool,

    /// Address of this node [default: detected]
    #[arg(long)]
    node_ip_address: Option<String>,

    /// Path to a TOML file with the resource policy
    #[arg(long, env = "NODESPEC_CONFIG")]
    config: Option<PathBuf>,

    /// How the resolved resources are printed
    #[arg(long, value_enum, default_value_t = OutputMode::Cli)]
    output_mode: OutputMode,

    /// Enables more detailed log output
    #[arg(long)]
    debug: bool,
}

fn parse_resources(value: &str) -> Result<Map<String, f64>, serde_json::Error> {
    serde_json::from_str(value)
}

fn format_quantity(name: &str, value: f64) -> String {
    if name == MEMORY_RESOURCE_NAME || name == OBJECT_STORE_MEMORY_RESOURCE_NAME {
        format!("{value} ({})", human_size(value as u64))
    } else {
        value.to_string()
    }
}

fn print_resource_table(map: &Map<String, f64>) -> anyhow::Result<()> {
    let rows: Vec<Vec<CellStruct>> = map
        .iter()
        .map(|(name, value)| {
            vec![
                name.cell().bold(true),
                format_quantity(name, *value).cell().justify(Justify::Right),
            ]
        })
        .collect();
    let table = rows
        .table()
        .separator(
            Separator::builder()
                .title(Some(Default::default()))
                .column(Some(Default::default()))
                .build(),
        )
        .title(vec![
            "Resource".cell().bold(true),
            "Amount".cell().bold(true),
        ]);
    print_stdout(table)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = RootOptions::parse();
    setup_logging(opts.debug);

    let policy = match &opts.config {
        Some(path) => ResourcePolicy::from_toml_file(path)?,
        None => ResourcePolicy::default(),
    }
    .with_env_overrides()?;

    let spec = ResourceSpec {
        num_cpus: opts.num_cpus,
        num_gpus: opts.num_gpus,
        memory: opts.memory,
        object_store_memory: opts.object_store_memory,
        resources: opts.resources,
        redis_max_memory: opts.redis_max_memory,
    };
    let ctx = ResolveContext::local(policy);
    let resolved = spec.resolve(opts.head, opts.node_ip_address.as_deref(), &ctx)?;
    let map = resolved.to_resource_map(ctx.policy().max_resource_quantity)?;

    match opts.output_mode {
        OutputMode::Cli => print_resource_table(&map)?,
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&map)?),
    }
    Ok(())
}
