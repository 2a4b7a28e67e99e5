//! Clap derive structures for the `netpulse` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so this module may
//! only depend on `clap` and `clap_complete`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-level CLI ────────────────────────────────────────────────────

/// netpulse -- watch host reachability and interface traffic
#[derive(Debug, Parser)]
#[command(
    name = "netpulse",
    version,
    about = "Monitor host reachability with ping and interface traffic with SNMP",
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "NETPULSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NETPULSE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// One identifier per line
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the configured hosts until interrupted
    Run(RunArgs),

    /// Probe one address once
    Ping(PingArgs),

    /// One-off SNMP queries against an agent
    Snmp(SnmpArgs),

    /// Derive a traffic rate from two counter readings
    Rate(RateArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run a single polling round, print the result and exit
    #[arg(long)]
    pub once: bool,

    /// Override the polling interval (e.g. "10s", "1m")
    #[arg(long)]
    pub interval: Option<String>,
}

// ── Ping ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Hostname or IP address
    pub address: String,

    /// Give up after this long
    #[arg(long, default_value = "3s")]
    pub timeout: String,

    /// ping binary to run (e.g. "ping6")
    #[arg(long)]
    pub program: Option<String>,
}

// ── SNMP ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SnmpArgs {
    #[command(subcommand)]
    pub command: SnmpCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnmpCommand {
    /// Read the octet counters of one interface
    Counters {
        #[command(flatten)]
        agent: AgentArgs,

        /// Interface index (ifIndex)
        #[arg(long, short = 'i')]
        if_index: u32,
    },

    /// List the agent's interfaces
    Interfaces {
        #[command(flatten)]
        agent: AgentArgs,

        /// Column used for interface names
        #[arg(long, default_value = "if-descr")]
        name_source: NameSourceArg,
    },

    /// List the interfaces of a configured host, using its SNMP settings
    Host {
        /// Host id from the config file
        id: String,
    },
}

/// How to reach an SNMP agent.
#[derive(Debug, Args)]
pub struct AgentArgs {
    /// Agent hostname or IP address
    pub address: String,

    /// Community string
    #[arg(
        long,
        short = 'c',
        env = "NETPULSE_COMMUNITY",
        hide_env_values = true,
        default_value = "public"
    )]
    pub community: String,

    /// Protocol version
    #[arg(long, default_value = "v2c")]
    pub snmp_version: SnmpVersionArg,

    /// Agent UDP port
    #[arg(long, default_value = "161")]
    pub port: u16,

    /// Per-request timeout
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SnmpVersionArg {
    V1,
    V2c,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NameSourceArg {
    IfDescr,
    IfName,
    IfAlias,
}

// ── Rate ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RateArgs {
    /// Earlier counter value
    #[arg(long)]
    pub previous: u64,

    /// Later counter value
    #[arg(long)]
    pub current: u64,

    /// Time between the two readings (e.g. "30s")
    #[arg(long)]
    pub elapsed: String,

    /// Counter width in bits
    #[arg(long, default_value = "32")]
    pub width: WidthArg,

    /// Link speed in Mbit/s; lowers the plausibility ceiling
    #[arg(long)]
    pub link_speed_mbps: Option<u64>,

    /// Plausibility ceiling in Mbit/s
    #[arg(long, default_value = "10000")]
    pub max_rate_mbps: f64,

    /// Longest gap that still yields a rate
    #[arg(long, default_value = "5m")]
    pub max_gap: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WidthArg {
    #[value(name = "32")]
    Bits32,
    #[value(name = "64")]
    Bits64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration (secrets redacted)
    Show,

    /// Check the configuration and every host entry
    Validate,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store a host's SNMP community in the system keyring
    SetCommunity {
        /// Host id from the config file
        host: String,

        /// Community string to store
        community: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
