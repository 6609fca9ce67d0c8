//! # cltv: Time-Locked Bitcoin Addresses
//!
//! `create` prints the P2SH address that locks funds to a key until a block
//! height or timestamp. `spend` sweeps everything paid to that address once
//! the lock has matured. `decode` explains a raw transaction.
//!
//! Node credentials come from `.env` / the environment (`RPC_HOST`,
//! `RPC_PORT`, `RPC_USER`, `RPC_PASSWORD`, `RPC_WALLET`) and can be overridden
//! with flags. The wallet must watch the P2SH address for `spend` to find
//! its funds.

use anyhow::{Context, Result};
use bitcoin_cltv::config::{self, env as config_env, NodeConfig};
use bitcoin_cltv::contract::{Maturity, SubmitOutcome};
use bitcoin_cltv::tx_decoder::TransactionDecoder;
use bitcoin_cltv::utils::{amount, txid};
use bitcoin_cltv::{
    Address, BitcoinNodeClient, FeeRate, FeeRateClient, LockError, Network, SigningKey,
    TimelockContract,
};
use clap::{Args, Parser, Subcommand};
use std::env;

#[derive(Parser)]
#[command(name = "cltv")]
#[command(about = "Lock bitcoin to a P2SH address until a block height or time")]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct NodeArgs {
    /// Network: mainnet, testnet or regtest
    #[arg(long, global = true, default_value = "testnet")]
    network: Network,
    /// RPC host (overrides RPC_HOST)
    #[arg(long, global = true)]
    rpc_host: Option<String>,
    /// RPC port (overrides RPC_PORT)
    #[arg(long, global = true)]
    rpc_port: Option<u16>,
    /// RPC user (overrides RPC_USER)
    #[arg(long, global = true)]
    rpc_user: Option<String>,
    /// RPC password (overrides RPC_PASSWORD)
    #[arg(long, global = true)]
    rpc_password: Option<String>,
    /// Wallet watching the locked address (overrides RPC_WALLET)
    #[arg(long, global = true)]
    rpc_wallet: Option<String>,
}

impl NodeArgs {
    fn config(&self) -> Result<NodeConfig> {
        let mut config = NodeConfig::from_env(self.network)?;
        if let Some(host) = &self.rpc_host {
            config.host = host.clone();
        }
        if let Some(port) = self.rpc_port {
            config.port = port;
        }
        if let Some(user) = &self.rpc_user {
            config.user = user.clone();
        }
        if let Some(password) = &self.rpc_password {
            config.password = password.clone();
        }
        if let Some(wallet) = &self.rpc_wallet {
            config.wallet = Some(wallet.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the time-locked P2SH address for a key
    Create {
        /// Private key, WIF or hex (defaults to PRIVATE_KEY)
        #[arg(short, long)]
        key: Option<String>,
        /// Block height or UNIX timestamp (defaults to the next block)
        #[arg(short, long)]
        lock: Option<i64>,
    },
    /// Sweep the funds of a matured time-locked address
    Spend {
        /// Private key, WIF or hex (defaults to PRIVATE_KEY)
        #[arg(short, long)]
        key: Option<String>,
        /// Block height or UNIX timestamp the address was created with
        #[arg(short, long)]
        lock: i64,
        /// P2PKH or P2SH address receiving the funds
        #[arg(short, long)]
        destination: String,
        /// Fee rate in sat/byte (defaults to the price feed)
        #[arg(long)]
        fee_rate: Option<f64>,
        /// Build and check the transaction without broadcasting it
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Explain a raw transaction
    Decode {
        /// Transaction hex
        hex: String,
        /// Print JSON instead of a report
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create { key, lock } => {
            create(&cli.node, key, lock)?;
        }
        Commands::Spend {
            key,
            lock,
            destination,
            fee_rate,
            dry_run,
        } => {
            spend(&cli.node, key, lock, &destination, fee_rate, dry_run).await?;
        }
        Commands::Decode { hex, json } => {
            decode(cli.node.network, &hex, json)?;
        }
    }

    Ok(())
}

fn load_key(key: Option<String>) -> Result<SigningKey> {
    dotenv::dotenv().ok();
    let raw = match key {
        Some(raw) => raw,
        None => env::var(config_env::PRIVATE_KEY)
            .with_context(|| format!("no --key given and {} is not set", config_env::PRIVATE_KEY))?,
    };
    Ok(raw.parse::<SigningKey>()?)
}

fn create(node: &NodeArgs, key: Option<String>, lock: Option<i64>) -> Result<()> {
    let key = load_key(key)?;
    let network = node.network;

    let contract = match lock {
        Some(lock) => TimelockContract::for_key(lock, &key, network)?,
        None => {
            let client = BitcoinNodeClient::new(&node.config()?)?;
            TimelockContract::next_block(&client, key.pub_key_hash(), network)?
        }
    };

    let lock = contract.lock();
    println!("Lock {}: {}", lock.kind(), lock.lock_value());
    println!("Public key hash: {}", hex::encode(lock.pub_key_hash()));
    println!("Redeem script: {}", contract.locking_script());
    println!("Redeem script hex: {}", contract.locking_script().to_hex());
    println!("P2SH address ({}): {}", network, contract.address());
    println!(
        "\nSend funds to this address; they unlock once the chain passes {}",
        lock.lock_value()
    );

    Ok(())
}

async fn spend(
    node: &NodeArgs,
    key: Option<String>,
    lock: i64,
    destination: &str,
    fee_rate: Option<f64>,
    dry_run: bool,
) -> Result<()> {
    let key = load_key(key)?;
    let network = node.network;
    let contract = TimelockContract::for_key(lock, &key, network)?;
    let destination: Address = destination
        .parse()
        .with_context(|| format!("invalid destination {}", destination))?;

    println!("Lock {}: {}", contract.lock().kind(), contract.lock().lock_value());
    println!("Redeem script: {}", contract.locking_script());
    println!("P2SH address: {}", contract.address());

    let client = BitcoinNodeClient::new(&node.config()?)?;
    match contract.maturity(&client)? {
        Maturity::Mature => println!("Lock status: spendable"),
        pending => println!("Lock status: {} (the node will refuse the spend)", pending),
    }

    let fee_rate = FeeRate::from_sats_per_byte(resolve_fee_rate(network, fee_rate).await?)?;
    println!("Fee rate: {}", fee_rate);

    let mut spend = match contract.prepare_spend(&client, &key, &destination, fee_rate) {
        Ok(spend) => spend,
        Err(LockError::NoFundsAvailable { address }) => {
            println!("No funds available at {}, nothing to spend", address);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for utxo in spend.utxos.iter() {
        println!(
            "  UTXO {}:{} {} ({} confirmations)",
            txid::format_short(&utxo.txid.to_string()),
            utxo.vout,
            amount::format_dual(utxo.value),
            utxo.confirmations
        );
    }
    println!(
        "Funds: {} in {} outputs, {} confirmations at least",
        amount::format_dual(spend.utxos.total_value()),
        spend.utxos.len(),
        spend.utxos.min_confirmations().unwrap_or(0)
    );
    println!("Destination: {}", spend.destination);

    for pass in &spend.built.plan.passes {
        println!(
            "  pass {}: amount {} sats, fee {} sats, size {} bytes",
            pass.pass, pass.amount, pass.fee, pass.size
        );
    }
    println!(
        "Sending {} with fee {} sats",
        amount::format_dual(spend.built.plan.amount),
        spend.built.plan.fee
    );

    println!("\nRaw unsigned transaction:\n{}", spend.unsigned_hex());
    println!("\nRaw signed transaction:\n{}", spend.signed_hex());
    println!("\nTransaction id: {}", spend.txid());

    if dry_run {
        let acceptance = bitcoin_cltv::NodeRpc::test_mempool_accept(&client, &spend.signed_hex())?;
        println!("Valid: {}", acceptance.allowed);
        if let Some(reason) = acceptance.reason {
            println!("Reason: {}", reason);
        }
        return Ok(());
    }

    match contract.submit(&client, &mut spend)? {
        SubmitOutcome::Broadcast { txid } => {
            println!("Valid: true");
            println!("Broadcast: {}", txid);
        }
        SubmitOutcome::Rejected { reason } => {
            println!("Valid: false");
            println!("Rejected: {}", reason);
        }
    }

    Ok(())
}

/// Explicit rate, else the price feed, else the configured fallback
async fn resolve_fee_rate(network: Network, explicit: Option<f64>) -> Result<f64> {
    let fallback = config::default_fee_rate()?;
    if let Some(rate) = explicit {
        return Ok(rate);
    }

    let url = match env::var(config_env::FEE_API_URL) {
        Ok(url) => url,
        Err(_) => match network.fee_api_url() {
            Some(url) => url.to_string(),
            None => return Ok(fallback),
        },
    };

    let client = FeeRateClient::new(url)?;
    Ok(client.fee_rate_or(fallback).await)
}

fn decode(network: Network, hex: &str, json: bool) -> Result<()> {
    let analysis = TransactionDecoder::new(network).analyze_hex(hex)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("{}\n", analysis.generate_summary());
        print!("{}", analysis.generate_report());
    }
    Ok(())
}
