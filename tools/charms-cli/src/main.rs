//! Charms wallet command-line tool.
//!
//! Usage:
//!   charms-wallet decode <TX_HEX>
//!   charms-wallet keygen
//!   charms-wallet address
//!   charms-wallet sign-pair --file composed.json
//!   charms-wallet send --to <ADDR> --amount N --from <ADDR>...
//!   charms-wallet charms --from <ADDR>...
//!   charms-wallet transfer-charm --charm <TXID:VOUT> --to <ADDR> --amount N --from <ADDR>...
//!
//! Commands that sign read the key from `--key` or `CHARMS_WALLET_KEY`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chain_btc::network::BtcNetwork;
use chain_btc::utxo::format_sats;
use chain_btc::RawTransaction;
use charms::UtxoId;
use clap::{Args, Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_core::types::{ComposedTransfer, WalletAddresses};
use wallet_core::{
    decode_transaction, derive_addresses, generate_key, sign_transfer, HttpWalletService,
    TransferStage, WalletConfig,
};

/// Sign and send Bitcoin and charm transfers.
#[derive(Parser, Debug)]
#[command(name = "charms-wallet", version, about = "Charms wallet signing tool")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "charms-wallet.toml", global = true)]
    config: PathBuf,

    /// Override the configured network.
    #[arg(long, global = true)]
    network: Option<BtcNetwork>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct KeyArg {
    /// Private key: 64 hex characters, optionally 0x-prefixed, or an xprv/tprv.
    #[arg(long, env = "CHARMS_WALLET_KEY", hide_env_values = true)]
    key: String,
}

impl KeyArg {
    fn secret(self) -> SecretString {
        SecretString::from(self.key)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a raw transaction.
    Decode {
        tx_hex: String,
    },

    /// Generate a new key and print it with its addresses.
    Keygen,

    /// Show the addresses controlled by a key.
    Address {
        #[command(flatten)]
        key: KeyArg,
    },

    /// Sign a composed commit/spell pair read from a JSON file.
    SignPair {
        /// Spell composer response (`transactions` and `taproot_data`).
        #[arg(long)]
        file: PathBuf,

        #[command(flatten)]
        key: KeyArg,
    },

    /// Send sats to an address.
    Send {
        #[arg(long)]
        to: String,

        /// Amount in satoshis.
        #[arg(long)]
        amount: u64,

        /// Addresses that may fund the transfer.
        #[arg(long = "from", required = true, num_args = 1..)]
        from: Vec<String>,

        #[command(flatten)]
        key: KeyArg,
    },

    /// List charms held by addresses.
    Charms {
        #[arg(long = "from", required = true, num_args = 1..)]
        from: Vec<String>,
    },

    /// Transfer part or all of a charm.
    TransferCharm {
        /// Output holding the charm, as `txid:vout`.
        #[arg(long)]
        charm: UtxoId,

        /// App id, when the output holds more than one charm.
        #[arg(long)]
        app_id: Option<String>,

        #[arg(long)]
        to: String,

        /// Charm amount to transfer.
        #[arg(long)]
        amount: u64,

        /// Addresses that own the charm and may fund the transfer.
        #[arg(long = "from", required = true, num_args = 1..)]
        from: Vec<String>,

        #[command(flatten)]
        key: KeyArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = WalletConfig::load(&cli.config)?;
    if let Some(network) = cli.network {
        config.network = network;
    }

    match cli.command {
        Command::Decode { tx_hex } => decode(&tx_hex),
        Command::Keygen => {
            let (secret, addresses) = generate_key(config.network)?;
            println!("key:     {}", secret.expose_secret());
            print_addresses(config.network, &addresses);
            Ok(())
        }
        Command::Address { key } => {
            let addresses = derive_addresses(&key.secret(), config.network)?;
            print_addresses(config.network, &addresses);
            Ok(())
        }
        Command::SignPair { file, key } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let composed: ComposedTransfer =
                serde_json::from_str(&contents).context("invalid composed transfer JSON")?;
            let mut progress = |stage: TransferStage, msg: &str| eprintln!("[{stage}] {msg}");
            let pair = sign_transfer(&composed, &key.secret(), &mut progress)?;
            println!("{}", serde_json::to_string_pretty(&pair)?);
            Ok(())
        }
        Command::Send {
            to,
            amount,
            from,
            key,
        } => {
            let service = HttpWalletService::from_config(config);
            let sent = service.send_btc(&to, amount, &from, &key.secret()).await?;
            println!("txid:    {}", sent.txid);
            println!("from:    {}", sent.funding_address);
            println!("fee:     {} BTC", format_sats(sent.fee));
            if let Some(change) = sent.change {
                println!("change:  {} BTC", format_sats(change));
            }
            println!("link:    {}", sent.explorer_link);
            Ok(())
        }
        Command::Charms { from } => {
            let service = HttpWalletService::from_config(config);
            let holdings = service.charms_for_addresses(&from).await?;
            if holdings.is_empty() {
                println!("no charms found");
            }
            for h in holdings {
                println!("{}:{}  {}  {}  {}", h.txid, h.output_index, h.amount, h.app, h.address);
            }
            Ok(())
        }
        Command::TransferCharm {
            charm,
            app_id,
            to,
            amount,
            from,
            key,
        } => {
            let service = HttpWalletService::from_config(config);
            let mut candidates: Vec<_> = service
                .charms_for_addresses(&from)
                .await?
                .into_iter()
                .filter(|h| h.txid == charm.txid && h.output_index == charm.vout)
                .filter(|h| app_id.as_ref().map_or(true, |id| &h.app.id == id))
                .collect();

            let holding = match candidates.len() {
                0 => bail!("no charm found at {charm} for the given addresses"),
                1 => candidates.remove(0),
                n => bail!("{n} charms at {charm}; pick one with --app-id"),
            };

            let mut progress = |stage: TransferStage, msg: &str| eprintln!("[{stage}] {msg}");
            let receipt = service
                .transfer_charm(&holding, amount, &to, &from, &key.secret(), &mut progress)
                .await?;
            println!("commit:  {}", receipt.commit_link);
            println!("spell:   {}", receipt.spell_link);
            Ok(())
        }
    }
}

fn print_addresses(network: BtcNetwork, addresses: &WalletAddresses) {
    println!("network: {network}");
    println!("p2pkh:   {}", addresses.p2pkh);
    println!("p2wpkh:  {}", addresses.p2wpkh);
    println!("p2tr:    {}", addresses.p2tr);
}

fn decode(tx_hex: &str) -> Result<()> {
    let Some(tx) = decode_transaction(tx_hex) else {
        bail!("not a valid transaction");
    };
    println!("{}", serde_json::to_string_pretty(&describe(&tx))?);
    Ok(())
}

fn describe(tx: &RawTransaction) -> serde_json::Value {
    let inputs: Vec<_> = tx
        .inputs
        .iter()
        .map(|input| {
            serde_json::json!({
                "txid": input.txid_hex(),
                "vout": input.vout,
                "script_sig": hex::encode(&input.script_sig),
                "sequence": input.sequence,
                "witness": input.witness.iter().map(hex::encode).collect::<Vec<_>>(),
            })
        })
        .collect();
    let outputs: Vec<_> = tx
        .outputs
        .iter()
        .map(|output| {
            serde_json::json!({
                "value": output.value,
                "script_pubkey": hex::encode(&output.script_pubkey),
                "p2tr": output.is_p2tr(),
            })
        })
        .collect();

    serde_json::json!({
        "txid": tx.txid(),
        "version": tx.version,
        "segwit": tx.segwit,
        "lock_time": tx.lock_time,
        "inputs": inputs,
        "outputs": outputs,
    })
}
