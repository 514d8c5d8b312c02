//! HTTP collaborators: address index, spell composer, charms index and
//! broadcaster.

use std::future::Future;

use chain_btc::utxo::Utxo;
use charms::Spell;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::WalletError;
use crate::types::{BroadcastReceipt, ComposedTransfer, ProveSpellRequest};

/// Lists unspent outputs of an address.
pub trait UtxoIndex {
    fn address_utxos(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<Utxo>, WalletError>> + Send;
}

/// Turns a spell into unsigned commit and spell transactions.
pub trait SpellComposer {
    fn prove_spell(
        &self,
        request: &ProveSpellRequest,
    ) -> impl Future<Output = Result<ComposedTransfer, WalletError>> + Send;
}

/// Looks up the spell carried by a transaction, if any.
pub trait CharmsIndex {
    fn spell_for_tx(
        &self,
        txid: &str,
    ) -> impl Future<Output = Result<Option<Spell>, WalletError>> + Send;
}

/// Submits signed transactions.
pub trait Broadcaster {
    fn broadcast(
        &self,
        tx_hex: &str,
    ) -> impl Future<Output = Result<BroadcastReceipt, WalletError>> + Send;
}

/// Error body shapes returned by the wallet API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Convert a non-success response into [`WalletError::Collaborator`],
/// preferring the `error` or `message` field of a JSON body.
async fn collaborator_error(resp: reqwest::Response) -> WalletError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(text);
    warn!(status, %body, "collaborator rejected request");
    WalletError::Collaborator { status, body }
}

/// Esplora-style address index (mempool.space and compatibles).
#[derive(Debug, Clone)]
pub struct EsploraClient {
    base_url: String,
    client: reqwest::Client,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl UtxoIndex for EsploraClient {
    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(collaborator_error(resp).await);
        }
        let utxos: Vec<Utxo> = resp.json().await?;
        debug!(%address, count = utxos.len(), "fetched utxos");
        Ok(utxos)
    }
}

#[derive(Debug, Clone)]
pub struct SpellComposerClient {
    base_url: String,
    client: reqwest::Client,
}

impl SpellComposerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl SpellComposer for SpellComposerClient {
    async fn prove_spell(
        &self,
        request: &ProveSpellRequest,
    ) -> Result<ComposedTransfer, WalletError> {
        let url = format!("{}/spell/prove_spell", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        if !resp.status().is_success() {
            return Err(collaborator_error(resp).await);
        }
        Ok(resp.json().await?)
    }
}

#[derive(Debug, Clone)]
pub struct CharmsApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl CharmsApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl CharmsIndex for CharmsApiClient {
    /// Transactions without a spell come back as a non-success status or an
    /// empty body; both map to `None`, as does a body that is not a spell.
    async fn spell_for_tx(&self, txid: &str) -> Result<Option<Spell>, WalletError> {
        let url = format!("{}/spells/{}", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            debug!(%txid, status = resp.status().as_u16(), "no spell for transaction");
            return Ok(None);
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        match Spell::from_json(&text) {
            Ok(spell) => Ok(Some(spell)),
            Err(e) => {
                warn!(%txid, "ignoring unparseable spell: {e}");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastClient {
    base_url: String,
    client: reqwest::Client,
}

impl BroadcastClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Broadcaster for BroadcastClient {
    async fn broadcast(&self, tx_hex: &str) -> Result<BroadcastReceipt, WalletError> {
        let url = format!("{}/wallet/broadcast", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "tx_hex": tx_hex }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(collaborator_error(resp).await);
        }
        let receipt: BroadcastReceipt = resp.json().await?;
        debug!(txid = %receipt.txid, "broadcast accepted");
        Ok(receipt)
    }
}
