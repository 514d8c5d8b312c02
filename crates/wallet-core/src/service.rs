//! Wallet flows over the HTTP collaborators: refreshing UTXOs, plain value
//! transfers, charm transfers and charm discovery.

use std::collections::{BTreeMap, BTreeSet};

use chain_btc::address::spend_path_for_address;
use chain_btc::keys::normalize_private_key;
use chain_btc::transaction::{build_transfer, sign_transaction, TransferRequest};
use chain_btc::utxo::{Utxo, UtxoMap};
use chain_btc::SignRequest;
use charms::{compose_transfer_spell, holdings_from_spell, CharmHolding};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::clients::{
    BroadcastClient, Broadcaster, CharmsApiClient, CharmsIndex, EsploraClient, SpellComposer,
    SpellComposerClient, UtxoIndex,
};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::orchestrator::{sign_both_transactions, ProgressSink, TransferStage};
use crate::types::{CharmTransferReceipt, ProveSpellRequest, SentTransfer};

/// Wallet service backed by the HTTP collaborators named in a config.
pub type HttpWalletService =
    WalletService<EsploraClient, SpellComposerClient, CharmsApiClient, BroadcastClient>;

pub struct WalletService<U, C, I, B> {
    config: WalletConfig,
    utxo_index: U,
    composer: C,
    charms_index: I,
    broadcaster: B,
}

impl HttpWalletService {
    pub fn from_config(config: WalletConfig) -> Self {
        let utxo_index = EsploraClient::new(config.utxo_index_url());
        let composer = SpellComposerClient::new(config.spell_composer_url());
        let charms_index = CharmsApiClient::new(config.charms_index_url());
        let broadcaster = BroadcastClient::new(config.broadcaster_url());
        Self::new(config, utxo_index, composer, charms_index, broadcaster)
    }
}

impl<U, C, I, B> WalletService<U, C, I, B>
where
    U: UtxoIndex + Clone + Send + Sync + 'static,
    C: SpellComposer,
    I: CharmsIndex,
    B: Broadcaster,
{
    pub fn new(
        config: WalletConfig,
        utxo_index: U,
        composer: C,
        charms_index: I,
        broadcaster: B,
    ) -> Self {
        Self {
            config,
            utxo_index,
            composer,
            charms_index,
            broadcaster,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Fetch the current UTXOs of every address concurrently.
    ///
    /// The first failing fetch is returned and the rest are aborted.
    pub async fn refresh_utxos(&self, addresses: &[String]) -> Result<UtxoMap, WalletError> {
        let unique: BTreeSet<&String> = addresses.iter().collect();
        let mut set = JoinSet::new();
        for address in unique {
            let index = self.utxo_index.clone();
            let address = address.clone();
            set.spawn(async move {
                let utxos = index.address_utxos(&address).await;
                (address, utxos)
            });
        }

        let mut map = UtxoMap::new();
        while let Some(joined) = set.join_next().await {
            let (address, utxos) = joined.map_err(|e| WalletError::Internal(e.to_string()))?;
            map.insert(address, utxos?);
        }
        debug!(addresses = map.len(), "refreshed utxos");
        Ok(map)
    }

    /// Send `amount` sats to `recipient`, funded from one of `addresses`.
    pub async fn send_btc(
        &self,
        recipient: &str,
        amount: u64,
        addresses: &[String],
        private_key: &SecretString,
    ) -> Result<SentTransfer, WalletError> {
        let key = normalize_private_key(private_key.expose_secret())?;
        let utxos = self.refresh_utxos(addresses).await?;

        let request = TransferRequest {
            recipient: recipient.trim().to_string(),
            amount,
            fee_rate_sat_vbyte: self.config.fee_rate_sat_vbyte,
            network: self.config.network,
        };
        let plan = build_transfer(&request, &utxos)?;

        let path = spend_path_for_address(&plan.funding_address, self.config.network)?;
        let sign_request = SignRequest::new(path).with_inputs((0..plan.tx.inputs.len()).collect());
        let signed = sign_transaction(&plan.tx.to_hex(), &key, &sign_request)?;

        let receipt = self.broadcaster.broadcast(&signed.hex).await?;
        info!(txid = %receipt.txid, amount, fee = plan.fee, "sent transfer");

        Ok(SentTransfer {
            explorer_link: self.config.tx_link(&receipt.txid),
            txid: receipt.txid,
            funding_address: plan.funding_address,
            fee: plan.fee,
            change: plan.change,
        })
    }

    /// Move `amount` of `holding` to `destination`.
    ///
    /// The spell is composed and validated locally, proven by the spell
    /// composer, signed commit-first, then broadcast commit-first.
    pub async fn transfer_charm(
        &self,
        holding: &CharmHolding,
        amount: u64,
        destination: &str,
        addresses: &[String],
        private_key: &SecretString,
        progress: &mut impl ProgressSink,
    ) -> Result<CharmTransferReceipt, WalletError> {
        let key = normalize_private_key(private_key.expose_secret())?;
        let spell = compose_transfer_spell(holding, amount, destination, self.config.network)?;

        let utxos = self.refresh_utxos(addresses).await?;
        let funding = select_charm_funding(&utxos, &holding.utxo_id()?.to_string())?;
        debug!(funding = %funding.outpoint(), value = funding.value, "selected funding utxo");

        let request = ProveSpellRequest {
            destination_address: destination.trim().to_string(),
            transfer_amount: amount,
            spell_json: spell.to_json()?,
            funding_utxo_id: funding.outpoint(),
        };
        let composed = self.composer.prove_spell(&request).await?;

        let signed = sign_both_transactions(&composed, &key, progress)?;

        let commit = self.broadcaster.broadcast(&signed.signed_commit_tx.hex).await?;
        let commit_link = self.config.tx_link(&commit.txid);
        progress.report(
            TransferStage::CommitBroadcast,
            &format!("Commit transaction broadcast: {commit_link}"),
        );

        let spell = self.broadcaster.broadcast(&signed.signed_spell_tx.hex).await?;
        let spell_link = self.config.tx_link(&spell.txid);
        progress.report(
            TransferStage::SpellBroadcast,
            &format!("Spell transaction broadcast: {spell_link}"),
        );

        info!(commit = %commit.txid, spell = %spell.txid, amount, "charm transfer broadcast");
        Ok(CharmTransferReceipt {
            commit,
            spell,
            commit_link,
            spell_link,
        })
    }

    /// Charms held at the current outputs of `addresses`.
    ///
    /// Each transaction is looked up once; only the outputs actually owned by
    /// one of `addresses` produce holdings.
    pub async fn charms_for_addresses(
        &self,
        addresses: &[String],
    ) -> Result<Vec<CharmHolding>, WalletError> {
        let utxos = self.refresh_utxos(addresses).await?;

        let mut owned: BTreeMap<&str, Vec<(&str, u32)>> = BTreeMap::new();
        for (address, entries) in &utxos {
            for utxo in entries {
                owned
                    .entry(utxo.txid.as_str())
                    .or_default()
                    .push((address.as_str(), utxo.vout));
            }
        }

        let mut holdings = Vec::new();
        for (txid, outputs) in owned {
            let Some(spell) = self.charms_index.spell_for_tx(txid).await? else {
                continue;
            };
            for (address, vout) in outputs {
                holdings.extend(
                    holdings_from_spell(txid, &spell, address)
                        .into_iter()
                        .filter(|h| h.output_index == vout),
                );
            }
        }

        debug!(count = holdings.len(), "found charm holdings");
        Ok(holdings)
    }
}

/// The largest confirmed UTXO other than the charm being spent. Ties go to
/// the first address in map order.
fn select_charm_funding(utxos: &UtxoMap, charm_outpoint: &str) -> Result<Utxo, WalletError> {
    let mut best: Option<&Utxo> = None;
    for utxo in utxos.values().flatten() {
        if !utxo.status.confirmed || utxo.outpoint() == charm_outpoint {
            continue;
        }
        if best.map_or(true, |b| utxo.value > b.value) {
            best = Some(utxo);
        }
    }
    best.cloned().ok_or(WalletError::NoFundingUtxo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use charms::SpellError;
    use chain_btc::utxo::UtxoStatus;
    use chain_btc::{BtcError, RawTransaction};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000002";
    const HOLDER: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
    const DEST: &str = "tb1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3q0sl5k7";
    const CHARM_TXID: &str = "cc00000000000000000000000000000000000000000000000000000000000003";
    const FUND_TXID: &str = "dd00000000000000000000000000000000000000000000000000000000000004";
    const BROADCAST_TXID: &str = "ee00000000000000000000000000000000000000000000000000000000000005";

    /// One input, one P2TR output of 1000 sats.
    const COMMIT_TX: &str = "020000000111111111111111111111111111111111111111111111111111111111111111110000000000ffffffff01e803000000000000225120aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa00000000";

    fn service(server: &MockServer) -> HttpWalletService {
        let uri = server.uri();
        let config = WalletConfig {
            endpoints: EndpointConfig {
                utxo_index: Some(uri.clone()),
                spell_composer: Some(uri.clone()),
                charms_index: Some(uri.clone()),
                broadcaster: Some(uri),
                explorer: Some("https://explorer.test".into()),
            },
            ..WalletConfig::default()
        };
        HttpWalletService::from_config(config)
    }

    fn key() -> SecretString {
        SecretString::from(KEY_HEX)
    }

    fn utxo_json(txid: &str, vout: u32, value: u64, confirmed: bool) -> serde_json::Value {
        serde_json::json!({
            "txid": txid,
            "vout": vout,
            "value": value,
            "status": {"confirmed": confirmed}
        })
    }

    async fn mount_utxos(server: &MockServer, address: &str, utxos: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/address/{address}/utxo")))
            .respond_with(ResponseTemplate::new(200).set_body_json(utxos))
            .mount(server)
            .await;
    }

    async fn mount_broadcast(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/wallet/broadcast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"txid": BROADCAST_TXID})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn holding() -> CharmHolding {
        CharmHolding {
            txid: CHARM_TXID.into(),
            output_index: 0,
            app: "t/aa/bb".parse().unwrap(),
            amount: 1000,
            address: HOLDER.into(),
        }
    }

    #[tokio::test]
    async fn refresh_merges_addresses() {
        let server = MockServer::start().await;
        mount_utxos(&server, HOLDER, serde_json::json!([utxo_json(FUND_TXID, 0, 700, true)])).await;
        mount_utxos(&server, DEST, serde_json::json!([])).await;

        let addresses = vec![HOLDER.to_string(), DEST.to_string(), HOLDER.to_string()];
        let map = service(&server).refresh_utxos(&addresses).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[HOLDER][0].value, 700);
        assert!(map[DEST].is_empty());
    }

    #[tokio::test]
    async fn refresh_propagates_index_errors() {
        let server = MockServer::start().await;
        mount_utxos(&server, HOLDER, serde_json::json!([])).await;
        Mock::given(method("GET"))
            .and(path(format!("/address/{DEST}/utxo")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let addresses = vec![HOLDER.to_string(), DEST.to_string()];
        let err = service(&server).refresh_utxos(&addresses).await.unwrap_err();
        assert!(matches!(err, WalletError::Collaborator { status: 500, .. }));
    }

    #[tokio::test]
    async fn send_btc_signs_and_broadcasts() {
        let server = MockServer::start().await;
        mount_utxos(
            &server,
            HOLDER,
            serde_json::json!([utxo_json(FUND_TXID, 1, 50_000, true)]),
        )
        .await;
        mount_broadcast(&server, 1).await;

        let sent = service(&server)
            .send_btc(DEST, 10_000, &[HOLDER.to_string()], &key())
            .await
            .unwrap();

        assert_eq!(sent.txid, BROADCAST_TXID);
        assert_eq!(sent.funding_address, HOLDER);
        assert_eq!(sent.fee, 258);
        assert_eq!(sent.change, Some(39_742));
        assert_eq!(sent.explorer_link, format!("https://explorer.test/tx/{BROADCAST_TXID}"));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests
            .iter()
            .find(|r| r.url.path() == "/wallet/broadcast")
            .unwrap()
            .body_json()
            .unwrap();
        let tx = RawTransaction::from_hex(body["tx_hex"].as_str().unwrap()).unwrap();
        assert!(tx.segwit);
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
    }

    #[tokio::test]
    async fn send_btc_refuses_multi_input_funding() {
        let server = MockServer::start().await;
        mount_utxos(
            &server,
            HOLDER,
            serde_json::json!([
                utxo_json(FUND_TXID, 0, 6_000, true),
                utxo_json(FUND_TXID, 1, 6_000, true)
            ]),
        )
        .await;
        mount_broadcast(&server, 0).await;

        let err = service(&server)
            .send_btc(DEST, 10_000, &[HOLDER.to_string()], &key())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::Transaction(BtcError::UnsupportedMultiInputSigning(_))
        ));
    }

    #[tokio::test]
    async fn send_btc_rejects_bad_key_before_fetching() {
        let server = MockServer::start().await;
        let err = service(&server)
            .send_btc(DEST, 1_000, &[HOLDER.to_string()], &SecretString::from("zz"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::InvalidPrivateKey(BtcError::InvalidPrivateKeyFormat(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_charm_end_to_end() {
        let server = MockServer::start().await;
        mount_utxos(
            &server,
            HOLDER,
            serde_json::json!([
                utxo_json(CHARM_TXID, 0, 546, true),
                utxo_json(FUND_TXID, 1, 20_000, true),
                utxo_json(FUND_TXID, 2, 90_000, false)
            ]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/spell/prove_spell"))
            .and(body_partial_json(serde_json::json!({
                "destination_address": DEST,
                "transfer_amount": 400,
                "funding_utxo_id": format!("{FUND_TXID}:1")
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transactions": {"commit_tx": COMMIT_TX, "spell_tx": COMMIT_TX},
                "taproot_data": {
                    "script": format!("20{}ac", "11".repeat(32)),
                    "control_block": format!("c0{}", "22".repeat(32))
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_broadcast(&server, 2).await;

        let mut stages = Vec::new();
        let mut sink = |stage: TransferStage, msg: &str| stages.push((stage, msg.to_string()));
        let receipt = service(&server)
            .transfer_charm(&holding(), 400, DEST, &[HOLDER.to_string()], &key(), &mut sink)
            .await
            .unwrap();

        let link = format!("https://explorer.test/tx/{BROADCAST_TXID}");
        assert_eq!(receipt.commit_link, link);
        assert_eq!(receipt.spell_link, link);

        let order: Vec<TransferStage> = stages.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![
                TransferStage::Start,
                TransferStage::CommitSigned,
                TransferStage::CommitDecoded,
                TransferStage::SpellSigned,
                TransferStage::Done,
                TransferStage::CommitBroadcast,
                TransferStage::SpellBroadcast,
            ]
        );
        assert!(stages[6].1.ends_with(&link));
    }

    #[tokio::test]
    async fn transfer_charm_rejects_overdraw_without_network() {
        let server = MockServer::start().await;
        let err = service(&server)
            .transfer_charm(
                &holding(),
                1001,
                DEST,
                &[HOLDER.to_string()],
                &key(),
                &mut crate::orchestrator::NoProgress,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::Spell(SpellError::InsufficientCharmAmount {
                available: 1000,
                requested: 1001
            })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_charm_needs_funding() {
        let server = MockServer::start().await;
        mount_utxos(
            &server,
            HOLDER,
            serde_json::json!([utxo_json(CHARM_TXID, 0, 546, true)]),
        )
        .await;

        let err = service(&server)
            .transfer_charm(
                &holding(),
                10,
                DEST,
                &[HOLDER.to_string()],
                &key(),
                &mut crate::orchestrator::NoProgress,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NoFundingUtxo));
    }

    #[tokio::test]
    async fn charms_found_only_at_owned_outputs() {
        let server = MockServer::start().await;
        mount_utxos(
            &server,
            HOLDER,
            serde_json::json!([
                utxo_json(CHARM_TXID, 1, 546, true),
                utxo_json(FUND_TXID, 0, 9_000, true)
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path(format!("/spells/{CHARM_TXID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": 2,
                "apps": {"$01": "t/aa/bb"},
                "ins": [{"utxo_id": format!("{FUND_TXID}:0"), "charms": {"$01": 1000}}],
                "outs": [{"charms": {"$01": 600}}, {"charms": {"$01": 400}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/spells/{FUND_TXID}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let holdings = service(&server)
            .charms_for_addresses(&[HOLDER.to_string()])
            .await
            .unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].output_index, 1);
        assert_eq!(holdings[0].amount, 400);
        assert_eq!(holdings[0].address, HOLDER);
        assert_eq!(holdings[0].app.id, "aa");
    }

    #[test]
    fn charm_funding_skips_charm_and_unconfirmed() {
        let utxo = |txid: &str, vout, value, confirmed| Utxo {
            txid: txid.into(),
            vout,
            value,
            status: UtxoStatus {
                confirmed,
                ..Default::default()
            },
        };
        let mut map = UtxoMap::new();
        map.insert(
            "a".into(),
            vec![utxo(CHARM_TXID, 0, 99_000, true), utxo(FUND_TXID, 0, 5_000, true)],
        );
        map.insert(
            "b".into(),
            vec![utxo(FUND_TXID, 1, 5_000, true), utxo(FUND_TXID, 2, 50_000, false)],
        );

        let charm = format!("{CHARM_TXID}:0");
        let chosen = select_charm_funding(&map, &charm).unwrap();
        assert_eq!(chosen.outpoint(), format!("{FUND_TXID}:0"));
    }
}
