use std::collections::BTreeMap;

use chain_btc::address::validate_address;
use chain_btc::network::BtcNetwork;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SpellError;
use crate::spell::{App, Spell, SpellInput, SpellOutput, UtxoId, SPELL_VERSION};

/// Key under which a transfer spell declares its single app.
pub const TRANSFER_APP_KEY: &str = "$01";

/// Sats attached to each output of a transfer spell.
pub const CHARM_OUTPUT_SATS: u64 = 546;

/// An amount of one charm held at a specific output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmHolding {
    pub txid: String,
    pub output_index: u32,
    pub app: App,
    pub amount: u64,
    /// Address owning the output.
    pub address: String,
}

impl CharmHolding {
    pub fn utxo_id(&self) -> Result<UtxoId, SpellError> {
        UtxoId::new(self.txid.clone(), self.output_index)
    }
}

fn check_address(address: &str, network: BtcNetwork) -> Result<(), SpellError> {
    match validate_address(address, network) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SpellError::InvalidAddress(format!(
            "{address} is not a {network} address"
        ))),
        Err(e) => Err(SpellError::InvalidAddress(e.to_string())),
    }
}

/// Compose a spell moving `amount` of `holding` to `destination`.
///
/// The destination output gets `amount`; a second output returns the
/// remainder to the holder. Both carry [`CHARM_OUTPUT_SATS`].
pub fn compose_transfer_spell(
    holding: &CharmHolding,
    amount: u64,
    destination: &str,
    network: BtcNetwork,
) -> Result<Spell, SpellError> {
    if amount == 0 {
        return Err(SpellError::ZeroAmount);
    }
    if amount > holding.amount {
        return Err(SpellError::InsufficientCharmAmount {
            available: holding.amount,
            requested: amount,
        });
    }
    check_address(destination, network)?;
    check_address(&holding.address, network)?;

    let charm = |value: u64| -> BTreeMap<String, u64> {
        [(TRANSFER_APP_KEY.to_string(), value)].into_iter().collect()
    };

    let spell = Spell {
        version: SPELL_VERSION,
        apps: [(TRANSFER_APP_KEY.to_string(), holding.app.clone())]
            .into_iter()
            .collect(),
        ins: vec![SpellInput {
            utxo_id: holding.utxo_id()?,
            charms: charm(holding.amount),
        }],
        outs: vec![
            SpellOutput {
                address: Some(destination.trim().to_string()),
                charms: charm(amount),
                sats: Some(CHARM_OUTPUT_SATS),
            },
            SpellOutput {
                address: Some(holding.address.clone()),
                charms: charm(holding.amount - amount),
                sats: Some(CHARM_OUTPUT_SATS),
            },
        ],
    };

    spell.validate()?;
    debug!(
        app = %holding.app,
        amount,
        remainder = holding.amount - amount,
        "composed transfer spell"
    );
    Ok(spell)
}

/// Turn a spell indexed for `txid` into the holdings it created.
///
/// Every charm entry of every output becomes a holding owned by `owner`.
/// Entries whose key has no declared app are skipped.
pub fn holdings_from_spell(txid: &str, spell: &Spell, owner: &str) -> Vec<CharmHolding> {
    let mut holdings = Vec::new();

    for (index, output) in spell.outs.iter().enumerate() {
        for (key, amount) in &output.charms {
            let Some(app) = spell.apps.get(key) else {
                warn!(%txid, %key, "charm key has no declared app, skipping");
                continue;
            };
            holdings.push(CharmHolding {
                txid: txid.to_string(),
                output_index: index as u32,
                app: app.clone(),
                amount: *amount,
                address: owner.to_string(),
            });
        }
    }

    holdings
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "bb00000000000000000000000000000000000000000000000000000000000002";
    const HOLDER: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
    const DEST: &str = "tb1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3q0sl5k7";

    fn holding(amount: u64) -> CharmHolding {
        CharmHolding {
            txid: TXID.into(),
            output_index: 1,
            app: "t/appid/appvk".parse().unwrap(),
            amount,
            address: HOLDER.into(),
        }
    }

    #[test]
    fn transfer_spell_splits_amount() {
        let spell = compose_transfer_spell(&holding(1000), 400, DEST, BtcNetwork::Testnet).unwrap();

        assert_eq!(spell.version, 2);
        assert_eq!(spell.apps[TRANSFER_APP_KEY].to_string(), "t/appid/appvk");
        assert_eq!(spell.ins[0].utxo_id.to_string(), format!("{TXID}:1"));
        assert_eq!(spell.ins[0].charms[TRANSFER_APP_KEY], 1000);

        assert_eq!(spell.outs.len(), 2);
        assert_eq!(spell.outs[0].address.as_deref(), Some(DEST));
        assert_eq!(spell.outs[0].charms[TRANSFER_APP_KEY], 400);
        assert_eq!(spell.outs[1].address.as_deref(), Some(HOLDER));
        assert_eq!(spell.outs[1].charms[TRANSFER_APP_KEY], 600);
        assert!(spell.outs.iter().all(|o| o.sats == Some(546)));
    }

    #[test]
    fn full_transfer_leaves_zero_remainder() {
        let spell = compose_transfer_spell(&holding(50), 50, DEST, BtcNetwork::Testnet).unwrap();
        assert_eq!(spell.outs[1].charms[TRANSFER_APP_KEY], 0);
    }

    #[test]
    fn rejects_overdraw() {
        assert!(matches!(
            compose_transfer_spell(&holding(10), 11, DEST, BtcNetwork::Testnet),
            Err(SpellError::InsufficientCharmAmount {
                available: 10,
                requested: 11
            })
        ));
    }

    #[test]
    fn rejects_zero_amount() {
        assert!(matches!(
            compose_transfer_spell(&holding(10), 0, DEST, BtcNetwork::Testnet),
            Err(SpellError::ZeroAmount)
        ));
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(matches!(
            compose_transfer_spell(&holding(10), 1, "garbage", BtcNetwork::Testnet),
            Err(SpellError::InvalidAddress(_))
        ));
        assert!(matches!(
            compose_transfer_spell(
                &holding(10),
                1,
                "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
                BtcNetwork::Testnet
            ),
            Err(SpellError::InvalidAddress(_))
        ));
    }

    #[test]
    fn holdings_from_indexed_spell() {
        let json = format!(
            r#"{{"version":2,"apps":{{"$00":"t/a/b","$01":"n/c/d"}},
               "ins":[{{"utxo_id":"{TXID}:0"}}],
               "outs":[{{"charms":{{"$00":7}}}},{{"charms":{{"$01":1,"$09":3}}}}]}}"#
        );
        let spell = Spell::from_json(&json).unwrap();
        let holdings = holdings_from_spell(TXID, &spell, HOLDER);

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].output_index, 0);
        assert_eq!(holdings[0].amount, 7);
        assert_eq!(holdings[1].output_index, 1);
        assert_eq!(holdings[1].app.tag, "n");
        assert!(holdings.iter().all(|h| h.address == HOLDER));
    }
}
