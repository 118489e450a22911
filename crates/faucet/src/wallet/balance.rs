use serde::Serialize;
use serde_json::Value;

/// Zatoshis per ZEC
pub const ZATOSHIS_PER_ZEC: u64 = 100_000_000;

/// Pool balances in zatoshis, recomputed on every query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub transparent: u64,
    pub sapling: u64,
    pub orchard: u64,
}

impl BalanceSnapshot {
    /// Read the pool fields of a `balance` response.
    ///
    /// When the three pools sum to zero the generic `balance` field, if any,
    /// is taken as the (unpooled) total.
    pub fn from_json(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(as_zatoshis).unwrap_or(0);

        let snapshot = Self {
            transparent: field("transparent_balance"),
            sapling: field("sapling_balance"),
            orchard: field("orchard_balance"),
        };

        if snapshot.total_zatoshis() == 0 {
            let generic = field("balance");
            if generic > 0 {
                return Self {
                    transparent: generic,
                    ..Self::default()
                };
            }
        }

        snapshot
    }

    pub fn total_zatoshis(&self) -> u64 {
        self.transparent
            .saturating_add(self.sapling)
            .saturating_add(self.orchard)
    }

    pub fn total_zec(&self) -> f64 {
        zatoshis_to_zec(self.total_zatoshis())
    }
}

pub fn zatoshis_to_zec(zatoshis: u64) -> f64 {
    zatoshis as f64 / ZATOSHIS_PER_ZEC as f64
}

/// `round(zec * 10^8)`; callers validate that `zec` is positive and finite
pub fn zec_to_zatoshis(zec: f64) -> u64 {
    (zec * ZATOSHIS_PER_ZEC as f64).round() as u64
}

fn as_zatoshis(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}
