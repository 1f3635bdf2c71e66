//! Token price map parsing and suspicious-value evaluation.

use std::collections::HashMap;

use num_bigint::BigUint;

use certgate_proto::types_v1::Certificate;

/// Dollar price of one whole token, plus the multiplier that converts the
/// on-wire integer amount into whole tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValue {
    pub address: String,
    pub dollar_value: u64,
    pub multiplier: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenValueError {
    #[error("invalid token value entry: {0}")]
    Entry(String),

    #[error("invalid token address: {0}")]
    Address(String),

    #[error("invalid dollar value: {0}")]
    DollarValue(String),

    #[error("invalid multiplier: {0}")]
    Multiplier(String),
}

/// Parse the `token_values` CSV grammar:
/// `<address40>:<dollar_value>:<multiplier>` entries separated by commas.
/// Addresses are 40 hex characters without a `0x` prefix and are lower-cased.
/// A single bad entry rejects the whole string.
pub fn parse_token_values(raw: &str) -> Result<HashMap<String, TokenValue>, TokenValueError> {
    let mut result = HashMap::new();
    for entry in raw.split(',') {
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() != 3 {
            return Err(TokenValueError::Entry(entry.to_string()));
        }

        let address = parts[0];
        if address.len() != 40 || !address.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TokenValueError::Address(address.to_string()));
        }
        let address = address.to_lowercase();

        let dollar_value: u64 = parts[1]
            .parse()
            .map_err(|_| TokenValueError::DollarValue(parts[1].to_string()))?;
        let multiplier: u64 = parts[2]
            .parse()
            .map_err(|_| TokenValueError::Multiplier(parts[2].to_string()))?;

        result.insert(
            address.clone(),
            TokenValue {
                address,
                dollar_value,
                multiplier,
            },
        );
    }
    Ok(result)
}

/// Sum of all bridge-exit amounts interpreted as unsigned big-endian
/// integers. Pure-inbound certificates total zero.
pub fn total_withdrawal_value(cert: &Certificate) -> BigUint {
    let mut total = BigUint::default();
    for exit in &cert.bridge_exits {
        if let Some(amount) = &exit.amount {
            total += BigUint::from_bytes_be(&amount.value);
        }
    }
    total
}

/// Dollar value of all bridge exits under the price map, or `None` when any
/// exit references an unpriced token (callers treat that as suspicious).
///
/// The division happens before the multiplication and truncates; the
/// threshold comparison depends on that order.
pub fn certificate_dollar_value(
    cert: &Certificate,
    prices: &HashMap<String, TokenValue>,
) -> Option<BigUint> {
    let mut total = BigUint::default();

    for exit in &cert.bridge_exits {
        let Some(address) = exit
            .token_info
            .as_ref()
            .and_then(|t| t.origin_token_address.as_ref())
        else {
            continue;
        };

        let token = prices.get(&address_hex(&address.value))?;

        let amount = exit
            .amount
            .as_ref()
            .map(|a| BigUint::from_bytes_be(&a.value))
            .unwrap_or_default();
        let whole_tokens = amount / BigUint::from(token.multiplier.max(1));
        total += whole_tokens * BigUint::from(token.dollar_value);
    }

    Some(total)
}

/// Normalize raw address bytes to the canonical 40-char lower-case hex form:
/// keep the rightmost 20 bytes, left-pad short inputs with zeroes.
fn address_hex(bytes: &[u8]) -> String {
    let mut addr = [0u8; 20];
    if bytes.len() >= 20 {
        addr.copy_from_slice(&bytes[bytes.len() - 20..]);
    } else {
        addr[20 - bytes.len()..].copy_from_slice(bytes);
    }
    hex::encode(addr)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use certgate_proto::interop_v1::{BridgeExit, FixedBytes20, FixedBytes32, TokenInfo};

    fn addr(byte: u8) -> String {
        hex::encode([byte; 20])
    }

    fn exit_for(address_byte: u8, amount: u64) -> BridgeExit {
        BridgeExit {
            token_info: Some(TokenInfo {
                origin_network: 0,
                origin_token_address: Some(FixedBytes20 {
                    value: vec![address_byte; 20],
                }),
            }),
            amount: Some(FixedBytes32 {
                value: amount.to_be_bytes().to_vec(),
            }),
            ..Default::default()
        }
    }

    fn cert_with(exits: Vec<BridgeExit>) -> Certificate {
        Certificate {
            bridge_exits: exits,
            ..Default::default()
        }
    }

    #[test]
    fn parse_round_trips_the_map() {
        let raw = format!("{}:1:1,{}:2:1", addr(0x11).to_uppercase(), addr(0x22));
        let parsed = parse_token_values(&raw).unwrap();
        assert_eq!(parsed.len(), 2);

        // Addresses are lower-cased on parse.
        let one = parsed.get(&addr(0x11)).unwrap();
        assert_eq!(one.dollar_value, 1);
        assert_eq!(one.multiplier, 1);

        let two = parsed.get(&addr(0x22)).unwrap();
        assert_eq!(two.dollar_value, 2);
        assert_eq!(two.multiplier, 1);
    }

    #[test]
    fn parse_is_all_or_nothing() {
        let raw = format!("{}:1:1,bogus", addr(0x11));
        assert!(parse_token_values(&raw).is_err());

        assert!(parse_token_values("").is_err());
        assert!(parse_token_values("abc:1:1").is_err());
        assert!(parse_token_values(&format!("{}:x:1", addr(0x11))).is_err());
        assert!(parse_token_values(&format!("{}:1:x", addr(0x11))).is_err());
        // 0x prefix makes the address 42 characters, which is rejected
        assert!(parse_token_values(&format!("0x{}:1:1", addr(0x11))).is_err());
    }

    #[test]
    fn withdrawal_value_sums_amounts() {
        let cert = cert_with(vec![exit_for(0x11, 100), exit_for(0x22, 23)]);
        assert_eq!(total_withdrawal_value(&cert), BigUint::from(123u32));

        let empty = cert_with(vec![]);
        assert_eq!(total_withdrawal_value(&empty), BigUint::default());
    }

    #[test]
    fn value_over_threshold_detected() {
        let prices =
            parse_token_values(&format!("{}:1:1,{}:2:1", addr(0x11), addr(0x22))).unwrap();

        // 10000 x $2 = 20000
        let cert = cert_with(vec![exit_for(0x22, 10_000)]);
        let total = certificate_dollar_value(&cert, &prices).unwrap();
        assert!(total > BigUint::from(1000u64));

        // 400 x $2 = 800
        let cert = cert_with(vec![exit_for(0x22, 400)]);
        let total = certificate_dollar_value(&cert, &prices).unwrap();
        assert!(total <= BigUint::from(1000u64));
    }

    #[test]
    fn unknown_token_is_none() {
        let prices = parse_token_values(&format!("{}:1:1", addr(0x11))).unwrap();
        let cert = cert_with(vec![exit_for(0x99, 5)]);
        assert!(certificate_dollar_value(&cert, &prices).is_none());
    }

    #[test]
    fn division_truncates_before_pricing() {
        // 1999 / 1000 = 1 whole token, worth $3 -- not $5.997
        let prices = parse_token_values(&format!("{}:3:1000", addr(0x11))).unwrap();
        let cert = cert_with(vec![exit_for(0x11, 1999)]);
        let total = certificate_dollar_value(&cert, &prices).unwrap();
        assert_eq!(total, BigUint::from(3u32));
    }

    #[test]
    fn exits_without_token_info_are_skipped() {
        let prices = parse_token_values(&format!("{}:1:1", addr(0x11))).unwrap();
        let mut exit = exit_for(0x11, 10);
        exit.token_info = None;
        let cert = cert_with(vec![exit]);
        assert_eq!(
            certificate_dollar_value(&cert, &prices).unwrap(),
            BigUint::default()
        );
    }
}
