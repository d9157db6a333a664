use common::chain::ContractError;

/// A relayer payload that can be turned into the domain value the contract
/// interface promises.
pub trait RelayerResponse<T> {
    fn to_domain(self) -> Result<T, ContractError>;
}

/// Token amounts are sent as decimal strings; they do not fit in a JSON number.
pub fn parse_amount(call: &'static str, field: &str, raw: &str) -> Result<u128, ContractError> {
    raw.trim()
        .parse::<u128>()
        .map_err(|e| ContractError::InvalidResponse {
            call,
            reason: format!("{field} {raw:?} is not an unsigned amount: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(
            parse_amount("getStakeDetails", "stakeAmount", "1000000000000000000000").unwrap(),
            1_000_000_000_000_000_000_000
        );
        assert!(matches!(
            parse_amount("getStakeDetails", "stakeAmount", "1e18"),
            Err(ContractError::InvalidResponse {
                call: "getStakeDetails",
                ..
            })
        ));
    }
}
