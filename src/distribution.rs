use crate::backend::{Backend, BackendError};
use crate::consts::*;
use crate::model::{Address, Distribution};
use crate::units::{Percent, Wei};

fn entry(address: &Address, total: Wei, tenths: u32, label: impl Into<String>) -> Distribution {
    Distribution {
        address: address.clone(),
        amount: total.apply_permille(tenths).to_native_string(),
        percentage: Percent::from_tenths(tenths),
        label: label.into(),
    }
}

/// Split a package payment across the company wallet and the buyer's
/// referrer chain.
///
/// The company always takes 10%. A direct referrer takes 70.2%, ancestors at
/// levels 2..=11 take 1.8% each, and whatever percentage is left after the
/// walk goes back to the company. The split is all-or-fallback: if the store
/// fails at any point, the whole amount is routed to the company instead of
/// executing a partial list.
pub async fn calculate_distributions(
    backend: &dyn Backend,
    company: &Address,
    user_id: u64,
    total: Wei,
) -> Vec<Distribution> {
    match try_calculate(backend, company, user_id, total).await {
        Ok(distributions) => distributions,
        Err(err) => {
            tracing::warn!(user_id, "distribution calculation failed, routing full amount to company: {err}");
            vec![Distribution {
                address: company.clone(),
                amount: total.to_native_string(),
                percentage: Percent::from_tenths(RATE_DENOMINATOR),
                label: "Company (Error Recovery)".into(),
            }]
        }
    }
}

async fn try_calculate(
    backend: &dyn Backend,
    company: &Address,
    user_id: u64,
    total: Wei,
) -> Result<Vec<Distribution>, BackendError> {
    let buyer = backend
        .user_by_id(user_id)
        .await?
        .ok_or(BackendError::NotFound("buyer"))?;

    let mut distributions = vec![entry(company, total, COMPANY_RATE, "Company")];

    if let Some(direct_id) = buyer.referrer_id {
        let direct = backend
            .user_by_id(direct_id)
            .await?
            .ok_or(BackendError::NotFound("direct referrer"))?;
        distributions.push(entry(&direct.wallet_address, total, DIRECT_REFERRER_RATE, "Direct Referrer"));

        // Walk upward from the direct referrer. Level 1 is the direct
        // referrer itself and is already paid above; an absent row or a
        // missing referrer link ends the walk. The level cap is the only
        // protection against a cyclic chain.
        let mut current = direct_id;
        let mut level = 1u32;
        while level <= MAX_REFERRAL_LEVELS {
            let Some(ancestor) = backend.user_by_id(current).await? else {
                break;
            };
            if level > 1 {
                distributions.push(entry(
                    &ancestor.wallet_address,
                    total,
                    LEVEL_RATE,
                    format!("Level {level} Referrer"),
                ));
            }
            let Some(next) = ancestor.referrer_id else {
                break;
            };
            current = next;
            level += 1;
        }
    }

    let collected: u32 = distributions.iter().map(|d| d.percentage.tenths()).sum();
    if collected < RATE_DENOMINATOR {
        distributions.push(entry(company, total, RATE_DENOMINATOR - collected, "Company (Remainder)"));
    }

    Ok(distributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{test_wallet, MockBackend};

    fn company() -> Address {
        DEFAULT_COMPANY_WALLET.parse().unwrap()
    }

    fn one_native() -> Wei {
        Wei::from_native_str("1").unwrap()
    }

    fn percentage_sum(distributions: &[Distribution]) -> u32 {
        distributions.iter().map(|d| d.percentage.tenths()).sum()
    }

    fn amount_sum(distributions: &[Distribution]) -> Wei {
        distributions
            .iter()
            .fold(Wei::zero(), |acc, d| acc + Wei::from_native_str(&d.amount).unwrap())
    }

    #[tokio::test]
    async fn no_referrer_splits_company_and_remainder() {
        let backend = MockBackend::new().with_user(1, &test_wallet(1), None);
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        assert_eq!(dists.len(), 2);
        assert_eq!(dists[0].label, "Company");
        assert_eq!(dists[0].percentage, Percent::from_tenths(100));
        assert_eq!(dists[1].label, "Company (Remainder)");
        assert_eq!(dists[1].percentage, Percent::from_tenths(900));
        assert_eq!(dists[1].amount, "0.9");
        assert_eq!(percentage_sum(&dists), RATE_DENOMINATOR);
        assert_eq!(amount_sum(&dists), one_native());
    }

    #[tokio::test]
    async fn chain_of_three_matches_expected_amounts() {
        let backend = MockBackend::new().with_chain(3);
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        let summary: Vec<(&str, &str)> = dists.iter().map(|d| (d.label.as_str(), d.amount.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                ("Company", "0.1"),
                ("Direct Referrer", "0.702"),
                ("Level 2 Referrer", "0.018"),
                ("Level 3 Referrer", "0.018"),
                ("Company (Remainder)", "0.162"),
            ]
        );
        assert_eq!(amount_sum(&dists), one_native());

        // Direct referrer is user 2, level 2 is user 3, level 3 is user 4.
        assert_eq!(dists[1].address.as_str(), test_wallet(2));
        assert_eq!(dists[2].address.as_str(), test_wallet(3));
        assert_eq!(dists[3].address.as_str(), test_wallet(4));
    }

    #[tokio::test]
    async fn single_referrer_gets_direct_share_only() {
        let backend = MockBackend::new().with_chain(1);
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        assert_eq!(dists.len(), 3);
        assert_eq!(dists[1].label, "Direct Referrer");
        assert_eq!(dists[1].percentage, Percent::from_tenths(702));
        assert_eq!(dists[2].label, "Company (Remainder)");
        assert_eq!(dists[2].percentage, Percent::from_tenths(198));
    }

    #[tokio::test]
    async fn walk_is_capped_at_eleven_levels() {
        // 15 ancestors available, but only levels 2..=11 may earn.
        let backend = MockBackend::new().with_chain(15);
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        let levels: Vec<&str> = dists
            .iter()
            .filter(|d| d.label.starts_with("Level"))
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(levels.first().copied(), Some("Level 2 Referrer"));
        assert_eq!(levels.last().copied(), Some("Level 11 Referrer"));
        assert_eq!(levels.len(), 10);

        // 10 + 70.2 + 10 * 1.8 = 98.2, so 1.8 flows back to the company.
        let last = dists.last().unwrap();
        assert_eq!(last.label, "Company (Remainder)");
        assert_eq!(last.percentage, Percent::from_tenths(18));
        assert_eq!(percentage_sum(&dists), RATE_DENOMINATOR);
        assert_eq!(amount_sum(&dists), one_native());
    }

    #[tokio::test]
    async fn percentages_always_sum_to_one_hundred() {
        for chain_len in 0..=12u64 {
            let backend = MockBackend::new().with_chain(chain_len);
            let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;
            assert_eq!(percentage_sum(&dists), RATE_DENOMINATOR, "chain length {chain_len}");
            assert_eq!(amount_sum(&dists), one_native(), "chain length {chain_len}");
        }
    }

    #[tokio::test]
    async fn store_failure_on_buyer_lookup_falls_back_to_company() {
        let backend = MockBackend::new().with_chain(3).fail_user(1);
        let total = one_native();
        let dists = calculate_distributions(&backend, &company(), 1, total).await;

        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].label, "Company (Error Recovery)");
        assert_eq!(dists[0].percentage, Percent::from_tenths(1000));
        assert_eq!(dists[0].address, company());
        assert_eq!(dists[0].amount, "1.0");
    }

    #[tokio::test]
    async fn store_failure_mid_walk_discards_partial_results() {
        // Direct referrer resolves, then the level-3 ancestor read fails.
        let backend = MockBackend::new().with_chain(5).fail_user(4);
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].label, "Company (Error Recovery)");
        assert_eq!(dists[0].amount, "1.0");
    }

    #[tokio::test]
    async fn missing_buyer_row_falls_back_to_company() {
        let backend = MockBackend::new();
        let dists = calculate_distributions(&backend, &company(), 42, one_native()).await;

        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].label, "Company (Error Recovery)");
    }

    #[tokio::test]
    async fn dangling_referrer_link_ends_walk_with_remainder() {
        // Buyer's chain references user 3, which has no row.
        let backend = MockBackend::new()
            .with_user(1, &test_wallet(1), Some(2))
            .with_user(2, &test_wallet(2), Some(3));
        let dists = calculate_distributions(&backend, &company(), 1, one_native()).await;

        // Direct share is kept; the missing ancestor just ends the walk.
        assert_eq!(dists[1].label, "Direct Referrer");
        assert_eq!(dists.last().unwrap().label, "Company (Remainder)");
        assert_eq!(percentage_sum(&dists), RATE_DENOMINATOR);
    }

    #[tokio::test]
    async fn large_payment_splits_without_drift() {
        let backend = MockBackend::new().with_chain(7);
        let total = Wei::from_native_str("123.456").unwrap();
        let dists = calculate_distributions(&backend, &company(), 1, total).await;

        assert_eq!(percentage_sum(&dists), RATE_DENOMINATOR);
        assert_eq!(amount_sum(&dists), total);
    }
}
