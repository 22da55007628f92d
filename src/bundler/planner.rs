use crate::errors::{BundlerError, Result};
use crate::models::strategy::{Allocation, BPS_DENOMINATOR};
use log::debug;
use rand::Rng;

/// Splits `total_lamports` across `wallet_count` wallets.
///
/// Before variance the amounts sum to exactly `total_lamports`; the integer
/// remainder always lands on wallet 0. Variance then moves every amount
/// independently inside `[-variance_percent, +variance_percent]`, never below 0.
pub fn plan<R: Rng + ?Sized>(
    total_lamports: u64,
    wallet_count: usize,
    allocation: &Allocation,
    variance_percent: f64,
    rng: &mut R,
) -> Result<Vec<u64>> {
    if wallet_count == 0 {
        return Err(BundlerError::Config("wallet count must be greater than zero".to_string()));
    }
    if !(0.0..=100.0).contains(&variance_percent) {
        return Err(BundlerError::Config(format!(
            "variance_percent must be within 0..=100, got {}",
            variance_percent
        )));
    }

    let mut amounts = match allocation {
        Allocation::Equal => split_equal(total_lamports, wallet_count),
        Allocation::Weighted(weights) | Allocation::Custom(weights) => {
            split_weighted(total_lamports, wallet_count, weights)?
        }
    };

    let band_bps = (variance_percent * 100.0).round() as i64;
    if band_bps > 0 {
        for amount in amounts.iter_mut() {
            let delta_bps = rng.gen_range(-band_bps..=band_bps);
            *amount = apply_variance(*amount, delta_bps);
        }
    }

    debug!("Planned {} amounts from {} lamports: {:?}", wallet_count, total_lamports, amounts);
    Ok(amounts)
}

fn split_equal(total: u64, n: usize) -> Vec<u64> {
    let share = total / n as u64;
    let mut amounts = vec![share; n];
    amounts[0] += total - share * n as u64;
    amounts
}

fn split_weighted(total: u64, n: usize, weights: &[u64]) -> Result<Vec<u64>> {
    if weights.len() != n {
        return Err(BundlerError::Config(format!(
            "{} allocation weights given for {} wallets",
            weights.len(),
            n
        )));
    }
    let weight_sum: u128 = weights.iter().map(|w| *w as u128).sum();
    if weight_sum == 0 {
        return Err(BundlerError::Config("allocation weights must not all be zero".to_string()));
    }

    let mut amounts: Vec<u64> = weights
        .iter()
        .map(|w| (total as u128 * *w as u128 / weight_sum) as u64)
        .collect();
    let assigned: u64 = amounts.iter().sum();
    amounts[0] += total - assigned;
    Ok(amounts)
}

fn apply_variance(amount: u64, delta_bps: i64) -> u64 {
    let delta = amount as i128 * delta_bps as i128 / BPS_DENOMINATOR as i128;
    (amount as i128 + delta).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SOL: u64 = 1_000_000_000;

    #[test]
    fn equal_split_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let amounts = plan(10 * SOL, 5, &Allocation::Equal, 0.0, &mut rng).unwrap();
        assert_eq!(amounts, vec![2 * SOL; 5]);
    }

    #[test]
    fn remainder_goes_to_first_wallet() {
        let mut rng = StdRng::seed_from_u64(1);
        let amounts = plan(10 * SOL, 3, &Allocation::Equal, 0.0, &mut rng).unwrap();
        assert_eq!(amounts, vec![3_333_333_334, 3_333_333_333, 3_333_333_333]);
        assert_eq!(amounts.iter().sum::<u64>(), 10 * SOL);
    }

    #[test]
    fn weighted_split_normalizes() {
        let mut rng = StdRng::seed_from_u64(1);
        let amounts = plan(1_000, 3, &Allocation::Weighted(vec![1, 2, 1]), 0.0, &mut rng).unwrap();
        assert_eq!(amounts, vec![250, 500, 250]);

        let custom = plan(10, 3, &Allocation::Custom(vec![5, 5, 5]), 0.0, &mut rng).unwrap();
        assert_eq!(custom, vec![4, 3, 3]);
    }

    #[test]
    fn variance_stays_in_band_and_is_reproducible() {
        let total = 10 * SOL;
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first = plan(total, 20, &Allocation::Equal, 10.0, &mut a).unwrap();
        let second = plan(total, 20, &Allocation::Equal, 10.0, &mut b).unwrap();
        assert_eq!(first, second);

        let base = total / 20;
        for amount in &first {
            assert!(*amount >= base * 9 / 10 && *amount <= base * 11 / 10, "{} out of band", amount);
        }
    }

    #[test]
    fn full_variance_saturates_at_zero() {
        assert_eq!(apply_variance(100, -10_000), 0);
        assert_eq!(apply_variance(100, 10_000), 200);
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(plan(1, 0, &Allocation::Equal, 0.0, &mut rng).is_err());
        assert!(plan(1, 2, &Allocation::Weighted(vec![1]), 0.0, &mut rng).is_err());
        assert!(plan(1, 2, &Allocation::Weighted(vec![0, 0]), 0.0, &mut rng).is_err());
        assert!(plan(1, 2, &Allocation::Equal, 150.0, &mut rng).is_err());
    }
}
