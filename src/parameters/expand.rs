//! Year-array expansion for inflation-indexed parameters

use crate::error::{TaxError, TaxResult};

/// Extend `raw` to `horizon` rows
///
/// Rows `[0, k)` are copied from `raw`. Row `i >= k` is row `i - 1`
/// multiplied element-wise by `1 + rates[i - 1]` when `inflate` is set,
/// otherwise a copy of row `i - 1`. `rates[i]` is the growth rate of the
/// year at row `i`, so reaching `horizon` needs `horizon - 1` rates.
/// Rows beyond `horizon` in `raw` are dropped.
pub fn expand(
    raw: &[Vec<f64>],
    horizon: usize,
    inflate: bool,
    rates: &[f64],
) -> TaxResult<Vec<Vec<f64>>> {
    if raw.is_empty() {
        return Err(TaxError::config("cannot expand an empty value array"));
    }
    if raw.len() >= horizon {
        return Ok(raw[..horizon].to_vec());
    }
    if inflate && rates.len() < horizon - 1 {
        return Err(TaxError::InsufficientRates {
            needed: horizon - 1,
            available: rates.len(),
        });
    }

    let mut rows = Vec::with_capacity(horizon);
    rows.extend_from_slice(raw);
    for i in raw.len()..horizon {
        let prev = &rows[i - 1];
        let next: Vec<f64> = if inflate {
            let factor = 1.0 + rates[i - 1];
            prev.iter().map(|v| v * factor).collect()
        } else {
            prev.clone()
        };
        rows.push(next);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_expansion() {
        let rows = expand(&[vec![100.0]], 4, true, &[0.02, 0.03, 0.04]).unwrap();
        assert_eq!(rows.len(), 4);
        assert_relative_eq!(rows[1][0], 102.0, epsilon = 1e-9);
        assert_relative_eq!(rows[2][0], 102.0 * 1.03, epsilon = 1e-9);
        assert_relative_eq!(rows[3][0], 102.0 * 1.03 * 1.04, epsilon = 1e-9);
    }

    #[test]
    fn test_rates_offset_by_known_rows() {
        // two known rows: the first derived row steps with rates[1]
        let raw = vec![vec![10.0, 20.0], vec![11.0, 22.0]];
        let rows = expand(&raw, 3, true, &[0.5, 0.1]).unwrap();
        assert_eq!(rows[..2], raw[..]);
        assert_relative_eq!(rows[2][0], 12.1, epsilon = 1e-9);
        assert_relative_eq!(rows[2][1], 24.2, epsilon = 1e-9);
    }

    #[test]
    fn test_no_inflation_holds_last_value() {
        let rows = expand(&[vec![5.0], vec![6.0]], 5, false, &[]).unwrap();
        assert!(rows[1..].iter().all(|r| r[0] == 6.0));
    }

    #[test]
    fn test_insufficient_rates() {
        let err = expand(&[vec![1.0]], 4, true, &[0.1, 0.1]).unwrap_err();
        assert!(matches!(
            err,
            TaxError::InsufficientRates {
                needed: 3,
                available: 2
            }
        ));
        assert!(expand(&[], 2, false, &[]).is_err());
    }

    #[test]
    fn test_truncates_to_horizon() {
        let rows = expand(&[vec![1.0], vec![2.0], vec![3.0]], 2, true, &[]).unwrap();
        assert_eq!(rows, vec![vec![1.0], vec![2.0]]);
    }
}
