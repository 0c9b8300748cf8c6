//! Multiple testing correction for per-gene and per-term p-values.

use anyhow::{Result, anyhow};

/// Benjamini-Hochberg adjusted p-values, in input order.
///
/// Adjusted values are monotone in the raw p-values, capped at 1 and never
/// below the raw value. Errors on an empty slice or a value outside [0, 1].
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    if let Some((i, p)) = p_values
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
    }

    let n = p_values.len() as f64;
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![1.0; p_values.len()];
    let mut running_min = 1.0_f64;
    for (position, &gene) in order.iter().enumerate().rev() {
        let scaled = p_values[gene] * n / (position + 1) as f64;
        running_min = running_min.min(scaled);
        adjusted[gene] = running_min;
    }
    Ok(adjusted)
}

/// BH over the defined entries only; undefined entries stay `None`.
///
/// Genes whose statistic could not be computed do not count towards the
/// number of tests.
pub fn benjamini_hochberg_defined(p_values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    let defined: Vec<(usize, f64)> = p_values
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|p| (i, p)))
        .collect();

    let mut adjusted = vec![None; p_values.len()];
    if defined.is_empty() {
        return Ok(adjusted);
    }

    let raw: Vec<f64> = defined.iter().map(|&(_, p)| p).collect();
    let corrected = benjamini_hochberg_correction(&raw)?;
    for (&(i, _), q) in defined.iter().zip(corrected) {
        adjusted[i] = Some(q);
    }
    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_input_rejected() {
        let result = benjamini_hochberg_correction(&[]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "Empty p-value array");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let result = benjamini_hochberg_correction(&[0.01, -0.5, 0.03]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid p-value at index 1")
        );

        let result = benjamini_hochberg_correction(&[0.01, 1.5, 0.03]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unordered_input() {
        let p_values = vec![0.05, 0.01, 0.1, 0.04, 0.02];
        let expected = vec![0.0625, 0.05, 0.1, 0.0625, 0.05];
        let adjusted = benjamini_hochberg_correction(&p_values).unwrap();

        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_adjusted_never_below_raw() {
        let p_values = vec![0.3, 0.001, 0.9, 0.04, 0.5, 0.04];
        let adjusted = benjamini_hochberg_correction(&p_values).unwrap();
        for (p, q) in p_values.iter().zip(adjusted.iter()) {
            assert!(q >= p);
            assert!(*q <= 1.0);
        }
    }

    #[test]
    fn test_defined_skips_missing() {
        let p_values = vec![Some(0.01), None, Some(0.04)];
        let adjusted = benjamini_hochberg_defined(&p_values).unwrap();
        assert_eq!(adjusted[1], None);
        assert_relative_eq!(adjusted[0].unwrap(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(adjusted[2].unwrap(), 0.04, epsilon = 1e-12);

        let all_missing = benjamini_hochberg_defined(&[None, None]).unwrap();
        assert!(all_missing.iter().all(Option::is_none));
    }
}
