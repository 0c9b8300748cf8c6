use crate::testing::{Alternative, TestResult};
use statrs::distribution::{ChiSquared, ContinuousCDF, DiscreteCDF, Hypergeometric};
use statrs::function::gamma::ln_gamma;

/// One-sided Fisher exact test for the overlap of a query gene set with a
/// term gene set, drawn from a background universe of `background` genes.
///
/// The p-value is the hypergeometric upper tail `P(X >= overlap)`. The
/// effect size is the odds ratio of the 2x2 table, with a 0.5 correction on
/// every cell when any cell is zero so it stays finite.
pub fn fisher_overlap(
    overlap: u64,
    query_size: u64,
    term_size: u64,
    background: u64,
) -> anyhow::Result<TestResult<f64>> {
    if overlap > query_size || overlap > term_size {
        return Err(anyhow::anyhow!(
            "Overlap of {} exceeds query size {} or term size {}",
            overlap,
            query_size,
            term_size
        ));
    }
    if query_size > background || term_size > background {
        return Err(anyhow::anyhow!(
            "Background of {} genes is smaller than the query ({}) or term ({})",
            background,
            query_size,
            term_size
        ));
    }

    let hypergeometric = Hypergeometric::new(background, term_size, query_size)
        .map_err(|e| anyhow::anyhow!("Invalid hypergeometric parameters: {}", e))?;
    let p_value = if overlap == 0 {
        1.0
    } else {
        hypergeometric.sf(overlap - 1).clamp(0.0, 1.0)
    };

    let a = overlap as f64;
    let b = (query_size - overlap) as f64;
    let c = (term_size - overlap) as f64;
    let d = background.saturating_sub(query_size + term_size - overlap) as f64;
    let odds_ratio = if a == 0.0 || b == 0.0 || c == 0.0 || d == 0.0 {
        ((a + 0.5) * (d + 0.5)) / ((b + 0.5) * (c + 0.5))
    } else {
        (a * d) / (b * c)
    };

    Ok(TestResult::new(a, p_value).with_effect_size(odds_ratio))
}

/// Upper-tail p-value of a likelihood-ratio statistic against a chi-square
/// distribution with `df` degrees of freedom.
pub fn chi_square_p_value(statistic: f64, df: f64, alternative: Alternative) -> f64 {
    if !statistic.is_finite() {
        return if statistic == f64::INFINITY { 0.0 } else { 1.0 };
    }
    if statistic <= 0.0 {
        return 1.0;
    }

    match ChiSquared::new(df) {
        Ok(chi_dist) => match alternative {
            Alternative::Less => chi_dist.cdf(statistic),
            Alternative::TwoSided | Alternative::Greater => chi_dist.sf(statistic),
        },
        Err(_) => 1.0,
    }
}

/// Log-probability of a negative-binomial count with the given mean and
/// dispersion (`variance = mean + dispersion * mean^2`). A zero dispersion
/// is the Poisson limit.
pub fn negative_binomial_ln_pmf(count: f64, mean: f64, dispersion: f64) -> f64 {
    if mean <= 0.0 {
        return if count == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    if dispersion <= 0.0 {
        return count * mean.ln() - mean - ln_gamma(count + 1.0);
    }

    let size = 1.0 / dispersion;
    ln_gamma(count + size) - ln_gamma(size) - ln_gamma(count + 1.0)
        + size * (size / (size + mean)).ln()
        + count * (mean / (size + mean)).ln()
}
