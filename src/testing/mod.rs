use single_utilities::traits::FloatOps;

pub mod correction;
pub mod effect;
pub mod inference;

pub mod utils;

#[derive(Debug, Clone, Copy)]
pub enum Alternative {
    TwoSided,
    Less,
    Greater,
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (e.g. rank-sum z-score, LRT statistic)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Effect size measurement, when the test yields one
    pub effect_size: Option<T>,
    /// Standard error of the effect size or test statistic
    pub standard_error: Option<T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            effect_size: None,
            standard_error: None,
        }
    }

    /// The neutral result used when a statistic is undefined for a gene.
    pub fn neutral() -> Self {
        TestResult::new(T::zero(), T::one())
    }

    pub fn with_effect_size(mut self, effect_size: T) -> Self {
        self.effect_size = Some(effect_size);
        self
    }

    pub fn with_standard_error(mut self, se: T) -> Self {
        self.standard_error = Some(se);
        self
    }

    /// Replace non-finite statistic or p-value by the neutral values.
    pub fn finite_or_neutral(self) -> Self {
        if num_traits::Float::is_finite(self.statistic) && num_traits::Float::is_finite(self.p_value) {
            self
        } else {
            TestResult::neutral()
        }
    }
}
