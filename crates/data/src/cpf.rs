//! CPF (Cadastro de Pessoa Física) normalization and validation
//!
//! Brazilian individual taxpayer registry number, 11 digits with two
//! modulo-11 check digits.

use tracing::debug;

/// Number of digits in a normalized CPF
pub const CPF_LEN: usize = 11;

/// CPF validator with normalization and formatting
#[derive(Debug, Clone)]
pub struct CpfMatcher {
    /// Whether to validate check digits
    validate_digits: bool,
}

impl Default for CpfMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CpfMatcher {
    /// Create a matcher that verifies check digits
    pub fn new() -> Self {
        Self {
            validate_digits: true,
        }
    }

    /// Create a matcher that only checks length (fixtures, sandbox data)
    pub fn without_validation() -> Self {
        Self {
            validate_digits: false,
        }
    }

    /// Strip punctuation and whitespace, returning the 11 digits
    ///
    /// Accepts "123.456.789-09", "12345678909", " 123 456 789 09 ".
    pub fn normalize(&self, cpf: &str) -> Option<String> {
        let digits: String = cpf.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() != CPF_LEN {
            debug!(digits_found = digits.len(), "Invalid CPF length");
            return None;
        }

        Some(digits)
    }

    /// Format as `000.000.000-00`
    pub fn format(&self, cpf: &str) -> Option<String> {
        let n = self.normalize(cpf)?;
        Some(format!("{}.{}.{}-{}", &n[0..3], &n[3..6], &n[6..9], &n[9..11]))
    }

    /// Whether the CPF has a valid length and check digits
    pub fn is_valid(&self, cpf: &str) -> bool {
        let Some(digits) = self.normalize(cpf) else {
            return false;
        };

        if !self.validate_digits {
            return true;
        }

        let values: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();

        if values.iter().all(|&d| d == values[0]) {
            debug!("CPF has all same digits");
            return false;
        }

        let (first, second) = check_digits(&values[..9]);
        if values[9] != first || values[10] != second {
            debug!(
                expected = %format!("{}{}", first, second),
                "CPF check digits mismatch"
            );
            return false;
        }

        true
    }

    /// Compare two CPFs after normalization
    pub fn matches(&self, a: &str, b: &str) -> bool {
        matches!((self.normalize(a), self.normalize(b)), (Some(x), Some(y)) if x == y)
    }
}

/// Compute both CPF check digits for the 9-digit base
pub fn check_digits(base: &[u32]) -> (u32, u32) {
    let first = mod11(base, 10);
    let mut extended = base.to_vec();
    extended.push(first);
    let second = mod11(&extended, 11);
    (first, second)
}

fn mod11(digits: &[u32], start_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| d * (start_weight - i as u32))
        .sum();
    let rem = (sum * 10) % 11;
    if rem == 10 {
        0
    } else {
        rem
    }
}
