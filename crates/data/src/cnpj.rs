//! CNPJ (Cadastro Nacional da Pessoa Jurídica) normalization and validation
//!
//! Company tax ids: 8-digit root, 4-digit branch, 2 check digits.

use tracing::debug;

/// Number of digits in a normalized CNPJ
pub const CNPJ_LEN: usize = 14;

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// CNPJ validator with normalization and formatting
#[derive(Debug, Clone)]
pub struct CnpjMatcher {
    validate_digits: bool,
}

impl Default for CnpjMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CnpjMatcher {
    /// Create a matcher that verifies check digits
    pub fn new() -> Self {
        Self {
            validate_digits: true,
        }
    }

    /// Create a matcher that only checks length
    pub fn without_validation() -> Self {
        Self {
            validate_digits: false,
        }
    }

    /// Normalize a CNPJ to its 14 digits
    pub fn normalize(&self, cnpj: &str) -> Option<String> {
        let digits: String = cnpj.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() != CNPJ_LEN {
            debug!(digits_len = digits.len(), "Invalid CNPJ length");
            return None;
        }

        Some(digits)
    }

    /// Whether the CNPJ has a valid length and check digits
    pub fn is_valid(&self, cnpj: &str) -> bool {
        let Some(normalized) = self.normalize(cnpj) else {
            return false;
        };

        let digits: Vec<u32> = normalized.chars().filter_map(|c| c.to_digit(10)).collect();

        if digits.iter().all(|&d| d == digits[0]) {
            debug!("CNPJ with all same digits");
            return false;
        }

        if !self.validate_digits {
            return true;
        }

        let (first, second) = check_digits(&digits[..12]);
        digits[12] == first && digits[13] == second
    }

    /// Format as `00.000.000/0000-00`
    pub fn format(&self, cnpj: &str) -> Option<String> {
        let n = self.normalize(cnpj)?;
        Some(format!(
            "{}.{}.{}/{}-{}",
            &n[0..2],
            &n[2..5],
            &n[5..8],
            &n[8..12],
            &n[12..14]
        ))
    }

    /// Root (first 8 digits), shared by every branch of a company
    pub fn root(&self, cnpj: &str) -> Option<String> {
        self.normalize(cnpj).map(|n| n[0..8].to_string())
    }

    /// Whether the branch number is `0001`
    pub fn is_headquarters(&self, cnpj: &str) -> bool {
        self.normalize(cnpj)
            .map(|n| &n[8..12] == "0001")
            .unwrap_or(false)
    }
}

/// Compute both CNPJ check digits for the 12-digit base
pub fn check_digits(base: &[u32]) -> (u32, u32) {
    let first = weighted(base, &FIRST_WEIGHTS);
    let mut extended = base.to_vec();
    extended.push(first);
    let second = weighted(&extended, &SECOND_WEIGHTS);
    (first, second)
}

fn weighted(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        11 - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let matcher = CnpjMatcher::new();

        assert_eq!(
            matcher.normalize("11.222.333/0001-81"),
            Some("11222333000181".to_string())
        );
        assert_eq!(matcher.normalize("1234567890"), None);
    }

    #[test]
    fn test_is_valid() {
        let matcher = CnpjMatcher::new();

        assert!(matcher.is_valid("11.222.333/0001-81"));
        assert!(matcher.is_valid("33.000.167/0001-01"));
        assert!(!matcher.is_valid("11.222.333/0001-82"));
        assert!(!matcher.is_valid("11.111.111/1111-11"));
    }

    #[test]
    fn test_format_and_root() {
        let matcher = CnpjMatcher::new();

        assert_eq!(
            matcher.format("33000167000101"),
            Some("33.000.167/0001-01".to_string())
        );
        assert_eq!(matcher.root("33000167000101"), Some("33000167".to_string()));
        assert!(matcher.is_headquarters("33000167000101"));
    }
}
