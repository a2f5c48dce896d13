//! Lookup subjects
//!
//! A [`Subject`] is a validated CPF or CNPJ. Construction is the only place
//! where document format is checked; everything downstream can rely on the
//! digits being well formed.

use crate::cnpj::{CnpjMatcher, CNPJ_LEN};
use crate::cpf::{CpfMatcher, CPF_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing a subject document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    #[error("document must have 11 (CPF) or 14 (CNPJ) digits, found {0}")]
    InvalidLength(usize),

    #[error("invalid {kind} check digits")]
    InvalidCheckDigits { kind: SubjectKind },

    #[error("document is empty")]
    Empty,
}

/// Kind of Brazilian tax id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// Individual (Cadastro de Pessoa Física)
    Cpf,
    /// Company (Cadastro Nacional da Pessoa Jurídica)
    Cnpj,
}

impl SubjectKind {
    /// Both kinds, in a stable order
    pub const ALL: [SubjectKind; 2] = [SubjectKind::Cpf, SubjectKind::Cnpj];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Cpf => "cpf",
            SubjectKind::Cnpj => "cnpj",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Cpf => write!(f, "CPF"),
            SubjectKind::Cnpj => write!(f, "CNPJ"),
        }
    }
}

/// A validated CPF or CNPJ
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject {
    kind: SubjectKind,
    digits: String,
}

impl Subject {
    /// Parse and validate a document in any common punctuation style
    pub fn parse(input: &str) -> Result<Self, SubjectError> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

        let kind = match digits.len() {
            0 => return Err(SubjectError::Empty),
            CPF_LEN => SubjectKind::Cpf,
            CNPJ_LEN => SubjectKind::Cnpj,
            n => return Err(SubjectError::InvalidLength(n)),
        };

        let valid = match kind {
            SubjectKind::Cpf => CpfMatcher::new().is_valid(&digits),
            SubjectKind::Cnpj => CnpjMatcher::new().is_valid(&digits),
        };
        if !valid {
            return Err(SubjectError::InvalidCheckDigits { kind });
        }

        Ok(Self { kind, digits })
    }

    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    /// Normalized digits, no punctuation
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Standard punctuated form
    pub fn formatted(&self) -> String {
        let d = &self.digits;
        match self.kind {
            SubjectKind::Cpf => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
            SubjectKind::Cnpj => format!(
                "{}.{}.{}/{}-{}",
                &d[0..2],
                &d[2..5],
                &d[5..8],
                &d[8..12],
                &d[12..14]
            ),
        }
    }

    /// Form safe to write to logs and audit trails
    ///
    /// CPFs identify natural persons and keep only the first three and last
    /// two digits. CNPJs are public registry data and stay intact.
    pub fn masked(&self) -> String {
        match self.kind {
            SubjectKind::Cpf => format!("{}.***.***-{}", &self.digits[0..3], &self.digits[9..11]),
            SubjectKind::Cnpj => self.formatted(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl FromStr for Subject {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::parse(s)
    }
}

impl TryFrom<String> for Subject {
    type Error = SubjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Subject::parse(&value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.digits
    }
}
