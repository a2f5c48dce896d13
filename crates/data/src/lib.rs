//! # AgroADB Data
//!
//! Validation and normalization for the Brazilian tax ids that identify the
//! subject of an investigation.
//!
//! - **CPF**: individual taxpayer registry, 11 digits
//! - **CNPJ**: company registry, 14 digits
//! - **Subject**: a validated CPF or CNPJ, the key of every lookup
//!
//! ## Example
//!
//! ```rust
//! use agroadb_data::{Subject, SubjectKind};
//!
//! let subject = Subject::parse("529.982.247-25").unwrap();
//! assert_eq!(subject.kind(), SubjectKind::Cpf);
//! assert_eq!(subject.masked(), "529.***.***-25");
//! ```

pub mod cnpj;
pub mod cpf;
pub mod subject;

pub use cnpj::CnpjMatcher;
pub use cpf::CpfMatcher;
pub use subject::{Subject, SubjectError, SubjectKind};
