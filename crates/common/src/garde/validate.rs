//! Garde validation utilities.

use crate::domain::DomainError;
use garde::Validate;

/// Validate a struct and map every violation path through `classify`, which
/// returns a rank and a specific error. The lowest-ranked error wins; ties go
/// to the first reported. Garde orders its report by path name, so field
/// priority must come from the rank.
pub fn validate_with<T, F>(value: &T, classify: F) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
    F: Fn(&str) -> (u8, DomainError),
{
    match value.validate() {
        Ok(()) => Ok(()),
        Err(report) => Err(report
            .iter()
            .map(|(path, _)| classify(&path.to_string()))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, error)| error)
            .unwrap_or_else(|| DomainError::ValidationError("invalid request".to_string()))),
    }
}
