use std::fmt::Display;
use std::ops::RangeInclusive;
use crate::utils::QueueError;

/// Validates that `value` lies within `range`
pub fn ensure_in_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> Result<(), QueueError>
where
    T: PartialOrd + Display + Copy,
{
    if !range.contains(&value) {
        return Err(QueueError::invalid(format!(
            "Invalid {} value: {}. Must be between {} and {}",
            name, value, range.start(), range.end()
        )));
    }
    Ok(())
}

/// Validates a pixel dimension
pub fn ensure_positive_dimension(name: &str, value: u32) -> Result<(), QueueError> {
    if value == 0 {
        return Err(QueueError::invalid(format!("{} cannot be 0", name)));
    }
    Ok(())
}

/// Validates a finite, strictly positive fraction or factor
pub fn ensure_positive_finite(name: &str, value: f32) -> Result<(), QueueError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(QueueError::invalid(format!(
            "Invalid {} value: {}. Must be a positive number", name, value
        )));
    }
    Ok(())
}

/// Validates membership in a closed list of accepted values
pub fn ensure_one_of<T>(name: &str, value: T, accepted: &[T]) -> Result<(), QueueError>
where
    T: PartialEq + Display + Copy,
{
    if !accepted.contains(&value) {
        let list = accepted
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(QueueError::invalid(format!(
            "Invalid {} value: {}. Must be one of {}", name, value, list
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_reports_bounds() {
        let err = ensure_in_range("quality", 0u8, 1..=100).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameters: Invalid quality value: 0. Must be between 1 and 100"
        );
        assert!(ensure_in_range("quality", 100u8, 1..=100).is_ok());
    }

    #[test]
    fn rejects_nan_factors() {
        assert!(ensure_positive_finite("scale", f32::NAN).is_err());
        assert!(ensure_positive_finite("scale", -1.0).is_err());
        assert!(ensure_positive_finite("scale", 0.5).is_ok());
    }
}
