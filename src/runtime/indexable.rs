use crate::error::{RuntimeError, TypeErrorKind};
use crate::runtime::value::Value;

/// Get/set by key plus a length. Implemented by lists, dicts and host lists.
pub trait Indexable {
    fn get_item(&self, key: &Value) -> Result<Value, RuntimeError>;
    fn set_item(&self, key: &Value, value: Value) -> Result<(), RuntimeError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps a list index onto `0..len`. Negative indices count from the end.
pub fn list_position(key: &Value, len: usize) -> Result<usize, TypeErrorKind> {
    let Value::Number(index) = key else {
        return Err(TypeErrorKind::NonNumericIndex);
    };
    if index.fract() != 0.0 || index.is_nan() {
        return Err(TypeErrorKind::FractionalIndex {
            index: key.to_string(),
        });
    }
    let len = len as f64;
    if *index >= len || -index > len {
        return Err(TypeErrorKind::IndexOutOfBounds);
    }
    let position = if *index < 0.0 { len + index } else { *index };
    Ok(position as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(list_position(&Value::Number(-1.0), 3), Ok(2));
        assert_eq!(list_position(&Value::Number(-3.0), 3), Ok(0));
    }

    #[test]
    fn rejects_out_of_bounds_indices() {
        assert_eq!(
            list_position(&Value::Number(3.0), 3),
            Err(TypeErrorKind::IndexOutOfBounds)
        );
        assert_eq!(
            list_position(&Value::Number(-4.0), 3),
            Err(TypeErrorKind::IndexOutOfBounds)
        );
        assert_eq!(
            list_position(&Value::Number(0.0), 0),
            Err(TypeErrorKind::IndexOutOfBounds)
        );
    }

    #[test]
    fn rejects_non_numeric_and_fractional_indices() {
        assert_eq!(
            list_position(&Value::Str("0".into()), 3),
            Err(TypeErrorKind::NonNumericIndex)
        );
        assert!(matches!(
            list_position(&Value::Number(0.5), 3),
            Err(TypeErrorKind::FractionalIndex { .. })
        ));
    }
}
