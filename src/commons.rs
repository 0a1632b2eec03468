//! Integer coercion and map merging.
use std::collections::HashMap;
use std::hash::Hash;

use crate::Error;

/// Whether `value` is a finite whole number.
pub fn is_integer(value: f64) -> bool {
    value.is_finite() && value.floor() == value
}

/// Converts `value` to an integer, failing if it is not a finite whole number
/// representable as `i64`.
pub fn get_integer(value: f64) -> Result<i64, Error> {
    if !is_integer(value) || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        tracing::debug!(value, "not an integer");
        return Err(Error::NotAnInteger(format!("{value} is not an integer")));
    }
    Ok(value as i64)
}

/// Like [`get_integer`], then checks the result with `validator`.
///
/// A failed check reports `message`, or "`<value>` is not a valid value"
/// when no message is given.
pub fn get_integer_with<F>(value: f64, validator: F, message: Option<&str>) -> Result<i64, Error>
where
    F: FnOnce(i64) -> bool,
{
    let n = get_integer(value)?;
    if validator(n) {
        Ok(n)
    } else {
        Err(Error::OutOfRange(match message {
            Some(message) => message.to_string(),
            None => format!("{value} is not a valid value"),
        }))
    }
}

/// Like [`get_integer`], with `default` standing in for a missing value.
pub fn get_integer_or(value: Option<f64>, default: i64) -> Result<i64, Error> {
    value.map_or(Ok(default), get_integer)
}

/// Sets `key` to `value` unless the value is missing. A missing target starts
/// a fresh map.
pub fn set_property<K, V>(target: Option<HashMap<K, V>>, key: K, value: Option<V>) -> HashMap<K, V>
where
    K: Eq + Hash,
{
    let mut target = target.unwrap_or_default();
    if let Some(value) = value {
        target.insert(key, value);
    }
    target
}

/// Assigns the entries of each source onto `target` from left to right,
/// skipping missing sources and missing values.
pub fn merge<K, V, S>(target: Option<HashMap<K, V>>, sources: S) -> HashMap<K, V>
where
    K: Eq + Hash,
    S: IntoIterator<Item = Option<HashMap<K, Option<V>>>>,
{
    sources
        .into_iter()
        .flatten()
        .flatten()
        .fold(target.unwrap_or_default(), |target, (key, value)| {
            set_property(Some(target), key, value)
        })
}
