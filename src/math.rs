//! Factorial, sum and product.
use std::ops::{Add, Mul};
use std::sync::OnceLock;

use crate::Error;

/// Largest `n` whose factorial is finite as an `f64`.
pub const MAX_FACTORIAL_ARGUMENT: i64 = 170;

static FACTORIALS: OnceLock<Vec<f64>> = OnceLock::new();

/// `n!`, or infinity once it overflows an `f64`.
pub fn factorial(n: i64) -> Result<f64, Error> {
    if n < 0 {
        return Err(Error::OutOfRange(
            "Factorial argument must be a non-negative integer".into(),
        ));
    }
    if n > MAX_FACTORIAL_ARGUMENT {
        return Ok(f64::INFINITY);
    }
    let table = FACTORIALS.get_or_init(|| {
        (1..=MAX_FACTORIAL_ARGUMENT).fold(vec![1.0], |mut table, i| {
            let previous = table[table.len() - 1];
            table.push(previous * i as f64);
            table
        })
    });
    Ok(table[n as usize])
}

/// Sum of `numbers`, or `None` if there are none.
pub fn sum<T>(numbers: &[T]) -> Option<T>
where
    T: Copy + Add<Output = T>,
{
    numbers.iter().copied().reduce(|acc, n| acc + n)
}

/// Product of `numbers`, or `None` if there are none.
pub fn product<T>(numbers: &[T]) -> Option<T>
where
    T: Copy + Mul<Output = T>,
{
    numbers.iter().copied().reduce(|acc, n| acc * n)
}
