/// Splits `items` into consecutive batches of at most `max` items each.
///
/// Produces `ceil(items.len() / max)` batches; only the last one may be shorter. A `max`
/// of zero is treated as one.
///
/// # Example
///
/// ```
/// use vernier::partition;
///
/// let batches = partition(&[1, 2, 3, 4, 5], 2);
///
/// assert_eq!(batches, [&[1, 2][..], &[3, 4], &[5]]);
/// ```
#[must_use]
pub fn partition<T>(items: &[T], max: usize) -> Vec<&[T]> {
    items.chunks(max.max(1)).collect()
}
