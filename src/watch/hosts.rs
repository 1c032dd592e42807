use itertools::Itertools;

/// Compare two observations of a resource's desired hostnames as multisets:
/// duplicate hostnames are counted, not deduplicated away.
///
/// Returns `(added, removed, both)`, each sorted for deterministic apply
/// order. `both` holds hostnames present in the two inputs regardless of
/// multiplicity.
pub fn diff(previous: &[String], current: &[String]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let previous_counts = previous.iter().counts();
    let current_counts = current.iter().counts();

    let added = current_counts
        .iter()
        .filter(|(host, count)| **count > previous_counts.get(*host).copied().unwrap_or(0))
        .map(|(host, _)| (*host).clone())
        .sorted()
        .collect();

    let removed = previous_counts
        .iter()
        .filter(|(host, count)| **count > current_counts.get(*host).copied().unwrap_or(0))
        .map(|(host, _)| (*host).clone())
        .sorted()
        .collect();

    let both = previous_counts
        .keys()
        .filter(|host| current_counts.contains_key(*host))
        .map(|host| (*host).clone())
        .sorted()
        .collect();

    (added, removed, both)
}

/// Order-insensitive, length-sensitive hostname set equality.
pub fn same_hosts(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();

    a == b
}
