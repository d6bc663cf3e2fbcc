use super::*;

fn sample_keys(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("key-{i}").into_bytes()).collect()
}

#[test]
fn owner_is_none_on_an_empty_ring() {
    let ring = HashRing::new(8);
    assert_eq!(ring.owner(b"anything"), None);
    assert!(ring.successors(b"anything", 3).is_empty());
}

#[test]
fn adding_the_same_node_twice_is_a_no_op() {
    let mut ring = HashRing::new(8);
    ring.add_node("a");
    let points_after_first = ring.points.len();
    ring.add_node("a");
    assert_eq!(ring.points.len(), points_after_first);
    assert_eq!(ring.len(), 1);
}

#[test]
fn removing_an_absent_node_is_a_no_op() {
    let mut ring = HashRing::new(8);
    ring.add_node("a");
    ring.remove_node("b");
    assert_eq!(ring.len(), 1);
}

#[test]
fn equal_replicas_and_node_sets_produce_identical_mappings() {
    let ring_a = HashRing::build(16, ["a", "b", "c"]);
    let ring_b = HashRing::build(16, ["a", "b", "c"]);

    for key in sample_keys(200) {
        assert_eq!(ring_a.owner(&key), ring_b.owner(&key));
        assert_eq!(ring_a.successors(&key, 2), ring_b.successors(&key, 2));
    }
}

#[test]
fn successors_returns_distinct_addresses_up_to_ring_size() {
    let ring = HashRing::build(32, ["a", "b", "c"]);
    for key in sample_keys(100) {
        let succ = ring.successors(&key, 5);
        assert_eq!(succ.len(), 3, "only 3 distinct nodes exist, truncation should cap there");
        let unique: BTreeSet<_> = succ.iter().collect();
        assert_eq!(unique.len(), succ.len(), "successors must be distinct addresses");
    }
}

#[test]
fn successors_starts_at_the_owner() {
    let ring = HashRing::build(32, ["a", "b", "c", "d"]);
    for key in sample_keys(50) {
        let owner = ring.owner(&key).unwrap();
        let succ = ring.successors(&key, 1);
        assert_eq!(succ, vec![owner]);
    }
}

#[test]
fn adding_the_kth_node_moves_roughly_one_kth_of_keys() {
    let keys = sample_keys(5000);
    let mut ring = HashRing::build(100, ["n0", "n1", "n2"]);

    let before: Vec<String> = keys.iter().map(|k| ring.owner(k).unwrap()).collect();
    ring.add_node("n3");
    let after: Vec<String> = keys.iter().map(|k| ring.owner(k).unwrap()).collect();

    let moved = before.iter().zip(after.iter()).filter(|(b, a)| b != a).count();
    let fraction_moved = moved as f64 / keys.len() as f64;

    // Adding the 4th node should move close to 1/4 of keys; allow generous
    // slack since this is a statistical property, not an exact one.
    assert!(
        fraction_moved > 0.10 && fraction_moved < 0.40,
        "expected roughly 1/4 of keys to move, got {fraction_moved}"
    );
}

#[test]
fn distribution_variance_is_within_tolerance_for_many_virtual_points() {
    let keys = sample_keys(10_000);
    let ring = HashRing::build(200, ["n0", "n1", "n2", "n3", "n4"]);

    let mut counts = std::collections::HashMap::new();
    for key in &keys {
        *counts.entry(ring.owner(key).unwrap()).or_insert(0usize) += 1;
    }

    let ideal = keys.len() as f64 / ring.len() as f64;
    for count in counts.values() {
        let deviation = (*count as f64 - ideal).abs() / ideal;
        assert!(deviation < 0.15, "node load {count} deviates {deviation:.2} from ideal {ideal}");
    }
}
