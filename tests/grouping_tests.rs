//! Grouper laws
//!
//! Account-disjoint grouping is the foundation of the parallel phases, so
//! its guarantees get checked against constructed blocks:
//!
//! - account sets of distinct groups never intersect
//! - relative order within a group equals the source block order
//! - the partition is reproducible, and regrouping a group is the identity
//! - transfer-self grouping keys on the sender only, utxo grouping on both
//!   sender and recipient

use std::collections::HashSet;

use lib_blockplay::{group_disjoint, KeyId, Transaction, TxEnvelope, TxKind};

// ============================================================================
// Helpers
// ============================================================================

fn utxo(from: i64, to: i64, tag: u8) -> Transaction {
    let raw = TxEnvelope {
        kind: TxKind::Utxo,
        key_id: KeyId(from),
        timestamp: 1_700_000_000,
        ecosystem_id: 1,
        contract_name: String::new(),
        utxo_to: Some(KeyId(to)),
        payload: vec![tag],
    }
    .encode();
    Transaction::unmarshal(&raw).unwrap()
}

fn transfer_self(key: i64, tag: u8) -> Transaction {
    let raw = TxEnvelope {
        kind: TxKind::TransferSelf,
        key_id: KeyId(key),
        timestamp: 1_700_000_000,
        ecosystem_id: 1,
        contract_name: String::new(),
        utxo_to: None,
        payload: vec![tag],
    }
    .encode();
    Transaction::unmarshal(&raw).unwrap()
}

fn account_sets(groups: &[(u16, Vec<Transaction>)]) -> Vec<HashSet<KeyId>> {
    groups
        .iter()
        .map(|(_, txs)| txs.iter().flat_map(|t| t.accounts()).collect())
        .collect()
}

fn hashes(groups: &[(u16, Vec<Transaction>)]) -> Vec<(u16, Vec<lib_blockplay::TxHash>)> {
    groups
        .iter()
        .map(|(serial, txs)| (*serial, txs.iter().map(Transaction::hash).collect()))
        .collect()
}

// ============================================================================
// Laws
// ============================================================================

#[test]
fn disjoint_fan_out_shape() {
    // A→B, C→D, A→E: the two A transactions share a group, C→D stands alone.
    let groups = group_disjoint(vec![utxo(1, 2, 0), utxo(3, 4, 1), utxo(1, 5, 2)]);

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0, 1);
    assert_eq!(groups[1].0, 2);

    let first: Vec<i64> = groups[0].1.iter().map(|t| t.key_id().0).collect();
    assert_eq!(first, vec![1, 1]);
    let sets = account_sets(&groups);
    assert_eq!(sets[0], [KeyId(1), KeyId(2), KeyId(5)].into_iter().collect());
    assert_eq!(sets[1], [KeyId(3), KeyId(4)].into_iter().collect());
}

#[test]
fn groups_are_pairwise_disjoint_on_larger_blocks() {
    let txs = vec![
        utxo(1, 2, 0),
        utxo(3, 4, 1),
        utxo(5, 6, 2),
        utxo(2, 7, 3),
        utxo(8, 3, 4),
        utxo(9, 10, 5),
        utxo(7, 1, 6),
    ];
    let groups = group_disjoint(txs);
    let sets = account_sets(&groups);
    for (i, a) in sets.iter().enumerate() {
        for b in sets.iter().skip(i + 1) {
            assert!(a.is_disjoint(b), "group account sets intersect");
        }
    }
}

#[test]
fn order_within_groups_follows_the_source_block() {
    let txs = vec![
        utxo(10, 11, 0),
        utxo(20, 30, 1),
        utxo(30, 10, 2), // joins the first group and links in the second tx
        utxo(40, 41, 3),
    ];
    let groups = group_disjoint(txs);
    assert_eq!(groups.len(), 2);
    let senders: Vec<i64> = groups[0].1.iter().map(|t| t.key_id().0).collect();
    assert_eq!(senders, vec![10, 20, 30], "source order must survive grouping");
}

#[test]
fn transfer_self_groups_key_on_sender_only() {
    let groups = group_disjoint(vec![
        transfer_self(1, 0),
        transfer_self(2, 1),
        transfer_self(1, 2),
    ]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].1.len(), 2);
    assert_eq!(groups[1].1.len(), 1);
}

#[test]
fn partition_is_reproducible() {
    let build = || {
        vec![
            utxo(1, 2, 0),
            utxo(3, 4, 1),
            utxo(1, 5, 2),
            utxo(4, 6, 3),
            utxo(7, 8, 4),
        ]
    };
    assert_eq!(hashes(&group_disjoint(build())), hashes(&group_disjoint(build())));
}

#[test]
fn regrouping_a_group_is_the_identity() {
    let groups = group_disjoint(vec![
        utxo(1, 2, 0),
        utxo(3, 4, 1),
        utxo(1, 5, 2),
        utxo(4, 6, 3),
    ]);
    for (_, txs) in groups {
        let before: Vec<_> = txs.iter().map(Transaction::hash).collect();
        let regrouped = group_disjoint(txs);
        assert_eq!(regrouped.len(), 1, "one group must regroup to itself");
        let after: Vec<_> = regrouped[0].1.iter().map(Transaction::hash).collect();
        assert_eq!(before, after);
    }
}

#[test]
fn every_transaction_lands_in_exactly_one_group() {
    let txs = vec![
        utxo(1, 2, 0),
        utxo(3, 4, 1),
        utxo(5, 6, 2),
        utxo(1, 3, 3),
        utxo(7, 8, 4),
    ];
    let all: HashSet<_> = txs.iter().map(Transaction::hash).collect();
    let groups = group_disjoint(txs);

    let mut seen = HashSet::new();
    for (_, group) in &groups {
        for tx in group {
            assert!(seen.insert(tx.hash()), "transaction appears in two groups");
        }
    }
    assert_eq!(seen, all);
}
