//! Random workloads checked against the reference model, locally and
//! remotely.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tenantdb_core::{EmulatedStore, EntityDatabase, PrincipalId, Snapshot, StoreConfig};
use tenantdb_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn emulated_store_matches_model(ops in store_ops_strategy(24)) {
        let mut store = EmulatedStore::new();
        let mut model = ModelCheck::new();
        model.apply_all(&mut store, &ops).unwrap();
        prop_assert_eq!(model.verify(&mut store), Ok(()));
    }

    #[test]
    fn remote_client_matches_model(ops in store_ops_strategy(24), batch_size in 1usize..4) {
        let backend = test_backend(batch_size);
        let mut client = loopback_client(&backend, "model");
        let mut model = ModelCheck::new();
        model.apply_all(&mut client, &ops).unwrap();
        prop_assert_eq!(model.verify(&mut client), Ok(()));
    }

    #[test]
    fn snapshot_restores_model_state(ops in store_ops_strategy(24)) {
        let mut store = EmulatedStore::new();
        let mut model = ModelCheck::new();
        model.apply_all(&mut store, &ops).unwrap();

        let bytes = store.to_snapshot().to_bytes().unwrap();
        let snapshot = Snapshot::from_bytes(&bytes).unwrap();
        let mut restored = EmulatedStore::from_snapshot(snapshot, StoreConfig::default()).unwrap();
        prop_assert_eq!(model.verify(&mut restored), Ok(()));
    }
}

fn owners(names: &[&str]) -> BTreeSet<PrincipalId> {
    names.iter().copied().map(PrincipalId::new).collect()
}

#[test]
fn remote_transaction_rollback_restores_model_state() {
    let backend = test_backend(2);
    let mut client = loopback_client(&backend, "rollback");
    let mut model = ModelCheck::new();

    let setup = [
        StoreOp::Save {
            slot: 0,
            data: serde_json::json!({ "Name": "Keep", "Level": 1 }),
            owners: owners(&["alice", "bob"]),
        },
        StoreOp::Save {
            slot: 1,
            data: serde_json::json!({ "Name": "Also", "Level": 2 }),
            owners: owners(&["carol"]),
        },
    ];
    model.apply_all(&mut client, &setup).unwrap();
    let checkpoint = model.clone();

    client.start_transaction().unwrap();
    let churn = [
        StoreOp::RemoveOwner {
            slot: 0,
            owner: "alice".into(),
        },
        StoreOp::Delete { slot: 1 },
        StoreOp::Save {
            slot: 2,
            data: serde_json::json!({ "Name": "Gone", "Level": 3 }),
            owners: owners(&["dave"]),
        },
    ];
    model.apply_all(&mut client, &churn).unwrap();
    assert_eq!(model.verify(&mut client), Ok(()));
    client.rollback_transaction().unwrap();

    assert_eq!(checkpoint.verify(&mut client), Ok(()));
}
