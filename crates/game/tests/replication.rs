use std::collections::BTreeMap;

use arcade::sync::{GameSchema, GameSync, MemoryStore, ParticipantId, Patch, SyncConfig};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// Two sub-trees, one per writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Ledger {
    host: BTreeMap<String, i64>,
    guest: BTreeMap<String, i64>,
}

impl GameSchema for Ledger {
    const GAME_ID: &'static str = "ledger_v1";
}

fn join(store: &MemoryStore, id: &str) -> GameSync<Ledger> {
    GameSync::attach(
        Box::new(store.connect()),
        "replay",
        ParticipantId::new(id),
        Ledger::default(),
        SyncConfig::default(),
        0,
    )
}

/// (writer is host, field, value); `None` deletes the field.
fn write_strategy() -> impl Strategy<Value = (bool, u8, Option<i64>)> {
    (any::<bool>(), 0u8..4, proptest::option::weighted(0.8, -50i64..50))
}

proptest! {
    #[test]
    fn interleaved_single_writer_patches_match_sequential_replay(
        writes in proptest::collection::vec(write_strategy(), 1..40)
    ) {
        let store = MemoryStore::new();
        let mut host = join(&store, "host");
        let mut guest = join(&store, "guest");

        let mut expected = Ledger::default();
        for (now, &(by_host, field, value)) in writes.iter().enumerate() {
            let (sync, subtree, owned) = if by_host {
                (&mut host, "host", &mut expected.host)
            } else {
                (&mut guest, "guest", &mut expected.guest)
            };
            let path = format!("{subtree}.f{field}");
            let patch = match value {
                Some(value) => Patch::new().set(path, value),
                None => Patch::new().remove(path),
            };
            sync.propose_update(patch, now as u64 + 1).unwrap();

            match value {
                Some(value) => owned.insert(format!("f{field}"), value),
                None => owned.remove(&format!("f{field}")),
            };
        }

        host.poll(100);
        guest.poll(100);
        prop_assert_eq!(host.payload(), Some(&expected));
        prop_assert_eq!(guest.payload(), Some(&expected));
    }
}

#[test]
fn whole_transition_overwrites_every_field() {
    let store = MemoryStore::new();
    let mut host = join(&store, "host");
    let mut guest = join(&store, "guest");

    guest
        .propose_update(Patch::new().set("guest.f0", 7), 1)
        .unwrap();

    let mut next = Ledger::default();
    next.host.insert("f1".into(), 3);
    host.propose_update(Patch::from_fields(&next).unwrap(), 2)
        .unwrap();

    guest.poll(3);
    assert_eq!(guest.payload(), Some(&next));
}
