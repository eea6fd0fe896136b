// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Walks one element through its lifecycle: assembled, read, edited, committed, moved and
//! removed again.

use arbor::{Manager, triples};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut manager = Manager::<u32, String>::new();

    // Build the session from flat records. Record 4 names a parent that does not exist, so it
    // is placed directly below the root.
    manager.transaction_mut().initialize_session(
        "catalog",
        triples![
            (1, None, "books".to_owned()),
            (2, Some(1), "fiction".to_owned()),
            (3, Some(1), "poetry".to_owned()),
            (4, Some(99), "misc".to_owned()),
        ],
    )?;
    println!("assembled:\n{}\n", manager.root()?.render());

    // Reading hands out a snapshot. Editing it marks it detached and leaves the stored tree
    // alone until the edit is committed.
    let mut poetry = manager
        .get_element_by_id(&3)?
        .ok_or("poetry is stored")?;
    poetry.set_payload("verse".to_owned());
    poetry.set_id(30);
    println!("edited snapshot is {:?}", poetry.lifecycle());
    if let Err(err) = manager.cut(&poetry, None) {
        println!("cut before committing: {err}");
    }

    let verse = manager.update_element(&poetry)?;
    println!("committed {:?} as {:?}", verse.payload(), verse.id());

    // Committed elements can be moved again.
    let misc = manager.get_element_by_id(&4)?.ok_or("misc is stored")?;
    manager.cut(&verse, Some(&misc))?;
    println!("after the move:\n{}\n", manager.root()?.render());

    // Removing returns the subtree as new elements, ready to be persisted again.
    let removed = manager
        .remove_element(&misc)?
        .ok_or("misc was still stored")?;
    println!("removed {} elements", removed.size());
    manager.persist_element(&removed)?;
    println!("restored:\n{}", manager.root()?.render());

    Ok(())
}
