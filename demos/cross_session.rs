// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Two sessions side by side: subtrees are copied and moved between them, and a cloned session
//! keeps its own history.

use arbor::{Manager, Triple};
use serde_json::json;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut manager = Manager::<&str, serde_json::Value>::new();
    let tx = manager.transaction_mut();
    tx.initialize_session(
        "draft",
        [
            Triple::new("intro", None, json!({ "title": "Introduction" })),
            Triple::new("scope", Some("intro"), json!({ "title": "Scope" })),
        ],
    )?;
    tx.initialize_session(
        "published",
        [Triple::new("toc", None, json!({ "title": "Contents" }))],
    )?;
    tx.clone_session("published", "published-backup")?;
    tx.session_checkout("draft")?;

    let intro = manager.get_element_by_id(&"intro")?.ok_or("intro is stored")?;
    let toc = manager
        .transaction()
        .session("published")
        .and_then(|s| s.get(&"toc"))
        .ok_or("toc is stored")?;

    // Copying keeps the draft intact; the same ids now live in both sessions.
    manager.copy(&intro, Some(&toc))?;
    println!("draft still has intro: {}", manager.contains(&intro)?);
    if let Err(err) = manager.copy(&intro, Some(&toc)) {
        println!("second copy: {err}");
    }

    // Moving takes the subtree out of the draft.
    let backup_root = manager
        .transaction()
        .session("published-backup")
        .map(|s| s.root())
        .ok_or("backup exists")?;
    manager.cut(&intro, Some(&backup_root))?;
    println!("draft is empty: {}", manager.root()?.children().is_empty());

    for session in manager.transaction().sessions() {
        println!("{} {}", session.name(), session.root().to_json());
    }
    Ok(())
}
