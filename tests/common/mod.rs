// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use arbor::{Manager, triples};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Routes engine events to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// The tree `1 -> {2, 3}, 4` (4 declares the missing parent 99) in session "main".
#[allow(dead_code)]
pub fn library() -> Manager<u32, &'static str> {
    init_tracing();
    arbor::enable_determinism();
    let mut manager = Manager::new();
    manager
        .transaction_mut()
        .initialize_session(
            "main",
            triples![(1, None, "A"), (2, Some(1), "B"), (3, Some(1), "C"), (4, Some(99), "D")],
        )
        .expect("valid batch");
    manager
}
