//! Session configuration and identity caches

mod common;

use devshell_engine::{BridgeError, BridgeOptions, HostedSession, TypeCatalog, UnitStore};
use std::any::Any;
use std::sync::Arc;

type Shared = Arc<dyn Any + Send + Sync>;

#[test]
fn test_session_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devshell.toml");
    std::fs::write(
        &path,
        r#"
marker_root = "m.Root"
rewrite = true
"#,
    )
    .unwrap();

    let options = BridgeOptions::from_file(&path).unwrap();
    let session = common::builder(common::store()).options(options).build().unwrap();
    assert!(session.rewriter().is_some());
    assert_eq!(session.options().marker_root.as_deref(), Some("m.Root"));
}

#[test]
fn test_invalid_options_fail_construction() {
    let result = HostedSession::builder(Arc::new(UnitStore::new()), Arc::new(TypeCatalog::new()))
        .options(BridgeOptions {
            marker_root: Some("java.lang.Object".to_string()),
            ..BridgeOptions::default()
        })
        .build();
    assert!(matches!(result, Err(BridgeError::Config(_))));

    let missing = BridgeOptions::from_file(&std::path::PathBuf::from("/nonexistent/devshell.toml"));
    assert!(matches!(missing, Err(BridgeError::Io(_))));
}

#[test]
fn test_identity_caches_hold_nothing_alive() {
    let session = common::session();
    let cache = session.identity_cache();

    let native: Shared = Arc::new(String::from("native"));
    let wrapper: Shared = Arc::new(42u64);
    cache.put_native(1, &native);
    cache.put_wrapper(&native, &wrapper);

    assert!(Arc::ptr_eq(&cache.get_native(1).unwrap(), &native));
    assert!(Arc::ptr_eq(&cache.get_wrapper(&native).unwrap(), &wrapper));

    drop(wrapper);
    assert!(cache.get_wrapper(&native).is_none());
    assert!(cache.get_native(1).is_some());

    drop(native);
    assert!(cache.get_native(1).is_none());
    assert_eq!(cache.purge(), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_identity_entries_are_replaced() {
    let session = common::session();
    let cache = session.identity_cache();

    let first: Shared = Arc::new(1u8);
    let second: Shared = Arc::new(2u8);
    cache.put_native(9, &first);
    cache.put_native(9, &second);
    assert!(Arc::ptr_eq(&cache.get_native(9).unwrap(), &second));
    assert_eq!(cache.native_len(), 1);
}
