//! On-demand loading, deferred wiring and bootstrap types

mod common;

use devshell_bytecode::{access, flags, Insn, MemberRef, TypeImage};
use devshell_engine::dispatch::UNRESOLVED;
use devshell_engine::loader::resource_path;
use devshell_engine::unit::unit_flags;
use devshell_engine::{
    BridgeError, BridgeOptions, CompiledUnit, DirectoryResources, DispatchIdOracle,
    InjectionState, NativeHost, NativeMethod, ResolvingHost, StaticResources, TypeOrigin,
    UnitStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A user class that calls through the marker hierarchy
fn marker_caller(name: &str) -> Vec<u8> {
    TypeImage::new(name, Some("java/lang/Object"))
        .with_method(
            "poke",
            "(Lm/M2;)V",
            access::PUBLIC,
            vec![
                Insn::LoadLocal(1),
                Insn::InvokeVirtual(MemberRef::new("m/M2", "foo", "()V")),
                Insn::Return,
            ],
        )
        .encode()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_shared_types_are_not_reloaded() {
    common::init_logging();
    let object = common::object_type();
    let session = common::builder(common::store())
        .shared_type(object.clone())
        .build()
        .unwrap();

    let loaded = session.load_type("java.lang.Object").unwrap();
    assert!(Arc::ptr_eq(&loaded, &object));
    assert_eq!(loaded.origin(), TypeOrigin::Shared);
    assert_eq!(session.defined_count(), 0);
}

#[test]
fn test_types_are_defined_once() {
    let session = common::session();

    let first = session.load_type("app.Widget").unwrap();
    let second = session.load_type("app.Widget").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.origin(), TypeOrigin::Compiled);
    assert_eq!(first.superclass().unwrap().binary_name(), "java.lang.Object");
}

#[test]
fn test_supertypes_load_first() {
    let session = common::session();

    let derived = session.load_type("app.Derived").unwrap();
    assert!(session.is_defined("app.Base"));
    assert!(derived.is_subtype_of("app.Base"));
    assert_eq!(session.defined_count(), 2);
}

#[test]
fn test_missing_type() {
    let session = common::session();

    let err = session.load_type("app.Nowhere").unwrap_err();
    assert!(matches!(err, BridgeError::TypeNotFound { ref name } if name == "app.Nowhere"));
    assert_eq!(session.injection_state(), InjectionState::Idle);
}

#[test]
fn test_unit_in_error_is_never_loaded() {
    let mut store = common::store();
    store.add_unit(
        CompiledUnit::new("app.Broken")
            .with_flags(unit_flags::ERROR)
            .with_class(
                "app/Broken",
                TypeImage::new("app/Broken", Some("java/lang/Object")).encode(),
            )
            .with_native_method(NativeMethod::new("boom", &[], "")),
    );
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(store).host(host.clone()).build().unwrap();

    let err = session.load_type("app.Broken").unwrap_err();
    assert!(matches!(err, BridgeError::UnitInError { ref unit, .. } if unit == "app.Broken"));
    assert!(!session.is_defined("app.Broken"));
    assert!(host.wired_units().is_empty());
    assert_eq!(session.resolve_handle("@app.Broken::boom()").unwrap(), UNRESOLVED);
}

#[test]
fn test_generated_class_from_registry() {
    let mut store = common::store();
    store.add_synthetic(
        "app/Widget$1",
        TypeImage::new("app/Widget$1", Some("java/lang/Object")).encode(),
    );
    let session = common::builder(store).build().unwrap();

    let anon = session.load_type("app.Widget$1").unwrap();
    assert_eq!(anon.binary_name(), "app.Widget$1");
    // A named class of a known unit is never synthesized
    assert!(matches!(
        session.load_type("app.Widget$Gone"),
        Err(BridgeError::TypeNotFound { .. })
    ));
}

#[test]
fn test_corrupt_image() {
    let mut store = common::store();
    store.add_unit(CompiledUnit::new("app.Bad").with_class("app/Bad", vec![1, 2, 3]));
    let session = common::builder(store).build().unwrap();

    assert!(matches!(session.load_type("app.Bad"), Err(BridgeError::Decode { .. })));
    assert_eq!(session.injection_state(), InjectionState::Idle);
}

#[test]
fn test_overlay_units_are_not_rewritten() {
    let mut store = common::store();
    store.add_unit(
        CompiledUnit::new("app.Emulated")
            .with_flags(unit_flags::COMPILED | unit_flags::OVERLAY)
            .with_class("app/Emulated", marker_caller("app/Emulated")),
    );
    store.add_unit(CompiledUnit::new("app.Plain").with_class("app/Plain", marker_caller("app/Plain")));
    let session = common::builder(store).build().unwrap();

    let emulated = session.load_type("app.Emulated").unwrap();
    assert_eq!(emulated.origin(), TypeOrigin::Compiled);
    let poke = emulated.image().method("poke", "(Lm/M2;)V").unwrap();
    assert_eq!(poke.code[1], Insn::InvokeVirtual(MemberRef::new("m/M2", "foo", "()V")));

    let plain = session.load_type("app.Plain").unwrap();
    assert_eq!(plain.origin(), TypeOrigin::Rewritten);
}

// ============================================================================
// Wiring
// ============================================================================

#[test]
fn test_each_unit_is_wired_once() {
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(common::store()).host(host.clone()).build().unwrap();

    session.load_type("app.Widget").unwrap();
    session.load_type("app.Widget$Part").unwrap();
    session.load_type("app.Widget").unwrap();
    assert_eq!(host.wired_units(), vec!["app.Widget"]);

    // Wiring resolved both references, loading the nested class on the way
    let wired = host.wired();
    assert_eq!(wired.len(), 1);
    assert_eq!(wired[0].name, "describe");
    assert_eq!(wired[0].handles.len(), 2);
    assert!(wired[0].handles.iter().all(|(_, handle)| *handle != UNRESOLVED));
    assert_eq!(session.pending_injections(), 0);
}

#[test]
fn test_supertype_units_are_wired_first() {
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(common::store()).host(host.clone()).build().unwrap();

    session.load_type("app.Derived").unwrap();
    assert_eq!(host.wired_units(), vec!["app.Base", "app.Derived"]);

    let hello = host.wired().into_iter().find(|m| m.name == "hello").unwrap();
    assert_eq!(hello.handles.len(), 1);
    assert_ne!(hello.handles[0].1, UNRESOLVED);
}

#[test]
fn test_host_attached_later() {
    let session = common::session();
    session.load_type("app.Base").unwrap();

    let host = Arc::new(ResolvingHost::new());
    session.attach_host(host.clone());
    session.load_type("app.Derived").unwrap();
    // app.Base was drained without a host and is not wired again
    assert_eq!(host.wired_units(), vec!["app.Derived"]);
}

#[test]
fn test_concurrent_loads() {
    let host = Arc::new(ResolvingHost::new());
    let session = Arc::new(common::builder(common::store()).host(host.clone()).build().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            std::thread::spawn(move || {
                let derived = session.load_type("app.Derived").unwrap();
                let handle = session.resolve_handle("@app.Derived::greet()").unwrap();
                (derived, handle)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (derived, handle) in &results {
        assert!(Arc::ptr_eq(derived, &results[0].0));
        assert_eq!(*handle, results[0].1);
    }
    assert_eq!(host.wired_units(), vec!["app.Base", "app.Derived"]);
}

fn unit_with_body(name: &str, image: TypeImage, body: &str) -> CompiledUnit {
    let internal = image.name.clone();
    CompiledUnit::new(name)
        .with_class(internal, image.encode())
        .with_native_method(NativeMethod::new("bridge", &[], body))
}

#[test]
fn test_failed_load_still_wires_defined_supertypes() {
    let mut store = common::store();
    store.add_unit(unit_with_body(
        "app.S",
        TypeImage::new("app/S", Some("java/lang/Object")).with_field("v", "I", access::PUBLIC),
        "return this.@app.S::v;",
    ));
    store.add_unit(CompiledUnit::new("app.A").with_class(
        "app/A",
        TypeImage::new("app/A", Some("app/S"))
            .with_interface("app/Missing")
            .encode(),
    ));
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(store).host(host.clone()).build().unwrap();

    assert!(matches!(
        session.load_type("app.A"),
        Err(BridgeError::TypeNotFound { ref name }) if name == "app.Missing"
    ));
    assert!(!session.is_defined("app.A"));
    assert!(session.is_defined("app.S"));
    assert_eq!(host.wired_units(), vec!["app.S"]);
    assert_eq!(session.pending_injections(), 0);
    assert_eq!(session.injection_state(), InjectionState::Idle);

    session.load_type("app.S").unwrap();
    assert_eq!(host.wired_units(), vec!["app.S"]);
    assert_ne!(host.wired()[0].handles[0].1, UNRESOLVED);
}

#[test]
fn test_units_referencing_each_other() {
    let mut store = common::store();
    store.add_unit(unit_with_body(
        "app.Ping",
        TypeImage::new("app/Ping", Some("java/lang/Object")).with_field("y", "I", access::PUBLIC),
        "return this.@app.Pong::x;",
    ));
    store.add_unit(unit_with_body(
        "app.Pong",
        TypeImage::new("app/Pong", Some("java/lang/Object")).with_field("x", "I", access::PUBLIC),
        "return this.@app.Ping::y;",
    ));
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(store).host(host.clone()).build().unwrap();

    session.load_type("app.Ping").unwrap();
    assert!(session.is_defined("app.Pong"));
    assert_eq!(host.wired_units(), vec!["app.Ping", "app.Pong"]);

    let wired = host.wired();
    assert_eq!(wired.len(), 2);
    assert!(wired
        .iter()
        .flat_map(|m| m.handles.iter())
        .all(|(_, handle)| *handle != UNRESOLVED));

    session.load_type("app.Pong").unwrap();
    assert_eq!(host.wired().len(), 2);
}

#[test]
fn test_wiring_references_recursively_loaded_supertype() {
    let mut store = common::store();
    store.add_unit(unit_with_body(
        "app.Trunk",
        TypeImage::new("app/Trunk", Some("java/lang/Object"))
            .with_field("z", "I", access::PUBLIC)
            .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return]),
        "return @app.Leaf::new()();",
    ));
    store.add_unit(unit_with_body(
        "app.Leaf",
        TypeImage::new("app/Leaf", Some("app/Trunk"))
            .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return]),
        "return this.@app.Trunk::z + this.@app.Leaf::z;",
    ));
    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(store).host(host.clone()).build().unwrap();

    session.load_type("app.Leaf").unwrap();
    assert_eq!(host.wired_units(), vec!["app.Trunk", "app.Leaf"]);

    let wired = host.wired();
    let handles: Vec<_> = wired.iter().flat_map(|m| m.handles.iter()).collect();
    assert_eq!(handles.len(), 3);
    assert!(handles.iter().all(|(_, handle)| *handle != UNRESOLVED));

    // The inherited field resolves to the supertype's declaration
    let leaf_z = wired[1].handles[1].1;
    let desc = session.descriptor_for(leaf_z).unwrap();
    assert_eq!(desc.binary_name(), "app.Leaf");
    let member = desc.member(devshell_engine::dispatch::member_id_of(leaf_z)).unwrap();
    assert_eq!(member.declaring_type, "app.Trunk");
}

// ============================================================================
// Bootstrap Types
// ============================================================================

#[test]
fn test_bootstrap_types_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(resource_path("boot.Host"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, marker_caller("boot/Host")).unwrap();

    let host = Arc::new(ResolvingHost::new());
    let session = common::builder(common::store())
        .options(BridgeOptions {
            bootstrap_types: vec!["boot.Host".to_string()],
            ..common::options()
        })
        .resources(DirectoryResources::new(dir.path()))
        .host(host.clone())
        .build()
        .unwrap();

    let boot = session.load_type("boot.Host").unwrap();
    assert_eq!(boot.origin(), TypeOrigin::Bootstrap);
    // Never rewritten
    let poke = boot.image().method("poke", "(Lm/M2;)V").unwrap();
    assert_eq!(poke.code[1], Insn::InvokeVirtual(MemberRef::new("m/M2", "foo", "()V")));
    assert_eq!(host.bootstrapped(), vec!["boot.Host"]);
    assert!(host.wired_units().is_empty());
}

#[test]
fn test_missing_bootstrap_fails_construction() {
    let result = common::builder(common::store())
        .options(BridgeOptions {
            bootstrap_types: vec!["boot.Host".to_string()],
            ..common::options()
        })
        .resources(StaticResources::new())
        .build();
    assert!(matches!(result, Err(BridgeError::BootstrapMissing { ref name, .. }) if name == "boot.Host"));
}

// ============================================================================
// Dumps and Reset
// ============================================================================

#[test]
fn test_rewritten_images_are_dumped() {
    let dir = tempfile::tempdir().unwrap();
    let session = common::builder(common::store())
        .options(BridgeOptions {
            dump_dir: Some(dir.path().to_path_buf()),
            ..common::options()
        })
        .build()
        .unwrap();

    session.load_type("app.User").unwrap();
    session.load_type("app.Widget").unwrap();

    let dumped = std::fs::read(dir.path().join("app/User.img")).unwrap();
    let image = TypeImage::decode(&dumped).unwrap();
    assert_ne!(image.flags & flags::REWRITTEN, 0);
    assert!(!dir.path().join("app/Widget.img").exists());
}

#[derive(Default)]
struct CountingHost {
    ended: AtomicUsize,
}

impl NativeHost for CountingHost {
    fn create_native_methods(
        &self,
        _unit: &CompiledUnit,
        _methods: &[NativeMethod],
        _oracle: &dyn DispatchIdOracle,
    ) {
    }

    fn session_ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_reset() {
    let host = Arc::new(CountingHost::default());
    let session = common::builder(common::store()).host(host.clone()).build().unwrap();

    let handle = session.resolve_handle("@app.Widget::size()").unwrap();
    let native: Arc<dyn std::any::Any + Send + Sync> = Arc::new(5u32);
    session.identity_cache().put_native(7, &native);

    session.reset();
    assert_eq!(host.ended.load(Ordering::SeqCst), 1);
    assert!(session.descriptor_for(handle).is_none());
    assert!(session.identity_cache().is_empty());
    assert!(session.is_defined("app.Widget"));

    // A second reset has no host left to notify
    session.reset();
    assert_eq!(host.ended.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_registry() {
    let session = common::builder(UnitStore::new()).build().unwrap();
    assert_eq!(session.resolve_handle("@app.Widget::size()").unwrap(), UNRESOLVED);
    assert_eq!(session.defined_count(), 0);
}
