//! Shared fixtures for the integration tests

#![allow(dead_code)]

use devshell_bytecode::{access, Insn, MemberRef, TypeImage};
use devshell_engine::{
    BridgeOptions, CompiledUnit, HostedSession, MethodInfo, NativeMethod, RuntimeType,
    SessionBuilder, TypeCatalog, TypeHandle, TypeInfo, UnitStore,
};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn object_type() -> TypeHandle {
    RuntimeType::shared(
        TypeImage::new("java/lang/Object", None)
            .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return])
            .with_method(
                "toString",
                "()Ljava/lang/String;",
                access::PUBLIC,
                vec![Insn::ConstNull, Insn::ReturnValue],
            ),
        None,
    )
}

/// Metadata for the widget world plus the marker hierarchy
pub fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog.add_type(
        TypeInfo::class("java.lang.Object", None)
            .with_method(MethodInfo::instance("toString", "()Ljava/lang/String;")),
    );
    catalog.add_type(TypeInfo::class("app.Widget", Some("java.lang.Object")));
    catalog.add_type(TypeInfo::class("app.Widget$Part", Some("java.lang.Object")));
    catalog.add_type(TypeInfo::class("app.Base", Some("java.lang.Object")));
    catalog.add_type(TypeInfo::class("app.Derived", Some("app.Base")));
    catalog.add_type(TypeInfo::class("app.Broken", Some("java.lang.Object")));
    catalog.add_type(TypeInfo::class("m.Root", Some("java.lang.Object")));
    catalog.add_type(
        TypeInfo::class("m.M1", Some("m.Root")).with_method(MethodInfo::instance("foo", "()V")),
    );
    catalog.add_type(TypeInfo::class("m.M2", Some("m.M1")));
    catalog.add_type(TypeInfo::class("app.User", Some("java.lang.Object")));
    catalog
}

pub fn widget_unit() -> CompiledUnit {
    let widget = TypeImage::new("app/Widget", Some("java/lang/Object"))
        .with_field("size", "I", access::PUBLIC)
        .with_field("count", "I", access::PUBLIC | access::STATIC)
        .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return])
        .with_method("size", "()I", access::PUBLIC, vec![Insn::ConstInt(0), Insn::ReturnValue])
        .with_method("resize", "(I)V", access::PUBLIC, vec![Insn::Return])
        .with_method("resize", "(II)V", access::PUBLIC, vec![Insn::Return])
        .with_method("describe", "()Ljava/lang/String;", access::PUBLIC | access::NATIVE, vec![]);
    let part = TypeImage::new("app/Widget$Part", Some("java/lang/Object"))
        .with_field("x", "I", access::PUBLIC)
        .with_method("<init>", "(I)V", access::PUBLIC, vec![Insn::Return]);

    CompiledUnit::new("app.Widget")
        .with_class("app/Widget", widget.encode())
        .with_class("app/Widget$Part", part.encode())
        .with_native_method(NativeMethod::new(
            "describe",
            &[],
            "return this.@app.Widget::size() + this.@app.Widget.Part::x;",
        ))
}

pub fn base_units() -> (CompiledUnit, CompiledUnit) {
    let base = CompiledUnit::new("app.Base").with_class(
        "app/Base",
        TypeImage::new("app/Base", Some("java/lang/Object"))
            .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return])
            .with_method("greet", "()V", access::PUBLIC, vec![Insn::Return])
            .encode(),
    );
    let derived = CompiledUnit::new("app.Derived")
        .with_class(
            "app/Derived",
            TypeImage::new("app/Derived", Some("app/Base"))
                .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return])
                .with_method("hello", "()V", access::PUBLIC | access::NATIVE, vec![])
                .encode(),
        )
        .with_native_method(NativeMethod::new("hello", &[], "this.@app.Derived::greet()();"));
    (base, derived)
}

/// Marker hierarchy `m.Root` > `m.M1` (declares `foo`) > `m.M2`, and a user
/// calling `foo` through `m.M2`
pub fn marker_units() -> Vec<CompiledUnit> {
    let root = TypeImage::new("m/Root", Some("java/lang/Object"))
        .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return]);
    let m1 = TypeImage::new("m/M1", Some("m/Root"))
        .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return])
        .with_method("foo", "()V", access::PUBLIC, vec![Insn::Return]);
    let m2 = TypeImage::new("m/M2", Some("m/M1"))
        .with_method("<init>", "()V", access::PUBLIC, vec![Insn::Return]);
    let user = TypeImage::new("app/User", Some("java/lang/Object")).with_method(
        "run",
        "(Lm/M2;)V",
        access::PUBLIC,
        vec![
            Insn::LoadLocal(1),
            Insn::InvokeVirtual(MemberRef::new("m/M2", "foo", "()V")),
            Insn::New("m/M2".into()),
            Insn::Dup,
            Insn::InvokeSpecial(MemberRef::new("m/M2", "<init>", "()V")),
            Insn::Pop,
            Insn::Return,
        ],
    );

    vec![
        CompiledUnit::new("m.Root").with_class("m/Root", root.encode()),
        CompiledUnit::new("m.M1").with_class("m/M1", m1.encode()),
        CompiledUnit::new("m.M2").with_class("m/M2", m2.encode()),
        CompiledUnit::new("app.User").with_class("app/User", user.encode()),
    ]
}

pub fn store() -> UnitStore {
    let mut store = UnitStore::new();
    store.add_unit(widget_unit());
    let (base, derived) = base_units();
    store.add_unit(base);
    store.add_unit(derived);
    for unit in marker_units() {
        store.add_unit(unit);
    }
    store
}

pub fn options() -> BridgeOptions {
    BridgeOptions {
        marker_root: Some("m.Root".to_string()),
        ..BridgeOptions::default()
    }
}

pub fn builder(store: UnitStore) -> SessionBuilder {
    HostedSession::builder(Arc::new(store), Arc::new(catalog()))
        .options(options())
        .shared_type(object_type())
}

pub fn session() -> HostedSession {
    builder(store()).build().expect("session builds")
}
