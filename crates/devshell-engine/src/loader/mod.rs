//! Hosted sessions
//!
//! A [`HostedSession`] loads compiled types on demand for one development
//! session. For each requested name it:
//!
//! 1. returns a shared infrastructure type, or a type already defined
//! 2. fetches the image: bootstrap resource, synthesized marker interface,
//!    or the registry (companions `X$` use the image of `X`)
//! 3. rewrites the image for the marker hierarchy unless the unit comes
//!    from an overlay source tree
//! 4. defines the type, loading its supertypes first
//! 5. queues the owning unit for native-method wiring; the outermost load
//!    drains the queue once everything it needed is defined
//!
//! The session is also the [`DispatchIdOracle`] handed to the native host,
//! and owns the two identity caches.
//!
//! All session state sits behind one reentrant monitor: the recursive
//! supertype loads and the wiring callbacks re-enter it on the same thread,
//! other threads wait. `RefCell` borrows are kept short and are never held
//! across a recursive load or a host callback.

pub mod bootstrap;
pub mod injection;
pub mod runtime;

pub use bootstrap::{resource_path, DirectoryResources, ResourceLocator, StaticResources};
pub use injection::{InjectionQueue, InjectionState};
pub use runtime::{RuntimeType, TypeHandle, TypeOrigin};

use crate::dispatch::{
    make_handle, null_handle, type_id_of, DispatchHandle, DispatchIdOracle, DispatchTables,
    TypeDescriptor, NULL_TYPE_ID, UNRESOLVED,
};
use crate::error::{BridgeError, BridgeResult};
use crate::host::NativeHost;
use crate::identity::SessionIdentityCache;
use crate::jsni::{canonical_reference, JsniRef, MalformedReference};
use crate::options::BridgeOptions;
use crate::rewrite::{MarkerRewriter, RewriteCache};
use crate::types::TypeOracle;
use crate::unit::{CompiledUnit, UnitRegistry};
use devshell_bytecode::descriptor::{binary_to_internal, internal_to_binary};
use devshell_bytecode::TypeImage;
use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Names of anonymous and synthetic classes, including named classes nested
/// inside them
static GENERATED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+\$\d+(\$.*)?$").expect("generated-name pattern is valid"));

/// Whether a binary name belongs to a compiler-generated class
pub fn is_generated_name(binary_name: &str) -> bool {
    GENERATED_NAME.is_match(binary_name)
}

/// Mutable session state, guarded by the session monitor
#[derive(Default)]
struct SessionState {
    /// Types defined so far, by binary name
    defined: FxHashMap<String, TypeHandle>,
    /// Types whose supertypes are being loaded
    defining: FxHashSet<String>,
    injection: InjectionState,
    queue: InjectionQueue,
    dispatch: DispatchTables,
    host: Option<Arc<dyn NativeHost>>,
}

/// An image ready to be defined
struct FetchedImage {
    bytes: Arc<[u8]>,
    origin: TypeOrigin,
    unit: Option<Arc<CompiledUnit>>,
}

/// Builder for [`HostedSession`]
pub struct SessionBuilder {
    registry: Arc<dyn UnitRegistry>,
    types: Arc<dyn TypeOracle>,
    options: BridgeOptions,
    host: Option<Arc<dyn NativeHost>>,
    resources: Option<Box<dyn ResourceLocator>>,
    shared: Vec<TypeHandle>,
    rewrite_cache: Option<Arc<RewriteCache>>,
}

impl SessionBuilder {
    /// Use the given options
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach the native host
    pub fn host(mut self, host: Arc<dyn NativeHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Read bootstrap images from the given locator
    pub fn resources(mut self, resources: impl ResourceLocator + 'static) -> Self {
        self.resources = Some(Box::new(resources));
        self
    }

    /// Add a shared infrastructure type
    pub fn shared_type(mut self, runtime: TypeHandle) -> Self {
        self.shared.push(runtime);
        self
    }

    /// Memoize rewrites in a cache, possibly shared with other sessions
    pub fn rewrite_cache(mut self, cache: Arc<RewriteCache>) -> Self {
        self.rewrite_cache = Some(cache);
        self
    }

    /// Validate the options, read bootstrap images and build the session
    pub fn build(self) -> BridgeResult<HostedSession> {
        self.options.validate()?;

        let bootstrap = bootstrap::read_bootstrap_images(
            &self.options.bootstrap_types,
            self.resources.as_deref(),
        )?;

        let rewriter = if !self.options.rewrite {
            None
        } else if let Some(marker_root) = &self.options.marker_root {
            let rewriter = MarkerRewriter::from_metadata(
                self.types.clone(),
                marker_root,
                &self.options.universal_root,
            );
            if rewriter.is_none() {
                log::debug!("Marker root {} not in type metadata; no rewriting", marker_root);
            }
            rewriter
        } else {
            None
        };

        let shared = self
            .shared
            .into_iter()
            .map(|t| (t.binary_name().to_string(), t))
            .collect();

        Ok(HostedSession {
            state: ReentrantMutex::new(RefCell::new(SessionState {
                host: self.host,
                ..SessionState::default()
            })),
            registry: self.registry,
            types: self.types,
            rewriter,
            rewrite_cache: self.rewrite_cache,
            options: self.options,
            bootstrap,
            shared,
            identity: SessionIdentityCache::new(),
        })
    }
}

/// On-demand loader and dispatch oracle for one hosted session
pub struct HostedSession {
    state: ReentrantMutex<RefCell<SessionState>>,
    registry: Arc<dyn UnitRegistry>,
    types: Arc<dyn TypeOracle>,
    rewriter: Option<MarkerRewriter>,
    rewrite_cache: Option<Arc<RewriteCache>>,
    options: BridgeOptions,
    /// Bootstrap images by binary name, read at construction
    bootstrap: FxHashMap<String, Arc<[u8]>>,
    /// Shared infrastructure types by binary name
    shared: FxHashMap<String, TypeHandle>,
    identity: SessionIdentityCache,
}

impl HostedSession {
    /// Start building a session over a unit registry and type metadata
    pub fn builder(registry: Arc<dyn UnitRegistry>, types: Arc<dyn TypeOracle>) -> SessionBuilder {
        SessionBuilder {
            registry,
            types,
            options: BridgeOptions::default(),
            host: None,
            resources: None,
            shared: Vec::new(),
            rewrite_cache: None,
        }
    }

    /// Session options
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// The marker rewriter, if the marker hierarchy is known
    pub fn rewriter(&self) -> Option<&MarkerRewriter> {
        self.rewriter.as_ref()
    }

    /// The identity caches
    pub fn identity_cache(&self) -> &SessionIdentityCache {
        &self.identity
    }

    /// Attach a native host, replacing any previous one
    pub fn attach_host(&self, host: Arc<dyn NativeHost>) {
        let guard = self.state.lock();
        guard.borrow_mut().host = Some(host);
    }

    /// Whether a type is defined in this session
    pub fn is_defined(&self, binary_name: &str) -> bool {
        let guard = self.state.lock();
        let defined = guard.borrow().defined.contains_key(binary_name);
        defined
    }

    /// Number of types defined in this session
    pub fn defined_count(&self) -> usize {
        let guard = self.state.lock();
        let count = guard.borrow().defined.len();
        count
    }

    /// Current injection state
    pub fn injection_state(&self) -> InjectionState {
        let guard = self.state.lock();
        let state = guard.borrow().injection;
        state
    }

    /// Number of queue entries waiting for the next outermost load
    pub fn pending_injections(&self) -> usize {
        let guard = self.state.lock();
        let pending = guard.borrow().queue.len();
        pending
    }

    /// Load a type by binary name
    ///
    /// # Arguments
    /// * `name` - Binary name (`a.b.Outer$Inner`)
    ///
    /// # Returns
    /// The defined type. When this call is the outermost load, every unit
    /// queued meanwhile has been wired before it returns, whether or not the
    /// requested type itself could be defined.
    pub fn load_type(&self, name: &str) -> BridgeResult<TypeHandle> {
        if let Some(shared) = self.shared.get(name) {
            return Ok(shared.clone());
        }

        let guard = self.state.lock();
        let state: &RefCell<SessionState> = &guard;

        let existing = state.borrow().defined.get(name).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let fetched = self.fetch_image(name)?;

        let owns_drain = {
            let mut s = state.borrow_mut();
            if s.injection == InjectionState::Idle {
                s.injection = InjectionState::Injecting;
                true
            } else {
                false
            }
        };

        let result = self.define(state, name, fetched);

        // Supertypes defined before a failure stay defined and get wired
        if owns_drain {
            self.drain(state);
            state.borrow_mut().injection = InjectionState::Idle;
        }

        result
    }

    /// Find the image for a name, rewriting it if needed
    fn fetch_image(&self, name: &str) -> BridgeResult<FetchedImage> {
        if let Some(bytes) = self.bootstrap.get(name) {
            // Never rewritten
            return Ok(FetchedImage {
                bytes: bytes.clone(),
                origin: TypeOrigin::Bootstrap,
                unit: None,
            });
        }

        if let Some(rewriter) = &self.rewriter {
            if let Some(bytes) = rewriter.write_marker_interface(name) {
                log::trace!("Synthesized marker interface {}", name);
                return Ok(FetchedImage {
                    bytes: bytes.into(),
                    origin: TypeOrigin::Synthesized,
                    unit: None,
                });
            }
        }

        let lookup = self.canonicalize(name);
        let compiled = self.registry.compiled_class(&lookup);
        let unit = match &compiled {
            Some(class) => self.registry.unit(&class.unit_name),
            None => self.unit_for_name(name),
        };

        if let Some(unit) = &unit {
            if !unit.is_usable() {
                log::error!(
                    "Unit '{}' has errors; cannot load '{}'; expect subsequent failures",
                    unit.type_name(),
                    name
                );
                return Err(BridgeError::UnitInError {
                    unit: unit.type_name().to_string(),
                    name: name.to_string(),
                });
            }
        }

        let bytes: Arc<[u8]> = match compiled {
            Some(class) => class.bytes,
            None if unit.is_some() && is_generated_name(name) => {
                log::debug!("Loading generated class {} not listed by the registry", name);
                match self.registry.synthetic_class(&lookup) {
                    Some(bytes) => bytes.into(),
                    None => return Err(self.not_found(name)),
                }
            }
            None => return Err(self.not_found(name)),
        };

        let overlay = unit.as_ref().is_some_and(|u| u.is_overlay());
        let rewriter = match &self.rewriter {
            Some(rewriter) if !overlay => rewriter,
            Some(_) => {
                log::trace!("No rewrite for {}: overlay source", name);
                return Ok(FetchedImage {
                    bytes,
                    origin: TypeOrigin::Compiled,
                    unit,
                });
            }
            None => {
                return Ok(FetchedImage {
                    bytes,
                    origin: TypeOrigin::Compiled,
                    unit,
                })
            }
        };

        let renames = unit
            .as_ref()
            .map(|u| u.anonymous_renames().clone())
            .unwrap_or_default();
        let output = self.rewrite(rewriter, name, &bytes, &renames)?;
        let origin = if *output == *bytes {
            TypeOrigin::Compiled
        } else {
            if let Some(dir) = &self.options.dump_dir {
                dump_image(dir, name, &output);
            }
            TypeOrigin::Rewritten
        };
        Ok(FetchedImage {
            bytes: output,
            origin,
            unit,
        })
    }

    fn rewrite(
        &self,
        rewriter: &MarkerRewriter,
        name: &str,
        bytes: &[u8],
        renames: &BTreeMap<String, String>,
    ) -> BridgeResult<Arc<[u8]>> {
        let output = match &self.rewrite_cache {
            Some(cache) => cache.get_or_rewrite(rewriter, name, bytes, renames),
            None => rewriter.rewrite(name, bytes, renames).map(Arc::from),
        };
        output.map_err(|err| {
            log::error!("Unable to rewrite {}: {}", name, err);
            err.into()
        })
    }

    fn not_found(&self, name: &str) -> BridgeError {
        log::debug!("No image for {}", name);
        BridgeError::TypeNotFound {
            name: name.to_string(),
        }
    }

    /// Internal name to fetch from the registry; a companion `X$` uses `X`
    fn canonicalize(&self, name: &str) -> String {
        let mut lookup = binary_to_internal(name);
        if self
            .rewriter
            .as_ref()
            .is_some_and(|rewriter| rewriter.is_marker_impl(name))
        {
            lookup.pop();
        }
        lookup
    }

    /// Find the owning unit by stripping `$` segments from the right
    fn unit_for_name(&self, name: &str) -> Option<Arc<CompiledUnit>> {
        let mut candidate = name;
        loop {
            if let Some(unit) = self.registry.unit(candidate) {
                return Some(unit);
            }
            candidate = &candidate[..candidate.rfind('$')?];
        }
    }

    /// Decode and define a fetched image, supertypes first
    fn define(
        &self,
        state: &RefCell<SessionState>,
        name: &str,
        fetched: FetchedImage,
    ) -> BridgeResult<TypeHandle> {
        let image = TypeImage::decode(&fetched.bytes).map_err(|source| BridgeError::Decode {
            name: name.to_string(),
            source,
        })?;

        if !state.borrow_mut().defining.insert(name.to_string()) {
            log::error!("Class circularity while defining {}", name);
            return Err(BridgeError::ClassCircularity {
                name: name.to_string(),
            });
        }
        let supertypes = self.load_supertypes(&image);
        state.borrow_mut().defining.remove(name);
        let (superclass, interfaces) = supertypes?;

        let runtime = RuntimeType::new(image, fetched.origin, superclass, interfaces);
        let host = {
            let mut s = state.borrow_mut();
            s.defined.insert(name.to_string(), runtime.clone());

            // Marker interfaces carry no bodies; their companion is wired instead
            let is_marker_interface = self
                .rewriter
                .as_ref()
                .is_some_and(|rewriter| rewriter.is_marker_interface(name));
            if let Some(unit) = fetched.unit.filter(|_| !is_marker_interface) {
                s.queue.push(unit);
            }
            s.host.clone()
        };
        log::trace!("Defined {} ({:?})", name, fetched.origin);

        if fetched.origin == TypeOrigin::Bootstrap {
            if let Some(host) = host {
                host.bootstrap_defined(&runtime);
            }
        }

        Ok(runtime)
    }

    fn load_supertypes(
        &self,
        image: &TypeImage,
    ) -> BridgeResult<(Option<TypeHandle>, Vec<TypeHandle>)> {
        let superclass = match &image.super_name {
            Some(super_name) => Some(self.load_type(&internal_to_binary(super_name))?),
            None => None,
        };
        let interfaces = image
            .interfaces
            .iter()
            .map(|iface| self.load_type(&internal_to_binary(iface)))
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok((superclass, interfaces))
    }

    /// Wire every queued unit, including units queued while wiring
    fn drain(&self, state: &RefCell<SessionState>) {
        loop {
            let (unit, host) = {
                let mut s = state.borrow_mut();
                match s.queue.next_pending() {
                    Some(unit) => (unit, s.host.clone()),
                    None => break,
                }
            };

            match host {
                Some(host) => {
                    log::debug!(
                        "Wiring {} native methods of {}",
                        unit.native_methods().len(),
                        unit.type_name()
                    );
                    host.create_native_methods(&unit, unit.native_methods(), self);
                }
                None => log::debug!("No native host; {} left unwired", unit.type_name()),
            }
        }
    }

    /// Descriptor for a type name in any spelling, creating it on first use
    fn descriptor_for_name(&self, class_name: &str) -> Option<Arc<TypeDescriptor>> {
        let guard = self.state.lock();
        let state: &RefCell<SessionState> = &guard;

        let cached = state.borrow().dispatch.lookup(class_name);
        if cached.is_some() {
            return cached;
        }

        // The metadata knows the exact binary name for a source spelling
        let canonical = match self.types.find_type(&class_name.replace('$', ".")) {
            Some(info) => info.binary_name.clone(),
            None => class_name.to_string(),
        };
        let mut target = canonical.clone();
        if self
            .rewriter
            .as_ref()
            .is_some_and(|rewriter| rewriter.is_marker_interface(&canonical))
        {
            target.push('$');
        }

        let existing = state.borrow().dispatch.lookup(&target);
        if let Some(existing) = existing {
            let mut s = state.borrow_mut();
            s.dispatch.alias(class_name, &existing);
            s.dispatch.alias(&canonical, &existing);
            return Some(existing);
        }

        let runtime = match self.load_type(&target) {
            Ok(runtime) => runtime,
            Err(err) => {
                log::debug!("Could not load {}: {}", target, err);
                return None;
            }
        };

        let mut s = state.borrow_mut();
        // Wiring during the load may have resolved the same type
        let descriptor = match s.dispatch.lookup(&target) {
            Some(existing) => existing,
            None => match s.dispatch.create(runtime) {
                Some(created) => created,
                None => {
                    log::warn!(
                        "Type table is full; '{}' gets no type id; expect subsequent failures",
                        target
                    );
                    return None;
                }
            },
        };
        s.dispatch.alias(class_name, &descriptor);
        s.dispatch.alias(&canonical, &descriptor);
        Some(descriptor)
    }

    /// Release the native host and forget every cache entry and descriptor
    ///
    /// Types already defined stay defined.
    pub fn reset(&self) {
        let guard = self.state.lock();
        let host = guard.borrow_mut().host.take();
        if let Some(host) = host {
            host.session_ended();
        }
        self.identity.clear();
        guard.borrow_mut().dispatch.clear();
        log::debug!("Session reset");
    }
}

impl DispatchIdOracle for HostedSession {
    fn resolve_handle(&self, reference: &str) -> Result<DispatchHandle, MalformedReference> {
        let reference = canonical_reference(reference, &self.options.universal_root);
        let parsed = JsniRef::parse(&reference).map_err(|err| {
            log::warn!("{}; expect subsequent failures", err);
            err
        })?;

        if parsed.is_null_target() {
            return Ok(null_handle());
        }

        let Some(descriptor) = self.descriptor_for_name(parsed.class_name()) else {
            log::warn!(
                "Type '{}' in reference '{}' could not be found; expect subsequent failures",
                parsed.class_name(),
                reference
            );
            return Ok(UNRESOLVED);
        };

        let signature = parsed.member_signature();
        let member_id = descriptor.member_id(&signature);
        if member_id < 0 {
            log::warn!(
                "Member '{}' in reference '{}' could not be found; expect subsequent failures",
                signature,
                reference
            );
        }
        Ok(make_handle(descriptor.type_id(), member_id))
    }

    fn descriptor_for(&self, handle: DispatchHandle) -> Option<Arc<TypeDescriptor>> {
        let type_id = type_id_of(handle);
        if type_id == NULL_TYPE_ID {
            return None;
        }
        let guard = self.state.lock();
        let descriptor = guard.borrow().dispatch.get(type_id as usize);
        descriptor
    }

    fn clear(&self) {
        let guard = self.state.lock();
        guard.borrow_mut().dispatch.clear();
    }
}

impl std::fmt::Debug for HostedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedSession")
            .field("options", &self.options)
            .field("bootstrap", &self.bootstrap.len())
            .field("shared", &self.shared.len())
            .field("rewriter", &self.rewriter.is_some())
            .finish()
    }
}

/// Write a rewritten image below the dump directory; failures are logged
fn dump_image(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(resource_path(name));
    let result = match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
    .and_then(|_| std::fs::write(&path, bytes));

    match result {
        Ok(()) => log::trace!("Dumped {} to {}", name, path.display()),
        Err(err) => log::warn!("Unable to dump {} to {}: {}", name, path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeCatalog, TypeInfo};
    use crate::unit::UnitStore;

    fn session(store: UnitStore) -> HostedSession {
        let mut catalog = TypeCatalog::new();
        catalog.add_type(TypeInfo::class("java.lang.Object", None));
        HostedSession::builder(Arc::new(store), Arc::new(catalog))
            .shared_type(RuntimeType::shared(TypeImage::new("java/lang/Object", None), None))
            .build()
            .unwrap()
    }

    #[test]
    fn test_generated_names() {
        assert!(is_generated_name("a.B$1"));
        assert!(is_generated_name("a.B$1$Inner"));
        assert!(is_generated_name("a.B$Inner$12"));
        assert!(!is_generated_name("a.B$Inner"));
        assert!(!is_generated_name("a.B"));
        assert!(!is_generated_name("$1"));
    }

    #[test]
    fn test_defines_each_type_once() {
        let mut store = UnitStore::new();
        store.add_unit(CompiledUnit::new("a.A").with_class(
            "a/A",
            TypeImage::new("a/A", Some("java/lang/Object")).encode(),
        ));
        let session = session(store);

        let first = session.load_type("a.A").unwrap();
        let second = session.load_type("a.A").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.superclass().unwrap().binary_name(), "java.lang.Object");
        assert_eq!(session.defined_count(), 1);
        assert_eq!(session.injection_state(), InjectionState::Idle);
    }

    #[test]
    fn test_missing_type() {
        let session = session(UnitStore::new());
        assert!(matches!(
            session.load_type("a.Missing"),
            Err(BridgeError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn test_unit_lookup_strips_nesting() {
        let mut store = UnitStore::new();
        store.add_unit(CompiledUnit::new("a.Outer"));
        let session = session(store);
        assert_eq!(
            session.unit_for_name("a.Outer$Inner$Deep").unwrap().type_name(),
            "a.Outer"
        );
        assert!(session.unit_for_name("a.Other$Inner").is_none());
    }

    #[test]
    fn test_circular_supertypes() {
        let mut store = UnitStore::new();
        store.add_unit(
            CompiledUnit::new("a.A").with_class("a/A", TypeImage::new("a/A", Some("a/B")).encode()),
        );
        store.add_unit(
            CompiledUnit::new("a.B").with_class("a/B", TypeImage::new("a/B", Some("a/A")).encode()),
        );
        let session = session(store);
        assert!(matches!(
            session.load_type("a.A"),
            Err(BridgeError::ClassCircularity { .. })
        ));
        assert_eq!(session.injection_state(), InjectionState::Idle);
        assert!(!session.is_defined("a.A"));
    }
}
