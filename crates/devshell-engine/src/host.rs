//! The embedded host runtime seam
//!
//! The host runtime receives the bodies of native-bridged methods once their
//! unit is defined. It resolves the symbolic references inside those bodies
//! through the session's [`DispatchIdOracle`], which may load further types
//! while the host is being called.

use crate::dispatch::{DispatchHandle, DispatchIdOracle};
use crate::jsni::scan_references;
use crate::loader::runtime::TypeHandle;
use crate::unit::{CompiledUnit, NativeMethod};
use parking_lot::Mutex;

/// Callbacks from a hosted session into the host runtime
pub trait NativeHost: Send + Sync {
    /// Wire the native-bridged methods of a unit
    ///
    /// Called once per unit, after all of its requested types are defined.
    /// The oracle may be used freely, including for references that cause
    /// more types to load.
    fn create_native_methods(
        &self,
        unit: &CompiledUnit,
        methods: &[NativeMethod],
        oracle: &dyn DispatchIdOracle,
    );

    /// A bootstrap type was defined
    fn bootstrap_defined(&self, _runtime: &TypeHandle) {}

    /// The session is being reset; the host is released afterwards
    fn session_ended(&self) {}
}

/// A wired method and the handles its references resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiredMethod {
    /// Top-level type name of the unit
    pub unit: String,
    /// Reference naming the method
    pub name: String,
    /// Every reference in the body with its handle, in order of appearance
    pub handles: Vec<(String, DispatchHandle)>,
}

/// Host that resolves every reference in each method body
///
/// Malformed references are logged and skipped.
#[derive(Debug, Default)]
pub struct ResolvingHost {
    units: Mutex<Vec<String>>,
    wired: Mutex<Vec<WiredMethod>>,
    bootstrapped: Mutex<Vec<String>>,
}

impl ResolvingHost {
    /// Create a host with nothing wired
    pub fn new() -> Self {
        Self::default()
    }

    /// Methods wired so far, in wiring order
    pub fn wired(&self) -> Vec<WiredMethod> {
        self.wired.lock().clone()
    }

    /// Units wired so far, in wiring order, including units without
    /// native methods
    pub fn wired_units(&self) -> Vec<String> {
        self.units.lock().clone()
    }

    /// Bootstrap types reported so far
    pub fn bootstrapped(&self) -> Vec<String> {
        self.bootstrapped.lock().clone()
    }
}

impl NativeHost for ResolvingHost {
    fn create_native_methods(
        &self,
        unit: &CompiledUnit,
        methods: &[NativeMethod],
        oracle: &dyn DispatchIdOracle,
    ) {
        self.units.lock().push(unit.type_name().to_string());
        for method in methods {
            let mut handles = Vec::new();
            for reference in scan_references(&method.body) {
                match oracle.resolve_handle(&reference) {
                    Ok(handle) => handles.push((reference, handle)),
                    Err(err) => log::warn!(
                        "{} (line {} of {}); expect subsequent failures",
                        err,
                        method.line,
                        unit.type_name()
                    ),
                }
            }
            // Not locked across resolve_handle; resolution can re-enter wiring
            self.wired.lock().push(WiredMethod {
                unit: unit.type_name().to_string(),
                name: method.name.clone(),
                handles,
            });
        }
    }

    fn bootstrap_defined(&self, runtime: &TypeHandle) {
        self.bootstrapped
            .lock()
            .push(runtime.binary_name().to_string());
    }
}
