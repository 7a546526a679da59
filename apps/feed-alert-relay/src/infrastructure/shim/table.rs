//! Capability Tables
//!
//! Table-driven implementations of the client capability traits. A shim
//! for a concrete client library is just a `LibraryTable` assembled from
//! these pieces.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::signature::{BoundArgs, Signature};
use crate::application::ports::{
    CallArgs, CallError, ClientHandle, ClientLibrary, Constant, EntryType, ModuleHandle,
    PendingCall,
};

type Factory = Arc<dyn Fn(BoundArgs) -> Result<Box<dyn ClientHandle>, CallError> + Send + Sync>;
type Method = Arc<dyn Fn(BoundArgs) -> Result<PendingCall, CallError> + Send + Sync>;

// =============================================================================
// Entry Types
// =============================================================================

/// A constructible type with a declared constructor signature.
#[derive(Clone)]
pub struct EntryTable {
    name: String,
    signature: Signature,
    factory: Factory,
}

impl EntryTable {
    /// Create an entry type whose constructor runs `factory` after binding.
    pub fn new<F>(name: impl Into<String>, signature: Signature, factory: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<Box<dyn ClientHandle>, CallError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for EntryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryTable")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl EntryType for EntryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> Vec<String> {
        self.signature.parameter_names()
    }

    fn construct(&self, args: CallArgs) -> Result<Box<dyn ClientHandle>, CallError> {
        let bound = self.signature.bind(args)?;
        (self.factory)(bound)
    }
}

// =============================================================================
// Modules
// =============================================================================

/// A module exposing entry types, constants and other named members.
#[derive(Default)]
pub struct ModuleTable {
    path: String,
    entries: BTreeMap<String, Arc<dyn EntryType>>,
    constants: BTreeMap<String, Constant>,
    functions: BTreeMap<String, (Signature, Method)>,
    members: BTreeSet<String>,
}

impl ModuleTable {
    /// Empty module at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Expose an entry type under its own name.
    #[must_use]
    pub fn with_entry(mut self, entry: EntryTable) -> Self {
        self.entries.insert(entry.name.clone(), Arc::new(entry));
        self
    }

    /// Expose a constant.
    #[must_use]
    pub fn with_constant(mut self, name: impl Into<String>, value: Constant) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    /// Expose a module-level function.
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, signature: Signature, function: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<PendingCall, CallError> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), (signature, Arc::new(function)));
        self
    }

    /// Expose a member with no capability behind it.
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>) -> Self {
        self.members.insert(name.into());
        self
    }
}

impl ModuleHandle for ModuleTable {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn member_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.members.clone();
        names.extend(self.entries.keys().cloned());
        names.extend(self.constants.keys().cloned());
        names.extend(self.functions.keys().cloned());
        names.into_iter().collect()
    }

    fn entry_type(&self, name: &str) -> Option<Arc<dyn EntryType>> {
        self.entries.get(name).cloned()
    }

    fn constant(&self, name: &str) -> Option<Constant> {
        self.constants.get(name).cloned()
    }

    fn invoke(&self, function: &str, args: CallArgs) -> Result<PendingCall, CallError> {
        let Some((signature, call)) = self.functions.get(function) else {
            return Err(CallError::MissingMember(function.to_string()));
        };
        let bound = signature.bind(args)?;
        call(bound)
    }
}

// =============================================================================
// Libraries
// =============================================================================

/// A package with a root module and named submodules.
pub struct LibraryTable {
    package: String,
    root: Arc<ModuleTable>,
    submodules: BTreeMap<String, Arc<ModuleTable>>,
}

impl LibraryTable {
    /// Package `package` with the given root module.
    #[must_use]
    pub fn new(package: impl Into<String>, root: ModuleTable) -> Self {
        Self {
            package: package.into(),
            root: Arc::new(root),
            submodules: BTreeMap::new(),
        }
    }

    /// Add a submodule.
    #[must_use]
    pub fn with_submodule(mut self, name: impl Into<String>, module: ModuleTable) -> Self {
        self.submodules.insert(name.into(), Arc::new(module));
        self
    }
}

impl ClientLibrary for LibraryTable {
    fn package(&self) -> &str {
        &self.package
    }

    fn root(&self) -> Arc<dyn ModuleHandle> {
        self.root.clone()
    }

    fn submodule(&self, name: &str) -> Option<Arc<dyn ModuleHandle>> {
        self.submodules
            .get(name)
            .map(|module| Arc::clone(module) as Arc<dyn ModuleHandle>)
    }
}

// =============================================================================
// Handles
// =============================================================================

/// A live handle whose methods are declared signatures plus closures.
pub struct HandleTable {
    type_name: String,
    methods: BTreeMap<String, (Signature, Method)>,
    attributes: BTreeSet<String>,
}

impl HandleTable {
    /// Handle of type `type_name` with no members.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            methods: BTreeMap::new(),
            attributes: BTreeSet::new(),
        }
    }

    /// Declare a method.
    #[must_use]
    pub fn with_method<F>(mut self, name: impl Into<String>, signature: Signature, method: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<PendingCall, CallError> + Send + Sync + 'static,
    {
        self.methods
            .insert(name.into(), (signature, Arc::new(method)));
        self
    }

    /// Declare a non-callable attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }
}

impl ClientHandle for HandleTable {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn member_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.attributes.clone();
        names.extend(self.methods.keys().cloned());
        names.into_iter().collect()
    }

    fn has_member(&self, name: &str) -> bool {
        self.methods.contains_key(name) || self.attributes.contains(name)
    }

    fn invoke(&self, method: &str, args: CallArgs) -> Result<PendingCall, CallError> {
        let Some((signature, call)) = self.methods.get(method) else {
            return Err(CallError::MissingMember(method.to_string()));
        };
        let bound = signature.bind(args)?;
        call(bound)
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::infrastructure::shim::Parameter;

    fn handle() -> HandleTable {
        HandleTable::new("Feed")
            .with_method(
                "run",
                Signature::new(vec![Parameter::required("on_message")]),
                |_| Ok(futures::future::ready(Ok(())).boxed()),
            )
            .with_attribute("instruments")
    }

    #[test]
    fn module_members_include_entries_and_constants() {
        let module = ModuleTable::new("pkg.sub")
            .with_entry(EntryTable::new("Feed", Signature::empty(), |_| {
                Ok(Box::new(HandleTable::new("Feed")))
            }))
            .with_constant("NSE", Constant::Int(1))
            .with_member("helper");

        assert_eq!(module.member_names(), vec!["Feed", "NSE", "helper"]);
        assert!(module.entry_type("Feed").is_some());
        assert_eq!(module.constant("NSE"), Some(Constant::Int(1)));
    }

    #[test]
    fn module_functions_bind_like_methods() {
        let module = ModuleTable::new("pkg.sub").with_function(
            "market_feed_wss",
            Signature::new(vec![Parameter::required("callback")]),
            |_| Ok(futures::future::ready(Ok(())).boxed()),
        );

        assert_eq!(module.member_names(), vec!["market_feed_wss"]);
        assert!(matches!(
            module.invoke("market_feed_wss", CallArgs::new()),
            Err(CallError::SignatureMismatch(_))
        ));
        assert!(matches!(
            module.invoke("other", CallArgs::new()),
            Err(CallError::MissingMember(_))
        ));
        assert!(
            module
                .invoke("market_feed_wss", CallArgs::new().kwarg("callback", "x"))
                .is_ok()
        );
    }

    #[test]
    fn missing_method_is_reported() {
        let err = handle().invoke("stop", CallArgs::new()).err().unwrap();
        assert_eq!(err, CallError::MissingMember("stop".to_string()));
    }

    #[test]
    fn attribute_is_not_callable() {
        let h = handle();
        assert!(h.has_member("instruments"));
        assert!(matches!(
            h.invoke("instruments", CallArgs::new()),
            Err(CallError::MissingMember(_))
        ));
    }

    #[test]
    fn method_binding_is_checked() {
        assert!(matches!(
            handle().invoke("run", CallArgs::new()),
            Err(CallError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn entry_constructor_binds_before_factory() {
        let entry = EntryTable::new(
            "Feed",
            Signature::new(vec![Parameter::required("client_id")]),
            |_| Ok(Box::new(HandleTable::new("Feed"))),
        );
        assert!(entry.construct(CallArgs::new()).is_err());
        assert!(entry.construct(CallArgs::new().arg("100")).is_ok());
    }
}
