//! Capability Resolver
//!
//! Locates the streaming entry type inside a client package. The feed
//! submodule is searched before the root module, and each location has its
//! own list of candidate type names. Venue and subscription constants are
//! looked up on the host module first, then on the root.

use std::fmt;
use std::sync::Arc;

use crate::application::ports::{
    Constant, EntryType, InstrumentSpec, LibraryRegistry, ModuleHandle,
};

/// Literal used when the package exposes no venue constant.
pub const FALLBACK_VENUE: &str = "NSE";

/// Literal used when the package exposes no subscription constant.
pub const FALLBACK_SUBSCRIPTION: &str = "TICKER";

// =============================================================================
// Discovery Profile
// =============================================================================

/// Where to look and which names to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryProfile {
    /// Submodule conventionally hosting the market feed.
    pub feed_submodule: String,
    /// Entry type names tried on the submodule.
    pub submodule_entry_names: Vec<String>,
    /// Entry type names tried on the root module.
    pub root_entry_names: Vec<String>,
    /// Aliases for the venue segment constant.
    pub venue_aliases: Vec<String>,
    /// Aliases for the subscription kind constant.
    pub subscription_aliases: Vec<String>,
}

impl Default for DiscoveryProfile {
    fn default() -> Self {
        let names = |list: &[&str]| -> Vec<String> { list.iter().map(ToString::to_string).collect() };
        Self {
            feed_submodule: "marketfeed".to_string(),
            submodule_entry_names: names(&["DhanFeed", "MarketFeed", "DhanMarketFeed"]),
            root_entry_names: names(&["DhanFeed", "MarketFeed"]),
            venue_aliases: names(&["NSE"]),
            subscription_aliases: names(&["Ticker", "TICKER"]),
        }
    }
}

// =============================================================================
// Binding
// =============================================================================

/// A resolved entry type plus the constants found next to it.
#[derive(Clone)]
pub struct CapabilityBinding {
    /// Package the entry came from.
    pub package: String,
    /// Module hosting the entry type.
    pub host_module: String,
    /// The hosting module itself, for module-level helpers.
    pub module: Arc<dyn ModuleHandle>,
    /// The entry type.
    pub entry: Arc<dyn EntryType>,
    /// Venue segment constant, if exposed.
    pub venue: Option<Constant>,
    /// Subscription kind constant, if exposed.
    pub subscription: Option<Constant>,
}

impl CapabilityBinding {
    /// Instrument list for the given security ids.
    ///
    /// Missing constants fall back to the `NSE` and `TICKER` literals.
    #[must_use]
    pub fn instruments(&self, security_ids: &[String]) -> Vec<InstrumentSpec> {
        let segment = self
            .venue
            .clone()
            .unwrap_or_else(|| Constant::from(FALLBACK_VENUE));
        let subscription = self
            .subscription
            .clone()
            .unwrap_or_else(|| Constant::from(FALLBACK_SUBSCRIPTION));

        security_ids
            .iter()
            .map(|id| InstrumentSpec {
                segment: segment.clone(),
                security_id: id.clone(),
                subscription: subscription.clone(),
            })
            .collect()
    }

    /// Qualified name of the entry type.
    #[must_use]
    pub fn entry_path(&self) -> String {
        format!("{}.{}", self.host_module, self.entry.name())
    }
}

impl fmt::Debug for CapabilityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBinding")
            .field("package", &self.package)
            .field("entry", &self.entry_path())
            .field("venue", &self.venue)
            .field("subscription", &self.subscription)
            .finish()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A module inspected during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedLocation {
    /// Module path.
    pub path: String,
    /// Every member the module exposed.
    pub members: Vec<String>,
}

/// Discovery failed; the process cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The package is not available.
    #[error("client package '{package}' is not available (available: {available:?})")]
    PackageUnavailable {
        /// Requested package.
        package: String,
        /// Packages that are available.
        available: Vec<String>,
    },

    /// No candidate entry type exists anywhere in the package.
    #[error("no feed entry type found in package '{package}'")]
    NoEntryType {
        /// Package searched.
        package: String,
        /// Every location inspected, with its members.
        inspected: Vec<InspectedLocation>,
    },
}

impl DiscoveryError {
    /// Multi-line diagnostic listing what was inspected.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::PackageUnavailable { .. } => self.to_string(),
            Self::NoEntryType { inspected, .. } => {
                let mut out = self.to_string();
                for location in inspected {
                    out.push_str(&format!(
                        "\n  {}: [{}]",
                        location.path,
                        location.members.join(", ")
                    ));
                }
                out
            }
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Finds the feed entry type in a client package.
#[derive(Debug, Clone)]
pub struct CapabilityResolver {
    registry: LibraryRegistry,
    profile: DiscoveryProfile,
}

impl CapabilityResolver {
    /// Resolver over `registry` using the default profile.
    #[must_use]
    pub fn new(registry: LibraryRegistry) -> Self {
        Self::with_profile(registry, DiscoveryProfile::default())
    }

    /// Resolver with a custom profile.
    #[must_use]
    pub const fn with_profile(registry: LibraryRegistry, profile: DiscoveryProfile) -> Self {
        Self { registry, profile }
    }

    /// Resolve the entry type of `package`.
    ///
    /// # Errors
    ///
    /// `PackageUnavailable` if the package cannot be loaded, `NoEntryType`
    /// if no candidate name exists in any searched location.
    pub fn resolve(&self, package: &str) -> Result<CapabilityBinding, DiscoveryError> {
        let Some(library) = self.registry.load(package) else {
            return Err(DiscoveryError::PackageUnavailable {
                package: package.to_string(),
                available: self.registry.packages(),
            });
        };

        let root = library.root();
        let mut locations: Vec<(Arc<dyn ModuleHandle>, &[String])> = Vec::new();
        if let Some(sub) = library.submodule(&self.profile.feed_submodule) {
            locations.push((sub, self.profile.submodule_entry_names.as_slice()));
        }
        locations.push((Arc::clone(&root), self.profile.root_entry_names.as_slice()));

        let mut inspected = Vec::with_capacity(locations.len());
        for (module, names) in locations {
            let found = names.iter().find_map(|name| module.entry_type(name));
            if let Some(entry) = found {
                let binding = CapabilityBinding {
                    package: package.to_string(),
                    host_module: module.path(),
                    module: Arc::clone(&module),
                    venue: Self::lookup(&self.profile.venue_aliases, module.as_ref(), root.as_ref()),
                    subscription: Self::lookup(
                        &self.profile.subscription_aliases,
                        module.as_ref(),
                        root.as_ref(),
                    ),
                    entry,
                };
                tracing::info!(
                    entry = %binding.entry_path(),
                    venue = ?binding.venue,
                    subscription = ?binding.subscription,
                    "Resolved feed entry type"
                );
                return Ok(binding);
            }
            tracing::debug!(module = %module.path(), "No feed entry type in module");
            inspected.push(InspectedLocation {
                path: module.path(),
                members: module.member_names(),
            });
        }

        Err(DiscoveryError::NoEntryType {
            package: package.to_string(),
            inspected,
        })
    }

    fn lookup(
        aliases: &[String],
        host: &dyn ModuleHandle,
        root: &dyn ModuleHandle,
    ) -> Option<Constant> {
        [host, root]
            .into_iter()
            .find_map(|module| aliases.iter().find_map(|alias| module.constant(alias)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::shim::{EntryTable, HandleTable, LibraryTable, ModuleTable, Signature};

    fn entry(name: &str) -> EntryTable {
        EntryTable::new(name, Signature::empty(), |_| {
            Ok(Box::new(HandleTable::new("Feed")))
        })
    }

    fn resolver(library: LibraryTable) -> CapabilityResolver {
        CapabilityResolver::new(LibraryRegistry::new().with(Arc::new(library)))
    }

    #[test]
    fn submodule_wins_over_root() {
        let lib = LibraryTable::new("pkg", ModuleTable::new("pkg").with_entry(entry("DhanFeed")))
            .with_submodule(
                "marketfeed",
                ModuleTable::new("pkg.marketfeed").with_entry(entry("MarketFeed")),
            );
        let binding = resolver(lib).resolve("pkg").unwrap();
        assert_eq!(binding.entry_path(), "pkg.marketfeed.MarketFeed");
    }

    #[test]
    fn root_is_searched_when_submodule_lacks_entry() {
        let lib = LibraryTable::new("pkg", ModuleTable::new("pkg").with_entry(entry("MarketFeed")))
            .with_submodule("marketfeed", ModuleTable::new("pkg.marketfeed"));
        let binding = resolver(lib).resolve("pkg").unwrap();
        assert_eq!(binding.host_module, "pkg");
    }

    #[test]
    fn root_only_names_are_limited() {
        let lib = LibraryTable::new(
            "pkg",
            ModuleTable::new("pkg").with_entry(entry("DhanMarketFeed")),
        );
        assert!(matches!(
            resolver(lib).resolve("pkg"),
            Err(DiscoveryError::NoEntryType { .. })
        ));
    }

    #[test]
    fn constants_fall_back_to_root_then_literals() {
        let lib = LibraryTable::new(
            "pkg",
            ModuleTable::new("pkg").with_constant("TICKER", Constant::Int(15)),
        )
        .with_submodule(
            "marketfeed",
            ModuleTable::new("pkg.marketfeed").with_entry(entry("DhanFeed")),
        );
        let binding = resolver(lib).resolve("pkg").unwrap();
        assert_eq!(binding.venue, None);
        assert_eq!(binding.subscription, Some(Constant::Int(15)));

        let specs = binding.instruments(&["1333".to_string()]);
        assert_eq!(specs[0].segment, Constant::from("NSE"));
        assert_eq!(specs[0].subscription, Constant::Int(15));
    }

    #[test]
    fn missing_entry_lists_inspected_members() {
        let lib = LibraryTable::new("pkg", ModuleTable::new("pkg").with_member("client"))
            .with_submodule("marketfeed", ModuleTable::new("pkg.marketfeed").with_member("helper"));
        let err = resolver(lib).resolve("pkg").unwrap_err();

        let diagnostic = err.diagnostic();
        assert!(diagnostic.contains("pkg.marketfeed: [helper]"));
        assert!(diagnostic.contains("pkg: [client]"));
    }

    #[test]
    fn unknown_package_is_unavailable() {
        let err = CapabilityResolver::new(LibraryRegistry::new())
            .resolve("dhanhq")
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::PackageUnavailable { .. }));
    }
}
