//! Invocation Prober
//!
//! Finds a method on a live handle that starts the stream and hands it the
//! message callback. Well-known run methods are tried first. If none binds,
//! the host module's `market_feed_wss` helper is tried, and after that every
//! member whose name looks stream-related.

use std::fmt;

use futures::FutureExt;

use crate::application::ports::{
    ArgValue, CallArgs, CallError, ClientHandle, EventCallback, ModuleHandle, PendingCall,
};
use crate::domain::connection::CLOSE_METHODS;

/// Run methods tried in order.
pub const RUN_METHODS: [&str; 7] = [
    "run_forever",
    "run",
    "start",
    "listen",
    "listen_forever",
    "serve",
    "connect_and_listen",
];

/// Keyword names tried for the callback.
pub const CALLBACK_KEYWORDS: [&str; 4] = ["on_message", "callback", "handler", "cb"];

/// Name fragments that make a member worth trying in the fallback scan.
pub const SCAN_TOKENS: [&str; 7] = ["listen", "run", "start", "connect", "market", "ws", "subscribe"];

/// Module-level stream helper.
pub const MODULE_HELPER: &str = "market_feed_wss";

/// Callback conventions for the module helper, after its leading arguments.
const HELPER_CONVENTIONS: [CallingConvention; 2] = [
    CallingConvention::Positional,
    CallingConvention::Keyword("callback"),
];

/// How the callback was passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// As the first positional argument.
    Positional,
    /// Under the given keyword.
    Keyword(&'static str),
    /// Not at all.
    Bare,
}

impl CallingConvention {
    fn all() -> impl Iterator<Item = Self> {
        std::iter::once(Self::Positional)
            .chain(CALLBACK_KEYWORDS.into_iter().map(Self::Keyword))
            .chain(std::iter::once(Self::Bare))
    }

    fn apply(self, leading: CallArgs, callback: &EventCallback) -> CallArgs {
        let value = ArgValue::Callback(callback.clone());
        match self {
            Self::Positional => leading.arg(value),
            Self::Keyword(name) => leading.kwarg(name, value),
            Self::Bare => leading,
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => f.write_str("positional"),
            Self::Keyword(name) => write!(f, "{name}="),
            Self::Bare => f.write_str("bare"),
        }
    }
}

/// A run call that bound and is in progress.
pub struct Invocation {
    /// Method invoked.
    pub method: String,
    /// How the callback was passed.
    pub convention: CallingConvention,
    /// The running call.
    pub call: PendingCall,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("method", &self.method)
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

/// Probe failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// Nothing on the handle accepted a run call.
    #[error("no runnable entry point on {type_name}")]
    NoRunnableEntryPoint {
        /// Handle type.
        type_name: String,
        /// Every member the handle exposed.
        members: Vec<String>,
    },
}

/// A module whose stream helper takes the place of a run method.
pub struct ModuleFallback<'a> {
    /// Module that may expose the helper.
    pub module: &'a dyn ModuleHandle,
    /// Arguments passed ahead of the callback.
    pub leading: CallArgs,
}

impl fmt::Debug for ModuleFallback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleFallback")
            .field("module", &self.module.path())
            .field("leading", &self.leading)
            .finish()
    }
}

/// Starts the stream on a live handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationProber;

impl InvocationProber {
    /// Create a prober.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Invoke the first method that accepts a run call.
    ///
    /// A call that fails immediately for a reason other than its shape
    /// still counts as invoked; its error comes back from the pending call.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::NoRunnableEntryPoint` if no method binds.
    pub fn probe(
        &self,
        handle: &dyn ClientHandle,
        callback: &EventCallback,
    ) -> Result<Invocation, ProbeError> {
        self.probe_with_module(handle, None, callback)
    }

    /// Like [`probe`](Self::probe), trying the module helper between the
    /// well-known run methods and the member scan.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::NoRunnableEntryPoint` if neither a method nor
    /// the helper binds.
    pub fn probe_with_module(
        &self,
        handle: &dyn ClientHandle,
        fallback: Option<&ModuleFallback<'_>>,
        callback: &EventCallback,
    ) -> Result<Invocation, ProbeError> {
        for method in RUN_METHODS {
            if handle.has_member(method)
                && let Some(invocation) = Self::try_method(handle, method, callback)
            {
                return Ok(invocation);
            }
        }

        if let Some(fallback) = fallback
            && let Some(invocation) = Self::try_helper(fallback, callback)
        {
            return Ok(invocation);
        }

        let members = handle.member_names();
        let candidates = members.iter().filter(|name| {
            let lower = name.to_lowercase();
            !RUN_METHODS.contains(&name.as_str())
                && !CLOSE_METHODS.contains(&name.as_str())
                && SCAN_TOKENS.iter().any(|token| lower.contains(token))
        });
        for method in candidates {
            tracing::debug!(method = %method, "Trying stream-like member");
            if let Some(invocation) = Self::try_method(handle, method, callback) {
                return Ok(invocation);
            }
        }

        Err(ProbeError::NoRunnableEntryPoint {
            type_name: handle.type_name().to_string(),
            members,
        })
    }

    fn try_method(
        handle: &dyn ClientHandle,
        method: &str,
        callback: &EventCallback,
    ) -> Option<Invocation> {
        Self::try_conventions(
            method,
            CallingConvention::all(),
            CallArgs::new,
            callback,
            |args| handle.invoke(method, args),
        )
    }

    fn try_helper(fallback: &ModuleFallback<'_>, callback: &EventCallback) -> Option<Invocation> {
        if !fallback
            .module
            .member_names()
            .iter()
            .any(|name| name == MODULE_HELPER)
        {
            return None;
        }
        let target = format!("{}.{MODULE_HELPER}", fallback.module.path());
        tracing::info!(helper = %target, "Trying module stream helper");
        Self::try_conventions(
            &target,
            HELPER_CONVENTIONS,
            || fallback.leading.clone(),
            callback,
            |args| fallback.module.invoke(MODULE_HELPER, args),
        )
    }

    fn try_conventions(
        target: &str,
        conventions: impl IntoIterator<Item = CallingConvention>,
        leading: impl Fn() -> CallArgs,
        callback: &EventCallback,
        invoke: impl Fn(CallArgs) -> Result<PendingCall, CallError>,
    ) -> Option<Invocation> {
        for convention in conventions {
            match invoke(convention.apply(leading(), callback)) {
                Ok(call) => {
                    tracing::info!(method = target, %convention, "Invoked run method");
                    return Some(Invocation {
                        method: target.to_string(),
                        convention,
                        call,
                    });
                }
                Err(e) if e.is_mismatch() => {
                    tracing::debug!(method = target, %convention, error = %e, "Run call did not bind");
                }
                Err(e) => {
                    tracing::warn!(method = target, %convention, error = %e, "Run method failed on entry");
                    return Some(Invocation {
                        method: target.to_string(),
                        convention,
                        call: futures::future::ready(Err::<(), CallError>(e)).boxed(),
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::InboundEvent;
    use crate::infrastructure::shim::{HandleTable, ModuleTable, Parameter, Signature};

    fn callback() -> EventCallback {
        Arc::new(|_: InboundEvent| {})
    }

    fn ok_call() -> Result<PendingCall, CallError> {
        Ok(futures::future::ready(Ok(())).boxed())
    }

    fn one(name: &str) -> Signature {
        Signature::new(vec![Parameter::required(name)])
    }

    fn helper_module(signature: Signature, seen: Arc<Mutex<Vec<String>>>) -> ModuleTable {
        ModuleTable::new("pkg.marketfeed").with_function(MODULE_HELPER, signature, move |args| {
            seen.lock().push(args.text("client").unwrap_or_default().to_string());
            ok_call()
        })
    }

    fn helper_signature(extra: &[Parameter]) -> Signature {
        let mut params = vec![
            Parameter::required("client"),
            Parameter::required("token"),
            Parameter::required("instruments"),
        ];
        params.extend_from_slice(extra);
        Signature::new(params)
    }

    fn leading() -> CallArgs {
        CallArgs::new()
            .arg("1000")
            .arg("secret")
            .arg(ArgValue::Instruments(Vec::new()))
    }

    #[test]
    fn run_forever_is_preferred() {
        let handle = HandleTable::new("Feed")
            .with_method("run", one("cb"), |_| ok_call())
            .with_method("run_forever", one("on_message"), |_| ok_call());
        let invocation = InvocationProber::new().probe(&handle, &callback()).unwrap();

        assert_eq!(invocation.method, "run_forever");
        assert_eq!(invocation.convention, CallingConvention::Positional);
    }

    #[test]
    fn keyword_callback_is_found() {
        let handle = HandleTable::new("Feed").with_method(
            "start",
            Signature::new(vec![
                Parameter::optional("interval"),
                Parameter::required("handler"),
            ]),
            |_| ok_call(),
        );
        let invocation = InvocationProber::new().probe(&handle, &callback()).unwrap();
        assert_eq!(invocation.convention, CallingConvention::Keyword("handler"));
    }

    #[test]
    fn zero_argument_call_is_last() {
        let handle = HandleTable::new("Feed").with_method("listen", Signature::empty(), |_| ok_call());
        let invocation = InvocationProber::new().probe(&handle, &callback()).unwrap();
        assert_eq!(invocation.convention, CallingConvention::Bare);
    }

    #[test]
    fn scan_finds_stream_like_member() {
        let handle = HandleTable::new("Feed")
            .with_method("disconnect", Signature::empty(), |_| ok_call())
            .with_method("open_market_ws", one("cb"), |_| ok_call());
        let invocation = InvocationProber::new().probe(&handle, &callback()).unwrap();
        assert_eq!(invocation.method, "open_market_ws");
    }

    #[test]
    fn close_methods_are_never_invoked() {
        let handle = HandleTable::new("Feed")
            .with_method("disconnect", Signature::empty(), |_| ok_call())
            .with_attribute("client_id");
        let err = InvocationProber::new().probe(&handle, &callback()).unwrap_err();

        let ProbeError::NoRunnableEntryPoint { type_name, members } = err;
        assert_eq!(type_name, "Feed");
        assert_eq!(members, vec!["client_id", "disconnect"]);
    }

    #[tokio::test]
    async fn immediate_failure_counts_as_invoked() {
        let handle = HandleTable::new("Feed").with_method("run", one("cb"), |_| {
            Err(CallError::Failed("socket refused".into()))
        });
        let invocation = InvocationProber::new().probe(&handle, &callback()).unwrap();

        assert_eq!(invocation.method, "run");
        assert_eq!(
            invocation.call.await,
            Err(CallError::Failed("socket refused".into()))
        );
    }

    #[test]
    fn module_helper_runs_when_no_run_method_binds() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let module = helper_module(
            helper_signature(&[Parameter::required("callback")]),
            Arc::clone(&seen),
        );
        let fallback = ModuleFallback {
            module: &module,
            leading: leading(),
        };
        let handle = HandleTable::new("Feed").with_attribute("client_id");

        let invocation = InvocationProber::new()
            .probe_with_module(&handle, Some(&fallback), &callback())
            .unwrap();

        assert_eq!(invocation.method, "pkg.marketfeed.market_feed_wss");
        assert_eq!(invocation.convention, CallingConvention::Positional);
        assert_eq!(*seen.lock(), vec!["1000"]);
    }

    #[test]
    fn module_helper_retries_with_callback_keyword() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let module = helper_module(
            helper_signature(&[Parameter::optional("version"), Parameter::required("callback")]),
            seen,
        );
        let fallback = ModuleFallback {
            module: &module,
            leading: leading(),
        };
        let handle = HandleTable::new("Feed");

        let invocation = InvocationProber::new()
            .probe_with_module(&handle, Some(&fallback), &callback())
            .unwrap();
        assert_eq!(invocation.convention, CallingConvention::Keyword("callback"));
    }

    #[test]
    fn run_method_is_preferred_over_module_helper() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let module = helper_module(
            helper_signature(&[Parameter::required("callback")]),
            Arc::clone(&seen),
        );
        let fallback = ModuleFallback {
            module: &module,
            leading: leading(),
        };
        let handle = HandleTable::new("Feed").with_method("run", one("cb"), |_| ok_call());

        let invocation = InvocationProber::new()
            .probe_with_module(&handle, Some(&fallback), &callback())
            .unwrap();

        assert_eq!(invocation.method, "run");
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn module_helper_precedes_member_scan() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let module = helper_module(
            helper_signature(&[Parameter::required("callback")]),
            Arc::clone(&seen),
        );
        let fallback = ModuleFallback {
            module: &module,
            leading: leading(),
        };
        let handle = HandleTable::new("Feed").with_method("open_market_ws", one("cb"), |_| ok_call());

        let invocation = InvocationProber::new()
            .probe_with_module(&handle, Some(&fallback), &callback())
            .unwrap();
        assert_eq!(invocation.method, "pkg.marketfeed.market_feed_wss");
    }

    #[test]
    fn module_without_helper_falls_through_to_scan() {
        let module = ModuleTable::new("pkg.marketfeed").with_member("helper");
        let fallback = ModuleFallback {
            module: &module,
            leading: leading(),
        };
        let handle = HandleTable::new("Feed").with_method("open_market_ws", one("cb"), |_| ok_call());

        let invocation = InvocationProber::new()
            .probe_with_module(&handle, Some(&fallback), &callback())
            .unwrap();
        assert_eq!(invocation.method, "open_market_ws");
    }
}
