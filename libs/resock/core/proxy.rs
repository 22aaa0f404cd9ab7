//! Event proxy
//!
//! Single-slot-per-kind dispatcher between the connection driver and the
//! owner. Registering a handler replaces the previous one for that kind;
//! triggering a kind with an empty slot does nothing.

use crate::traits::*;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared verbose-logging flag
///
/// Inject one into any number of connections to toggle their dispatch
/// logging together. [`VerboseSwitch::global`] is the process-wide
/// instance every connection uses unless given another one; set it once
/// at startup, it is read on every dispatch.
#[derive(Debug, Clone, Default)]
pub struct VerboseSwitch(Arc<AtomicBool>);

impl VerboseSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// The process-wide switch
    pub fn global() -> Self {
        static GLOBAL: OnceLock<VerboseSwitch> = OnceLock::new();
        GLOBAL.get_or_init(|| VerboseSwitch::new(false)).clone()
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type Slots = [Option<Arc<dyn EventHandler>>; 6];

/// Dispatches connection events to owner handlers
pub struct EventProxy {
    url: String,
    debug: AtomicBool,
    verbose: VerboseSwitch,
    logger: Arc<dyn EventLogger>,
    slots: RwLock<Slots>,
}

impl EventProxy {
    pub fn new(
        url: impl Into<String>,
        debug: bool,
        verbose: VerboseSwitch,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            url: url.into(),
            debug: AtomicBool::new(debug),
            verbose,
            logger,
            slots: RwLock::new(Default::default()),
        }
    }

    /// Register `handler` for `kind`, replacing any previous one
    pub fn set_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.slots.write()[kind.index()] = Some(handler);
    }

    /// Empty the slot for `kind`
    pub fn clear(&self, kind: EventKind) {
        self.slots.write()[kind.index()] = None;
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.slots.read()[kind.index()].is_some()
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Release);
    }

    /// Whether dispatches are currently logged
    pub fn is_verbose(&self) -> bool {
        self.debug.load(Ordering::Acquire) || self.verbose.is_enabled()
    }

    /// Log (when verbose) and hand `event` to its handler, if any
    pub fn trigger(&self, event: &Event) {
        let kind = event.kind();
        if self.is_verbose() {
            self.logger.log(kind.name(), &self.url, event);
        }

        // Release the lock before calling out so handlers may re-register
        let handler = self.slots.read()[kind.index()].clone();
        if let Some(handler) = handler {
            handler.handle(event);
        }
    }
}

impl std::fmt::Debug for EventProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<&str> = EventKind::ALL
            .iter()
            .filter(|k| self.has_handler(**k))
            .map(|k| k.name())
            .collect();
        f.debug_struct("EventProxy")
            .field("url", &self.url)
            .field("verbose", &self.is_verbose())
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn proxy(debug: bool, verbose: VerboseSwitch, logger: &BufferedLogger) -> EventProxy {
        EventProxy::new("ws://test", debug, verbose, Arc::new(logger.clone()))
    }

    #[test]
    fn test_unregistered_kind_is_noop() {
        let logger = BufferedLogger::new();
        let proxy = proxy(false, VerboseSwitch::new(false), &logger);
        proxy.trigger(&Event::Open);
        assert!(logger.is_empty());
    }

    #[test]
    fn test_registration_replaces() {
        let logger = BufferedLogger::new();
        let proxy = proxy(false, VerboseSwitch::new(false), &logger);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        proxy.set_handler(EventKind::Open, Arc::new(move |_: &Event| first.lock().push("first")));
        let second = Arc::clone(&seen);
        proxy.set_handler(EventKind::Open, Arc::new(move |_: &Event| second.lock().push("second")));

        proxy.trigger(&Event::Open);
        proxy.trigger(&Event::Timeout);
        assert_eq!(*seen.lock(), vec!["second"]);

        proxy.clear(EventKind::Open);
        proxy.trigger(&Event::Open);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_verbose_switch_logs_without_handler() {
        let logger = BufferedLogger::new();
        let switch = VerboseSwitch::new(false);
        let proxy = proxy(false, switch.clone(), &logger);

        proxy.trigger(&Event::Connecting);
        assert!(logger.is_empty());

        switch.set(true);
        proxy.trigger(&Event::Connecting);
        let lines = logger.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("onconnecting ws://test"));
    }

    #[test]
    fn test_instance_debug_flag_logs() {
        let logger = BufferedLogger::new();
        let proxy = proxy(true, VerboseSwitch::new(false), &logger);
        proxy.trigger(&Event::Error("boom".to_string()));
        assert!(logger.drain()[0].contains("onerror"));
    }

    #[test]
    fn test_handler_may_reregister_during_dispatch() {
        let logger = BufferedLogger::new();
        let proxy = Arc::new(proxy(false, VerboseSwitch::new(false), &logger));
        let inner = Arc::clone(&proxy);
        proxy.set_handler(
            EventKind::Open,
            Arc::new(move |_: &Event| inner.clear(EventKind::Open)),
        );
        proxy.trigger(&Event::Open);
        assert!(!proxy.has_handler(EventKind::Open));
    }
}
