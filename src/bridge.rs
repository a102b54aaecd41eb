//! Callback bridge.
//!
//! The single point of contact between the driver's callback thread and the
//! harness. The driver ABI registers plain function pointers with no
//! per-call user context, so the live handler set is reached through one
//! process-global slot. Occupancy is strictly single: binding a second
//! bridge while one is live aborts the process, as does a driver callback
//! arriving with no bridge bound. Only one session may stream at a time —
//! this is a usage invariant, not a general concurrency primitive.

use std::process;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::driver::{BufferHalf, DriverCallbacks, MessageSelector, TimeInfo};

type BufferSwitchHandler = Box<dyn FnMut(BufferHalf, bool) + Send>;
type BufferSwitchTimeInfoHandler =
    Box<dyn FnMut(Option<TimeInfo>, BufferHalf, bool) -> Option<TimeInfo> + Send>;

struct Handlers {
    buffer_switch: BufferSwitchHandler,
    buffer_switch_time_info: BufferSwitchTimeInfoHandler,
}

impl Handlers {
    /// Handlers installed at bind time. Streaming must not have started yet,
    /// so a buffer switch arriving here is worth flagging.
    fn pre_start() -> Self {
        Self {
            buffer_switch: Box::new(|half, direct_process| {
                warn!(?half, direct_process, "buffer switch invoked before start");
            }),
            buffer_switch_time_info: Box::new(|time, half, direct_process| {
                warn!(
                    ?time,
                    ?half,
                    direct_process,
                    "buffer switch (time info) invoked before start"
                );
                None
            }),
        }
    }
}

struct BridgeInner {
    handlers: Mutex<Handlers>,
}

static ACTIVE: Mutex<Option<Arc<BridgeInner>>> = Mutex::new(None);

/// Exclusive binding of callback handlers to the global dispatch slot.
///
/// Constructing a bridge claims the slot; dropping it releases the slot.
/// The function pointers from [`driver_callbacks`](Self::driver_callbacks)
/// dispatch through the slot to whatever handlers are currently installed.
pub struct CallbackBridge {
    inner: Arc<BridgeInner>,
}

impl CallbackBridge {
    /// Claims the global slot and installs the pre-start handlers.
    ///
    /// Aborts the process if another bridge is already bound.
    pub fn bind() -> Self {
        let inner = Arc::new(BridgeInner {
            handlers: Mutex::new(Handlers::pre_start()),
        });
        let mut slot = ACTIVE.lock();
        if slot.is_some() {
            error!("a callback bridge is already bound; only one session may stream at a time");
            process::abort();
        }
        *slot = Some(Arc::clone(&inner));
        drop(slot);
        Self { inner }
    }

    /// Replaces the buffer-switch handler.
    pub fn set_buffer_switch(&self, handler: impl FnMut(BufferHalf, bool) + Send + 'static) {
        self.inner.handlers.lock().buffer_switch = Box::new(handler);
    }

    /// Replaces the buffer-switch-with-time-info handler.
    pub fn set_buffer_switch_time_info(
        &self,
        handler: impl FnMut(Option<TimeInfo>, BufferHalf, bool) -> Option<TimeInfo> + Send + 'static,
    ) {
        self.inner.handlers.lock().buffer_switch_time_info = Box::new(handler);
    }

    /// The callback set to register with the driver.
    pub fn driver_callbacks(&self) -> DriverCallbacks {
        DriverCallbacks {
            buffer_switch: dispatch_buffer_switch,
            buffer_switch_time_info: dispatch_buffer_switch_time_info,
            sample_rate_changed: dispatch_sample_rate_changed,
            message: dispatch_message,
        }
    }
}

impl Drop for CallbackBridge {
    fn drop(&mut self) {
        let mut slot = ACTIVE.lock();
        match slot.take() {
            Some(active) if Arc::ptr_eq(&active, &self.inner) => {}
            _ => {
                error!("callback bridge binding slot does not hold this bridge");
                process::abort();
            }
        }
    }
}

/// Fetches the bound bridge, aborting if a callback arrived with none.
fn active() -> Arc<BridgeInner> {
    let slot = ACTIVE.lock();
    match slot.as_ref() {
        Some(inner) => Arc::clone(inner),
        None => {
            error!("driver callback invoked with no bridge bound");
            process::abort();
        }
    }
}

fn dispatch_buffer_switch(half: BufferHalf, direct_process: bool) {
    let inner = active();
    let mut handlers = inner.handlers.lock();
    (handlers.buffer_switch)(half, direct_process);
}

fn dispatch_buffer_switch_time_info(
    time: Option<TimeInfo>,
    half: BufferHalf,
    direct_process: bool,
) -> Option<TimeInfo> {
    let inner = active();
    let mut handlers = inner.handlers.lock();
    (handlers.buffer_switch_time_info)(time, half, direct_process)
}

fn dispatch_sample_rate_changed(rate: f64) {
    let _bound = active();
    info!(rate, "driver reports a sample rate change");
}

fn dispatch_message(selector: MessageSelector, value: i64) -> i64 {
    let _bound = active();
    let result = handle_message(selector, value);
    debug!(?selector, value, result, "message query");
    result
}

type SelectorHandler = fn(value: i64) -> i64;

/// The selectors this host answers, with their handlers.
const MESSAGE_HANDLERS: [(MessageSelector, SelectorHandler); 2] = [
    (MessageSelector::SelectorSupported, handle_selector_supported),
    (MessageSelector::SupportsTimeInfo, handle_supports_time_info),
];

fn handler_for(selector: MessageSelector) -> Option<SelectorHandler> {
    MESSAGE_HANDLERS
        .iter()
        .find(|(handled, _)| *handled == selector)
        .map(|(_, handler)| *handler)
}

fn handle_selector_supported(value: i64) -> i64 {
    debug!(value, "queried for message selector support");
    match MessageSelector::from_raw(value) {
        Some(selector) if handler_for(selector).is_some() => 1,
        _ => 0,
    }
}

fn handle_supports_time_info(_value: i64) -> i64 {
    1
}

/// Answers a generic message query against the static selector table.
///
/// Recognized selectors answer their query; every other selector returns 0
/// ("not handled").
pub fn handle_message(selector: MessageSelector, value: i64) -> i64 {
    handler_for(selector).map_or(0, |handler| handler(value))
}
