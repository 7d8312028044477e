//! Built-in host tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::host_test::{HostTest, TestContext};
use crate::protocol::now;

/// Host test with no supervision: wait for the DUT verdict and nothing else.
pub struct DefaultAuto;

impl HostTest for DefaultAuto {
    fn setup(&mut self, _ctx: &mut TestContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn result(&mut self) -> Option<bool> {
        None
    }
}

/// Verifies the DUT sends a `hello_world` pair with the expected value.
pub struct HelloAuto {
    result: Arc<Mutex<Option<bool>>>,
}

impl HelloAuto {
    const HELLO_WORLD: &'static str = "Hello World";

    pub fn new() -> Self {
        Self {
            result: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for HelloAuto {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTest for HelloAuto {
    fn setup(&mut self, ctx: &mut TestContext<'_>) -> anyhow::Result<()> {
        let result = self.result.clone();
        let handle = ctx.handle().clone();
        ctx.register_callback(
            "hello_world",
            Box::new(move |_key, value, _ts| {
                *result.lock().unwrap() = Some(value == Self::HELLO_WORLD);
                handle.notify_complete(None);
                Ok(())
            }),
        )?;
        Ok(())
    }

    fn result(&mut self) -> Option<bool> {
        *self.result.lock().unwrap()
    }
}

#[derive(Default)]
struct EchoState {
    remaining: u32,
    sent: Vec<String>,
    received: Vec<String>,
}

impl EchoState {
    fn send_next(&mut self, handle: &crate::dispatcher::TestHandle) {
        if self.remaining == 0 {
            return;
        }
        let token = unique_token();
        handle.send_kv("echo", token.clone());
        self.sent.push(token);
        self.remaining -= 1;
    }
}

/// Round-trip ping test: send unique tokens, expect each echoed back.
///
/// The DUT opens the handshake with `echo_count`; the host answers it and
/// then drives the exchange.
pub struct Echo {
    state: Arc<Mutex<EchoState>>,
}

impl Echo {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EchoState::default())),
        }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTest for Echo {
    fn setup(&mut self, ctx: &mut TestContext<'_>) -> anyhow::Result<()> {
        let state = self.state.clone();
        let handle = ctx.handle().clone();
        ctx.register_callback(
            "echo_count",
            Box::new(move |key, value, _ts| {
                let mut state = state.lock().unwrap();
                state.remaining = value.parse().unwrap_or(0);
                handle.send_kv(key, value);
                state.send_next(&handle);
                Ok(())
            }),
        )?;

        let state = self.state.clone();
        let handle = ctx.handle().clone();
        ctx.register_callback(
            "echo",
            Box::new(move |_key, value, _ts| {
                let mut state = state.lock().unwrap();
                state.received.push(value.to_string());
                state.send_next(&handle);
                Ok(())
            }),
        )?;
        Ok(())
    }

    fn result(&mut self) -> Option<bool> {
        let state = self.state.lock().unwrap();
        Some(!state.sent.is_empty() && state.sent == state.received)
    }
}

/// Process-unique echo token; monotonic counter plus capture time.
fn unique_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("echo-{n}-{:.0}", now() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    use crate::dispatcher::queues::{DispatchSignal, DutMessage, TestHandle};
    use crate::dispatcher::events::EventDispatcher;
    use crate::protocol::Frame;

    struct Rig {
        dispatcher: EventDispatcher,
        handle: TestHandle,
        main_rx: std::sync::mpsc::Receiver<DispatchSignal>,
        dut_rx: std::sync::mpsc::Receiver<DutMessage>,
    }

    fn rig() -> Rig {
        let (main_tx, main_rx) = channel();
        let (dut_tx, dut_rx) = channel();
        let handle = TestHandle::new(main_tx, dut_tx);
        Rig {
            dispatcher: EventDispatcher::new(handle.clone()),
            handle,
            main_rx,
            dut_rx,
        }
    }

    #[test]
    fn hello_passes_on_expected_value() {
        let mut rig = rig();
        let mut test = HelloAuto::new();
        let config = serde_json::Value::Null;
        let mut ctx = TestContext::new(&mut rig.dispatcher, rig.handle.clone(), &config);
        test.setup(&mut ctx).unwrap();

        rig.dispatcher
            .dispatch(&Frame::new("hello_world", "Hello World"));
        assert_eq!(test.result(), Some(true));
        assert!(matches!(
            rig.main_rx.try_recv().unwrap(),
            DispatchSignal::Complete(None)
        ));
    }

    #[test]
    fn hello_fails_on_wrong_value() {
        let mut rig = rig();
        let mut test = HelloAuto::new();
        let config = serde_json::Value::Null;
        let mut ctx = TestContext::new(&mut rig.dispatcher, rig.handle.clone(), &config);
        test.setup(&mut ctx).unwrap();

        rig.dispatcher
            .dispatch(&Frame::new("hello_world", "Goodbye"));
        assert_eq!(test.result(), Some(false));
    }

    #[test]
    fn echo_round_trip_matches() {
        let mut rig = rig();
        let mut test = Echo::new();
        let config = serde_json::Value::Null;
        let mut ctx = TestContext::new(&mut rig.dispatcher, rig.handle.clone(), &config);
        test.setup(&mut ctx).unwrap();

        // DUT opens the handshake with the echo count.
        rig.dispatcher.dispatch(&Frame::new("echo_count", "2"));

        // Handshake answer goes back first, then the first token.
        match rig.dut_rx.try_recv().unwrap() {
            DutMessage::Kv { key, value, .. } => {
                assert_eq!(key, "echo_count");
                assert_eq!(value, "2");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // Echo each sent token back; the test sends the next on receipt.
        for _ in 0..2 {
            let token = match rig.dut_rx.try_recv().unwrap() {
                DutMessage::Kv { key, value, .. } => {
                    assert_eq!(key, "echo");
                    value
                }
                other => panic!("unexpected message: {other:?}"),
            };
            rig.dispatcher.dispatch(&Frame::new("echo", token));
        }

        assert_eq!(test.result(), Some(true));
    }

    #[test]
    fn echo_mismatch_fails() {
        let mut rig = rig();
        let mut test = Echo::new();
        let config = serde_json::Value::Null;
        let mut ctx = TestContext::new(&mut rig.dispatcher, rig.handle.clone(), &config);
        test.setup(&mut ctx).unwrap();

        rig.dispatcher.dispatch(&Frame::new("echo_count", "1"));
        rig.dispatcher.dispatch(&Frame::new("echo", "garbled"));
        assert_eq!(test.result(), Some(false));
    }
}
