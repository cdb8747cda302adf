// Rust guideline compliant 2026-07-22

//! Module host: the shared lifecycle framework every detector module runs
//! under.
//!
//! A module is a capability interface with four operations (`init`,
//! `pre_main`, `main`, `shutdown_gracefully`) in two variants: [`Module`]
//! (async) and [`SyncModule`] (straight-line, driven on a blocking thread).
//! The variant is fixed at registration; the drivers [`run_module`] and
//! [`run_sync_module`] never introspect.
//!
//! Loop semantics:
//!
//! ```text
//! init(); pre_main()
//! if pre_main error or should_stop(): shutdown_gracefully(); exit
//! repeat:
//!   if should_stop(): shutdown_gracefully(); exit
//!   if interrupted twice: exit immediately
//!   if main() errors: shutdown_gracefully(); exit
//! ```
//!
//! `should_stop()` is true iff no subscribed channel received a message in
//! the last iteration AND the supervisor's termination signal is set --
//! modules drain in-flight work before committing to shutdown. Until a
//! channel has been polled once it counts as active, so a module never
//! stops before its first drain pass.

use domain::{ChannelMessage, InterruptCounter, Termination};
use output::OutputHandle;
use std::collections::HashMap;
use std::time::Duration;
use store::kv::{KvStore, Subscription};
use store::{ChannelTracker, channels, is_msg_intended_for};

/// Sleep between iterations in which no channel produced a message.
const IDLE_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// ModuleError + ModuleExit
// ---------------------------------------------------------------------------

/// Failure reported by a module operation. The host logs it and exits the
/// module; the rest of the pipeline continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("module '{module}': {reason}")]
pub struct ModuleError {
    pub module: String,
    pub reason: String,
}

impl ModuleError {
    #[must_use]
    pub fn new(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// How a module left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleExit {
    /// Drained and stopped on the termination signal.
    Clean,
    /// `init` failed; the loop never started and no shutdown ran.
    InitFailed,
    /// `pre_main` failed; shutdown ran.
    PreMainFailed,
    /// `main` failed; shutdown ran.
    MainFailed,
    /// Second interrupt: immediate exit, no shutdown.
    Interrupted,
}

// ---------------------------------------------------------------------------
// Module traits
// ---------------------------------------------------------------------------

/// Async module variant. `main` runs repeatedly on the tokio runtime.
#[expect(
    async_fn_in_trait,
    reason = "modules are driven through the generic run_module, never dyn"
)]
pub trait Module {
    /// Stable module name (worker identity, log origin).
    fn name(&self) -> &'static str;

    /// Subscribed channels: logical name -> store channel name.
    fn channels(&self) -> Vec<(&'static str, &'static str)>;

    /// One-time setup after framework construction.
    ///
    /// # Errors
    ///
    /// An error aborts the module before the loop starts.
    fn init(&mut self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs once before the loop.
    ///
    /// # Errors
    ///
    /// An error runs shutdown and exits the module.
    async fn pre_main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError> {
        let _ = ctx;
        Ok(())
    }

    /// One loop iteration; typically calls [`ModuleCtx::get_msg`] on each
    /// subscribed channel.
    ///
    /// # Errors
    ///
    /// An error runs shutdown and exits the module.
    async fn main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError>;

    /// Cleanup before exit.
    async fn shutdown_gracefully(&mut self, ctx: &mut ModuleCtx) {
        let _ = ctx;
    }
}

/// Straight-line module variant, driven on a blocking thread by
/// [`run_sync_module`].
pub trait SyncModule {
    fn name(&self) -> &'static str;

    /// Subscribed channels: logical name -> store channel name.
    fn channels(&self) -> Vec<(&'static str, &'static str)>;

    /// One-time setup after framework construction.
    ///
    /// # Errors
    ///
    /// An error aborts the module before the loop starts.
    fn init(&mut self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs once before the loop.
    ///
    /// # Errors
    ///
    /// An error runs shutdown and exits the module.
    fn pre_main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError> {
        let _ = ctx;
        Ok(())
    }

    /// One loop iteration.
    ///
    /// # Errors
    ///
    /// An error runs shutdown and exits the module.
    fn main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError>;

    /// Cleanup before exit.
    fn shutdown_gracefully(&mut self, ctx: &mut ModuleCtx) {
        let _ = ctx;
    }
}

// ---------------------------------------------------------------------------
// ModuleCtx
// ---------------------------------------------------------------------------

/// Framework-owned context threaded through every module operation: store
/// handles, subscriptions, the channel tracker, and the cross-worker
/// signals. No ambient state.
#[derive(Debug)]
pub struct ModuleCtx {
    name: String,
    kv: KvStore,
    output: OutputHandle,
    subs: HashMap<String, Subscription>,
    tracker: ChannelTracker,
    term: Termination,
    interrupts: InterruptCounter,
    idle_poll: Duration,
}

impl ModuleCtx {
    /// Subscribe to the declared channels and build the tracker.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        declared: &[(&str, &str)],
        kv: KvStore,
        output: OutputHandle,
        term: Termination,
        interrupts: InterruptCounter,
    ) -> Self {
        let name = name.into();
        let mut subs = HashMap::new();
        let mut tracker = ChannelTracker::new(declared.iter().map(|(logical, _)| *logical));
        for (logical, store_channel) in declared {
            subs.insert((*logical).to_owned(), kv.subscribe(store_channel));
            // Unpolled channels count as active: the grace pass before any
            // shutdown decision.
            tracker.mark(logical, true);
        }
        Self {
            name,
            kv,
            output,
            subs,
            tracker,
            term,
            interrupts,
            idle_poll: IDLE_POLL,
        }
    }

    /// Override the idle poll interval (tests).
    #[must_use]
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    #[must_use]
    pub fn output(&self) -> &OutputHandle {
        &self.output
    }

    /// Pop at most one message from the logical channel, filter it against
    /// this subscriber, and record the per-channel received flag.
    pub fn get_msg(&mut self, logical: &str) -> Option<ChannelMessage> {
        let Some(sub) = self.subs.get_mut(logical) else {
            self.tracker.mark(logical, false);
            return None;
        };
        match sub.try_next() {
            Some(msg) if is_msg_intended_for(&msg, sub.channel()) => {
                self.tracker.mark(logical, true);
                self.kv
                    .incr(&format!("msgs_received_{}_{logical}", self.name), 1);
                Some(msg)
            }
            _ => {
                self.tracker.mark(logical, false);
                None
            }
        }
    }

    /// True iff no subscribed channel received a message in the last
    /// iteration AND the termination signal is set.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        !self.tracker.any_received() && self.term.is_set()
    }

    /// True when any channel received a message in the last iteration.
    #[must_use]
    pub fn received_any(&self) -> bool {
        self.tracker.any_received()
    }

    fn interrupted_twice(&self) -> bool {
        self.interrupts.count() >= 2
    }

    fn announce_finished(&self) {
        self.kv
            .publish(&self.name, channels::FINISHED_MODULES, self.name.clone());
    }
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// Drive an async module to completion.
pub async fn run_module<M: Module>(mut module: M, mut ctx: ModuleCtx) -> ModuleExit {
    let name = module.name();

    if let Err(e) = module.init(&ctx) {
        ctx.output.error(name, format!("init failed: {e}"));
        ctx.announce_finished();
        return ModuleExit::InitFailed;
    }
    if let Err(e) = module.pre_main(&mut ctx).await {
        ctx.output.error(name, format!("pre_main failed: {e}"));
        module.shutdown_gracefully(&mut ctx).await;
        ctx.announce_finished();
        return ModuleExit::PreMainFailed;
    }
    if ctx.should_stop() {
        module.shutdown_gracefully(&mut ctx).await;
        ctx.announce_finished();
        return ModuleExit::Clean;
    }

    loop {
        if ctx.should_stop() {
            module.shutdown_gracefully(&mut ctx).await;
            ctx.announce_finished();
            return ModuleExit::Clean;
        }
        if ctx.interrupted_twice() {
            log::warn!("module.interrupted: name={name}");
            ctx.announce_finished();
            return ModuleExit::Interrupted;
        }
        if let Err(e) = module.main(&mut ctx).await {
            ctx.output.error(name, format!("main failed: {e}"));
            module.shutdown_gracefully(&mut ctx).await;
            ctx.announce_finished();
            return ModuleExit::MainFailed;
        }
        if ctx.received_any() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(ctx.idle_poll).await;
        }
    }
}

/// Drive a sync module to completion; intended for
/// `tokio::task::spawn_blocking`.
pub fn run_sync_module<M: SyncModule>(mut module: M, mut ctx: ModuleCtx) -> ModuleExit {
    let name = module.name();

    if let Err(e) = module.init(&ctx) {
        ctx.output.error(name, format!("init failed: {e}"));
        ctx.announce_finished();
        return ModuleExit::InitFailed;
    }
    if let Err(e) = module.pre_main(&mut ctx) {
        ctx.output.error(name, format!("pre_main failed: {e}"));
        module.shutdown_gracefully(&mut ctx);
        ctx.announce_finished();
        return ModuleExit::PreMainFailed;
    }
    if ctx.should_stop() {
        module.shutdown_gracefully(&mut ctx);
        ctx.announce_finished();
        return ModuleExit::Clean;
    }

    loop {
        if ctx.should_stop() {
            module.shutdown_gracefully(&mut ctx);
            ctx.announce_finished();
            return ModuleExit::Clean;
        }
        if ctx.interrupted_twice() {
            log::warn!("module.interrupted: name={name}");
            ctx.announce_finished();
            return ModuleExit::Interrupted;
        }
        if let Err(e) = module.main(&mut ctx) {
            ctx.output.error(name, format!("main failed: {e}"));
            module.shutdown_gracefully(&mut ctx);
            ctx.announce_finished();
            return ModuleExit::MainFailed;
        }
        if !ctx.received_any() {
            std::thread::sleep(ctx.idle_poll);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
