//! Transformation Pipeline
//!
//! The synchronous part of event processing, owned by the tap thread. Every
//! raw event goes through the same steps:
//!
//! ```text
//! HardwareEvent
//!   │ stamp (Clock)
//!   ▼
//! RawInputEvent ── FlagsChanged ──> keyboard modifiers (never re-emitted)
//!   │ resolve (DeviceRegistry) ── NotFound ──> pass-through
//!   ▼
//! DeviceSession
//!   ├─ button ──> ModifierResolver ──> click / key combo / drag / replay
//!   ├─ move   ──> ModifiedDrag (engaged) or PointerAccelerator
//!   └─ scroll ──> ModifierResolver ──> ScrollSimulator
//!   │
//!   ▼
//! RetrySlot ──> OutputCoordinator ──> EventSink
//! ```
//!
//! # Sessions
//!
//! Each device has one `DeviceSession` holding at most one scroll session
//! and one drag session. A qualifying gesture of the other kind cancels the
//! running one through its normal transition function first.
//!
//! # Reload
//!
//! A reloaded configuration is parked and adopted only once every device
//! session is idle, so no gesture ever sees two configurations. Adoption
//! also re-resolves every session's identity, picking up device classes
//! changed by the reload.

use crate::accel::table::AccelerationTable;
use crate::accel::PointerAccelerator;
use crate::config::{Config, ProfileConfig};
use crate::device::{DeviceClass, DeviceId, DeviceIdentity, DeviceRegistry, TableId};
use crate::input::clock::Clock;
use crate::input::error::{recovery_action, PipelineError, RecoveryAction, Result};
use crate::input::event::{EventKind, HardwareEvent, MouseButton, RawInputEvent};
use crate::input::modifiers::{Modifier, ModifierSet, ModifierState};
use crate::output::{OutputCoordinator, OutputEvent, ProducerId, RetrySlot, SequenceStep};
use crate::remap::action::{Action, DragKind};
use crate::remap::drag::{DragMotion, DragSession, DragState, ModifiedDrag};
use crate::remap::resolver::{MappingTable, ModifierResolver, Resolution, ResolverInput, ResolverState};
use crate::scroll::simulator::{ScrollInput, ScrollSession, ScrollSimulator};
use crate::utils::metrics::PipelineMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Shared collaborators handed to session methods
struct Context<'a> {
    registry: &'a dyn DeviceRegistry,
    coordinator: &'a OutputCoordinator,
    metrics: &'a PipelineMetrics,
}

/// Retry slots, one per producer
#[derive(Debug)]
struct Slots {
    pointer: RetrySlot,
    scroll: RetrySlot,
    drag: RetrySlot,
    remap: RetrySlot,
    passthrough: RetrySlot,
}

impl Slots {
    fn new() -> Self {
        Self {
            pointer: RetrySlot::new(ProducerId::Pointer),
            scroll: RetrySlot::new(ProducerId::Scroll),
            drag: RetrySlot::new(ProducerId::Drag),
            remap: RetrySlot::new(ProducerId::Remap),
            passthrough: RetrySlot::new(ProducerId::Passthrough),
        }
    }

    fn get(&mut self, producer: ProducerId) -> &mut RetrySlot {
        match producer {
            ProducerId::Pointer => &mut self.pointer,
            ProducerId::Scroll => &mut self.scroll,
            ProducerId::Drag => &mut self.drag,
            ProducerId::Remap => &mut self.remap,
            ProducerId::Passthrough => &mut self.passthrough,
        }
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut RetrySlot> {
        [
            &mut self.pointer,
            &mut self.scroll,
            &mut self.drag,
            &mut self.remap,
            &mut self.passthrough,
        ]
        .into_iter()
    }

    fn any_parked(&self) -> bool {
        [
            &self.pointer,
            &self.scroll,
            &self.drag,
            &self.remap,
            &self.passthrough,
        ]
        .iter()
        .any(|s| s.is_parked())
    }
}

/// Everything the pipeline tracks for one device
#[derive(Debug)]
struct DeviceSession {
    device: DeviceId,
    class: DeviceClass,
    pointer_table: TableId,
    scroll_table: TableId,
    modifiers: ModifierState,
    resolver: ModifierResolver,
    accelerator: PointerAccelerator,
    scroll: ScrollSimulator,
    drag: ModifiedDrag,
    slots: Slots,
    /// Output of the current step (capacity reused)
    out: Vec<OutputEvent>,
}

impl DeviceSession {
    fn new(
        identity: &DeviceIdentity,
        profile: &ProfileConfig,
        mappings: Arc<MappingTable>,
        scroll_table: Arc<AccelerationTable>,
        keyboard: ModifierSet,
    ) -> Self {
        let mut modifiers = ModifierState::new();
        modifiers.set_keyboard(keyboard);

        Self {
            device: identity.device_id,
            class: identity.class,
            pointer_table: identity.pointer_table,
            scroll_table: identity.scroll_table,
            modifiers,
            resolver: ModifierResolver::new(mappings),
            accelerator: PointerAccelerator::new(&profile.pointer),
            scroll: ScrollSimulator::new(profile.scroll.clone(), scroll_table),
            drag: ModifiedDrag::new(profile.drag.clone(), profile.scroll.momentum),
            slots: Slots::new(),
            out: Vec::with_capacity(16),
        }
    }

    fn is_idle(&self) -> bool {
        self.resolver.is_idle()
            && self.scroll.is_idle()
            && self.drag.is_idle()
            && !self.slots.any_parked()
    }

    /// Submit everything in `out` on behalf of `producer`
    fn emit(&mut self, ctx: &Context<'_>, producer: ProducerId) {
        if self.out.is_empty() {
            return;
        }
        let mut events = std::mem::take(&mut self.out);
        let slot = self.slots.get(producer);
        for event in &events {
            let step = event
                .phase()
                .map_or(SequenceStep::Discrete, SequenceStep::from_phase);
            slot.submit(
                ctx.coordinator,
                ctx.metrics,
                self.device,
                std::slice::from_ref(event),
                step,
            );
        }
        events.clear();
        self.out = events;
    }

    fn passthrough(&mut self, ctx: &Context<'_>, event: RawInputEvent) {
        ctx.metrics.record_passthrough();
        self.out.push(OutputEvent::Passthrough(event));
        self.emit(ctx, ProducerId::Passthrough);
    }

    fn on_button(&mut self, ctx: &Context<'_>, event: RawInputEvent, button: MouseButton, pressed: bool) {
        let input = if pressed {
            self.modifiers.press(button);
            ResolverInput::ButtonDown(button)
        } else {
            self.modifiers.release(button);
            ResolverInput::ButtonUp(button)
        };
        let held = self.modifiers.held();

        match self.resolver.transition(input, held) {
            Resolution::PassThrough | Resolution::Scroll(_) => self.passthrough(ctx, event),

            Resolution::Suppress => ctx.metrics.record_suppressed(),

            Resolution::Fire(action) => {
                ctx.metrics.record_suppressed();
                self.fire(ctx, action);
            }

            Resolution::ReplayClick(button) => {
                ctx.metrics.record_suppressed();
                self.click(ctx, button);
            }

            Resolution::BeginDrag { button, kind } => {
                ctx.metrics.record_suppressed();
                self.cancel_scroll(ctx);
                let triggering = held & !ModifierSet::from(Modifier::from_button(button));
                self.drag.begin(button, kind, triggering, &mut self.out);
                self.emit(ctx, ProducerId::Drag);
            }

            Resolution::EndDrag { button, tap } => {
                ctx.metrics.record_suppressed();
                let was_active = self.drag.release(&mut self.out);
                self.emit(ctx, ProducerId::Drag);
                if !was_active {
                    match tap {
                        Some(Action::None) => {}
                        Some(action) => self.fire(ctx, action),
                        None => self.click(ctx, button),
                    }
                }
            }
        }
    }

    fn on_motion(&mut self, ctx: &Context<'_>, event: RawInputEvent) {
        let delta = if self.drag.is_engaged() {
            let was_candidate = self.drag.state() == DragState::Candidate;
            let motion = self.drag.motion(event.delta, &mut self.out);
            if was_candidate && self.drag.state() == DragState::Active && !self.scroll.is_idle() {
                // The scroll session still holds the device; end it before the commit
                let committed = std::mem::take(&mut self.out);
                self.cancel_scroll(ctx);
                self.out = committed;
            }
            self.emit(ctx, ProducerId::Drag);
            match motion {
                DragMotion::Consumed => {
                    ctx.metrics.record_suppressed();
                    return;
                }
                DragMotion::Pointer(delta) => delta,
            }
        } else {
            event.delta
        };

        let Some(table) = ctx.registry.table(self.pointer_table) else {
            warn!("No pointer table for {}, passing motion through", self.device);
            self.passthrough(ctx, event);
            return;
        };

        let [dx, dy] = self.accelerator.accelerate(delta, event.timestamp_ns, &table);
        if dx != 0 || dy != 0 {
            self.out.push(OutputEvent::PointerMove { dx, dy });
            self.emit(ctx, ProducerId::Pointer);
        }
    }

    fn on_scroll(&mut self, ctx: &Context<'_>, event: RawInputEvent) {
        match self.drag.state() {
            DragState::Active if self.drag.session().map(|s| s.kind) != Some(DragKind::PassThrough) => {
                trace!("Scroll during active drag on {} suppressed", self.device);
                ctx.metrics.record_suppressed();
                return;
            }
            _ => {}
        }
        if !self.drag.is_engaged() && !self.drag.is_idle() {
            // Drag momentum is still running
            self.drag.cancel(&mut self.out);
            self.emit(ctx, ProducerId::Drag);
        }

        let held = self.modifiers.held();
        match self.resolver.transition(ResolverInput::Scroll, held) {
            Resolution::Scroll(modification) => {
                if let Some(table) = ctx.registry.table(self.scroll_table) {
                    self.scroll.set_table(table);
                }
                self.scroll.set_modification(modification);
                let output = self.scroll.step(ScrollInput::Delta {
                    dx: event.delta[0],
                    dy: event.delta[1],
                    timestamp_ns: event.timestamp_ns,
                });
                self.out.extend(output.iter().map(OutputEvent::scroll));
                self.emit(ctx, ProducerId::Scroll);
            }
            Resolution::Fire(action) => {
                ctx.metrics.record_suppressed();
                self.fire(ctx, action);
            }
            Resolution::Suppress => ctx.metrics.record_suppressed(),
            Resolution::PassThrough
            | Resolution::ReplayClick(_)
            | Resolution::BeginDrag { .. }
            | Resolution::EndDrag { .. } => self.passthrough(ctx, event),
        }
    }

    /// End a running scroll session ahead of a drag gesture
    fn cancel_scroll(&mut self, ctx: &Context<'_>) {
        if self.scroll.is_idle() {
            return;
        }
        debug!("Drag on {} cancels scroll session", self.device);
        let output = self.scroll.step(ScrollInput::Cancel);
        self.out.extend(output.iter().map(OutputEvent::scroll));
        self.emit(ctx, ProducerId::Scroll);
    }

    fn on_flags(&mut self, flags: ModifierSet) {
        self.modifiers.set_keyboard(flags);
        let held = self.modifiers.held();
        self.resolver.transition(ResolverInput::FlagsChanged, held);
    }

    fn tick(&mut self, ctx: &Context<'_>) {
        for slot in self.slots.iter_mut() {
            slot.flush(ctx.coordinator, ctx.metrics);
        }

        let output = self.scroll.step(ScrollInput::Tick);
        self.out.extend(output.iter().map(OutputEvent::scroll));
        self.emit(ctx, ProducerId::Scroll);

        self.drag.tick(&mut self.out);
        self.emit(ctx, ProducerId::Drag);
    }

    /// Drive every state machine to idle through its normal transitions
    fn cancel(&mut self, ctx: &Context<'_>) {
        self.drag.cancel(&mut self.out);
        self.emit(ctx, ProducerId::Drag);

        let output = self.scroll.step(ScrollInput::Cancel);
        self.out.extend(output.iter().map(OutputEvent::scroll));
        self.emit(ctx, ProducerId::Scroll);

        self.resolver.transition(ResolverInput::Cancel, self.modifiers.held());
        self.modifiers.clear();
    }

    fn fire(&mut self, ctx: &Context<'_>, action: Action) {
        match action {
            Action::Click { button } => self.click(ctx, button),
            Action::KeyCombo { keys } => {
                trace!("{} fires key combo {:?}", self.device, keys.keys());
                for &code in keys.keys() {
                    self.out.push(OutputEvent::Key {
                        code,
                        pressed: true,
                    });
                }
                for &code in keys.keys().iter().rev() {
                    self.out.push(OutputEvent::Key {
                        code,
                        pressed: false,
                    });
                }
                self.emit(ctx, ProducerId::Remap);
            }
            Action::Drag { .. } | Action::ScrollModify { .. } | Action::None => {
                trace!("{:?} has no discrete output", action);
            }
        }
    }

    fn click(&mut self, ctx: &Context<'_>, button: MouseButton) {
        self.out.push(OutputEvent::Button {
            button,
            pressed: true,
        });
        self.out.push(OutputEvent::Button {
            button,
            pressed: false,
        });
        self.emit(ctx, ProducerId::Remap);
    }
}

/// Single-threaded event pipeline
pub struct Pipeline {
    config: Arc<Config>,
    pending: Option<Arc<Config>>,
    mappings: HashMap<DeviceClass, Arc<MappingTable>>,
    registry: Arc<dyn DeviceRegistry>,
    coordinator: Arc<OutputCoordinator>,
    clock: Box<dyn Clock>,
    metrics: Arc<PipelineMetrics>,
    keyboard: ModifierSet,
    sessions: HashMap<DeviceId, DeviceSession>,
    /// Devices already reported as unknown
    unknown: HashSet<DeviceId>,
    passthrough: RetrySlot,
}

impl Pipeline {
    /// Create a pipeline for a validated configuration
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn DeviceRegistry>,
        coordinator: Arc<OutputCoordinator>,
        clock: Box<dyn Clock>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        let mappings = build_mappings(&config)?;
        Ok(Self {
            config,
            pending: None,
            mappings,
            registry,
            coordinator,
            clock,
            metrics,
            keyboard: ModifierSet::empty(),
            sessions: HashMap::new(),
            unknown: HashSet::new(),
            passthrough: RetrySlot::new(ProducerId::Passthrough),
        })
    }

    /// Process one hardware event
    pub fn process(&mut self, event: HardwareEvent) {
        let started = Instant::now();
        let event = RawInputEvent::stamp(event, self.clock.now_ns());
        self.metrics.record_event();

        if let EventKind::FlagsChanged(flags) = event.kind {
            self.flags_changed(flags);
            return;
        }

        let identity = match self.registry.resolve(event.device_id) {
            Ok(identity) => identity,
            Err(e) => {
                if recovery_action(&e, 0) != RecoveryAction::PassThrough {
                    error!("Unexpected registry failure: {}", e);
                }
                if self.unknown.insert(event.device_id) {
                    warn!("{}, passing its events through", e);
                } else {
                    trace!("{}", e);
                }
                self.passthrough(event);
                return;
            }
        };

        let ctx = Context {
            registry: self.registry.as_ref(),
            coordinator: &self.coordinator,
            metrics: &self.metrics,
        };
        let session = match self.sessions.entry(identity.device_id) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mappings = self
                    .mappings
                    .get(&identity.class)
                    .cloned()
                    .unwrap_or_default();
                let scroll_table = ctx
                    .registry
                    .table(identity.scroll_table)
                    .unwrap_or_else(|| Arc::new(AccelerationTable::flat(1.0)));
                debug!("New session for {} ({})", identity.device_id, identity.class);
                entry.insert(DeviceSession::new(
                    &identity,
                    self.config.profiles.get(identity.class),
                    mappings,
                    scroll_table,
                    self.keyboard,
                ))
            }
        };

        match event.kind {
            EventKind::Move | EventKind::Drag(_) => session.on_motion(&ctx, event),
            EventKind::Scroll => session.on_scroll(&ctx, event),
            EventKind::ButtonDown(button) => session.on_button(&ctx, event, button, true),
            EventKind::ButtonUp(button) => session.on_button(&ctx, event, button, false),
            EventKind::FlagsChanged(_) => {}
        }

        self.metrics.record_latency(started.elapsed());
        self.try_adopt();
    }

    /// Advance idle timeouts, momentum and pending retries
    pub fn tick(&mut self) {
        self.metrics.record_tick();
        self.passthrough.flush(&self.coordinator, &self.metrics);

        let ctx = Context {
            registry: self.registry.as_ref(),
            coordinator: &self.coordinator,
            metrics: &self.metrics,
        };
        for session in self.sessions.values_mut() {
            session.tick(&ctx);
        }

        self.try_adopt();
    }

    /// Forward a raw event unmodified
    pub fn passthrough(&mut self, event: RawInputEvent) {
        self.metrics.record_passthrough();
        self.passthrough.submit(
            &self.coordinator,
            &self.metrics,
            event.device_id,
            &[OutputEvent::Passthrough(event)],
            SequenceStep::Discrete,
        );
    }

    /// Adopt `config` as soon as every session is idle
    ///
    /// The snapshot must already be validated; one that fails to build is
    /// discarded and the active configuration stays in effect.
    pub fn request_reload(&mut self, config: Arc<Config>) {
        if let Err(e) = build_mappings(&config) {
            error!("Reload rejected, keeping active configuration: {}", e);
            return;
        }
        if self.pending.replace(config).is_some() {
            debug!("Pending configuration superseded");
        }
        self.try_adopt();
    }

    /// True while a reloaded configuration waits for idle sessions
    pub fn reload_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Cancel a device's gestures and forget its session
    pub fn remove_device(&mut self, device: DeviceId) {
        let ctx = Context {
            registry: self.registry.as_ref(),
            coordinator: &self.coordinator,
            metrics: &self.metrics,
        };
        if let Some(mut session) = self.sessions.remove(&device) {
            session.cancel(&ctx);
        }
        self.coordinator.release_device(device);
        self.unknown.remove(&device);
    }

    /// Recover from a fault while processing `event`
    ///
    /// Forgets the device's session without running any of its state
    /// machines and forwards the event unmodified.
    pub fn recover_fault(&mut self, event: HardwareEvent) {
        self.metrics.record_fault();
        if self.sessions.remove(&event.device_id).is_some() {
            warn!("Session for {} reset after fault", event.device_id);
        }
        self.coordinator.release_device(event.device_id);

        if !matches!(event.kind, EventKind::FlagsChanged(_)) {
            let raw = RawInputEvent::stamp(event, self.clock.now_ns());
            self.passthrough(raw);
        }
    }

    /// Cancel every session (shutdown)
    pub fn shutdown(&mut self) {
        let devices: Vec<DeviceId> = self.sessions.keys().copied().collect();
        for device in devices {
            self.remove_device(device);
        }
        info!("Pipeline stopped, {} events processed", self.metrics.snapshot().events_processed);
    }

    /// Active configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Shared counters
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// True when no device has a running gesture
    pub fn is_idle(&self) -> bool {
        self.sessions.values().all(DeviceSession::is_idle)
    }

    /// Number of devices with a session
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Scroll session of `device`, if one is running
    pub fn scroll_session(&self, device: DeviceId) -> Option<ScrollSession> {
        self.sessions.get(&device).and_then(|s| s.scroll.session())
    }

    /// Drag session of `device`, if one is running
    pub fn drag_session(&self, device: DeviceId) -> Option<DragSession> {
        self.sessions.get(&device).and_then(|s| s.drag.session())
    }

    /// Resolver state of `device`
    pub fn resolver_state(&self, device: DeviceId) -> Option<ResolverState> {
        self.sessions.get(&device).map(|s| s.resolver.state())
    }

    fn flags_changed(&mut self, flags: ModifierSet) {
        trace!("Keyboard modifiers {:?}", flags);
        self.keyboard = flags;
        for session in self.sessions.values_mut() {
            session.on_flags(flags);
        }
    }

    fn try_adopt(&mut self) {
        if self.pending.is_none() || !self.is_idle() {
            return;
        }
        let Some(config) = self.pending.take() else {
            return;
        };

        match build_mappings(&config) {
            Ok(mappings) => {
                self.mappings = mappings;
            }
            Err(e) => {
                error!("Reload rejected, keeping active configuration: {}", e);
                return;
            }
        }

        for session in self.sessions.values_mut() {
            match self.registry.resolve(session.device) {
                Ok(identity) => {
                    if identity.class != session.class {
                        info!("{} reclassified as {}", session.device, identity.class);
                    }
                    session.class = identity.class;
                    session.pointer_table = identity.pointer_table;
                    session.scroll_table = identity.scroll_table;
                }
                Err(e) => debug!("{}, keeping session identity", e),
            }
            if let Some(table) = self.registry.table(session.scroll_table) {
                session.scroll.set_table(table);
            }

            let profile = config.profiles.get(session.class);
            if let Some(mappings) = self.mappings.get(&session.class) {
                if let Err(e) = session.resolver.set_table(Arc::clone(mappings)) {
                    warn!("{}: {}", session.device, e);
                }
            }
            session.accelerator = PointerAccelerator::new(&profile.pointer);
            if let Err(e) = session.scroll.reconfigure(profile.scroll.clone()) {
                warn!("{}: {}", session.device, e);
            }
            session.drag.reconfigure(profile.drag.clone(), profile.scroll.momentum);
        }

        self.config = config;
        self.metrics.record_reload();
        info!("Configuration adopted by {} sessions", self.sessions.len());
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("sessions", &self.sessions.len())
            .field("reload_pending", &self.pending.is_some())
            .field("keyboard", &self.keyboard)
            .finish()
    }
}

fn build_mappings(config: &Config) -> Result<HashMap<DeviceClass, Arc<MappingTable>>> {
    DeviceClass::ALL
        .iter()
        .map(|class| {
            let table = config.profiles.get(*class).mapping_table().map_err(|e| {
                PipelineError::ConfigurationInvalid(format!("{} mappings: {}", class, e))
            })?;
            Ok((*class, Arc::new(table)))
        })
        .collect()
}
