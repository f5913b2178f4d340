//! Bridge controller: phase machine, boundary detection, scheduling, dispatch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use continuo_core::{
    encode_prompt, plan_playback, BarBuffer, Event, GridConfig, PulsedEvent, SamplingConfig,
    ScheduledQueue,
};
use continuo_services::{ClockState, EventSink, GenerationJob, GenerationWorker};

use crate::config::BridgeConfig;

/// Controller phase: capturing the performer, or playing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collect,
    Play,
}

/// Owns the bridge business logic.
///
/// The control loop calls [`step`](Self::step) once per iteration and never
/// blocks: boundary detection, result polling, output dispatch, and the
/// phase machine all run against the lock-free pulse count.
pub struct BridgeController {
    grid: GridConfig,
    sampling: SamplingConfig,
    ticks_per_beat: u16,
    clock: Arc<ClockState>,
    bars: Arc<BarBuffer>,
    queue: Arc<ScheduledQueue>,
    worker: GenerationWorker,
    sink: Box<dyn EventSink>,
    phase: Phase,
    pending: Option<Arc<GenerationJob>>,
    model_end_pulse: Option<u64>,
    next_boundary: Option<u64>,
    /// Previous bar's events, kept so the prompt can carry up to two
    /// measures of context.
    prev_bar_events: Vec<PulsedEvent>,
    generations: u64,
    skips: u64,
}

impl BridgeController {
    pub fn new(
        config: &BridgeConfig,
        clock: Arc<ClockState>,
        bars: Arc<BarBuffer>,
        queue: Arc<ScheduledQueue>,
        worker: GenerationWorker,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            grid: config.grid,
            sampling: config.sampling,
            ticks_per_beat: config.ticks_per_beat,
            clock,
            bars,
            queue,
            worker,
            sink,
            phase: Phase::Collect,
            pending: None,
            model_end_pulse: None,
            next_boundary: None,
            prev_bar_events: Vec::new(),
            generations: 0,
            skips: 0,
        }
    }

    /// Run until the shared stop flag is raised. Sleeps ~1 ms between
    /// iterations; this is the latency-critical loop and must not block.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("control loop started");
        while !stop.load(Ordering::Relaxed) {
            self.step();
            thread::sleep(Duration::from_millis(1));
        }
        self.worker.shutdown();
        info!(
            "control loop stopped: {} generations, {} skipped cycles",
            self.generations, self.skips
        );
    }

    /// One control-loop iteration.
    fn step(&mut self) {
        let current = self.clock.pulse();
        self.detect_boundaries(current);
        self.poll_pending(current);
        self.dispatch_due(current);
        self.check_play_end(current);
    }

    /// Advance past every bar boundary the pulse count has crossed. In
    /// COLLECT each finished bar goes to the boundary handler; in PLAY the
    /// crossing only keeps the pulse accounting moving.
    fn detect_boundaries(&mut self, current: u64) {
        let Some(anchor) = self.bars.anchor() else {
            return;
        };
        let ppb = self.grid.pulses_per_bar();
        if self.next_boundary.is_none() {
            self.next_boundary = Some(anchor + ppb);
        }

        while let Some(boundary) = self.next_boundary {
            if current < boundary {
                break;
            }
            let finished_bar = ((boundary - anchor) / ppb - 1) as u32;
            info!("[bar_boundary] finished_bar={finished_bar} pulse={current}");
            if self.phase == Phase::Collect {
                self.handle_boundary(finished_bar, boundary);
            }
            self.next_boundary = Some(boundary + ppb);
        }
    }

    /// COLLECT-phase boundary handler: assemble a prompt from up to two
    /// measures of context and hand a job to the worker. Never blocks.
    fn handle_boundary(&mut self, finished_bar: u32, boundary: u64) {
        let bar_events = self.bars.take(finished_bar);
        if bar_events.is_empty() {
            info!("[bar_boundary] no events captured for bar {finished_bar}, skipping");
            self.prev_bar_events.clear();
            self.skips += 1;
            return;
        }

        let mut context = std::mem::take(&mut self.prev_bar_events);
        context.extend(bar_events.iter().copied());

        let prompt = match encode_prompt(&context, self.ticks_per_beat) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("failed to encode prompt for bar {finished_bar}: {e}");
                self.prev_bar_events = bar_events;
                self.skips += 1;
                return;
            }
        };

        let job = Arc::new(GenerationJob::new(
            finished_bar,
            boundary,
            prompt,
            self.sampling.temperature,
            self.sampling.top_p,
            self.grid.measures,
        ));

        match self.worker.submit(job.clone()) {
            Ok(()) => {
                info!(
                    "[enqueue] bar={finished_bar} prompt_events={} gen_bars={}",
                    context.len(),
                    self.grid.measures
                );
                self.pending = Some(job);
            }
            Err(e) => {
                warn!("could not enqueue generation for bar {finished_bar}: {e}");
                self.skips += 1;
            }
        }
        self.prev_bar_events = bar_events;
    }

    /// Consume a finished generation, enforce the window, and go to PLAY.
    /// Results are only consumed in COLLECT.
    fn poll_pending(&mut self, current: u64) {
        if self.phase == Phase::Collect {
            let ready = self.pending.as_ref().is_some_and(|job| job.is_done());
            if !ready {
                return;
            }
            let Some(job) = self.pending.take() else {
                return;
            };
            let Some(result) = job.take_result() else {
                return;
            };

            let blob = match result {
                Ok(blob) => blob,
                Err(e) => {
                    warn!("generation failed for bar {}: {e}", job.bar_index);
                    self.skips += 1;
                    return;
                }
            };

            let window = self.grid.window_pulses();
            if current > job.boundary_pulse + window {
                warn!(
                    "discarding stale response for bar {} (pulse={current}, submitted at {})",
                    job.bar_index, job.boundary_pulse
                );
                self.skips += 1;
                return;
            }

            let plan = match plan_playback(&blob, current, window, self.ticks_per_beat) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!("malformed generated MIDI for bar {}: {e}", job.bar_index);
                    self.skips += 1;
                    return;
                }
            };

            info!("[ai_ready] bar={} events={}", job.bar_index, plan.len());
            if !self.queue.is_empty() {
                warn!("clearing {} stale scheduled events", self.queue.len());
                self.queue.clear();
            }
            info!(
                "[schedule] {} events in [{current}..{}) min={:?} max={:?}",
                plan.len(),
                plan.end_pulse,
                plan.min_target(),
                plan.max_target()
            );

            let end_pulse = plan.end_pulse;
            self.queue.push_many(plan.batch);
            self.model_end_pulse = Some(end_pulse);
            self.phase = Phase::Play;
            self.generations += 1;
            info!("[phase] COLLECT -> PLAY (end_pulse={end_pulse})");
        }
    }

    /// Emit every due event. Output failures drop the event and carry on.
    fn dispatch_due(&mut self, current: u64) {
        for (target, event) in self.queue.drain_due(current) {
            if let Err(e) = self.sink.send(&event) {
                warn!("output send failed (target_pulse={target}): {e}");
            } else {
                debug!(?event, target, current, "emitted");
            }
        }
    }

    /// PLAY ends when the pulse count reaches the response's end pulse; the
    /// queue and bar buffer must both be empty afterwards.
    fn check_play_end(&mut self, current: u64) {
        if self.phase != Phase::Play {
            return;
        }
        let Some(end) = self.model_end_pulse else {
            return;
        };
        if current < end {
            return;
        }

        self.queue.clear();
        self.bars.clear();
        self.prev_bar_events.clear();
        self.model_end_pulse = None;
        self.phase = Phase::Collect;
        info!("[phase] PLAY -> COLLECT (pulse={current})");
    }
}

/// Capture loop: stamp incoming events with the current pulse and file them
/// into the bar buffer. Runs on its own thread; a closed input channel is
/// fatal to the bridge.
pub fn spawn_input_loop(
    rx: Receiver<Event>,
    clock: Arc<ClockState>,
    bars: Arc<BarBuffer>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("input loop started");
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => {
                    if !clock.is_running() {
                        debug!(?event, "transport stopped, dropping input");
                        continue;
                    }
                    let pulse = clock.pulse();
                    let had_anchor = bars.anchor().is_some();
                    bars.append(event, pulse);
                    if !had_anchor {
                        if let Some(anchor) = bars.anchor() {
                            info!("[anchor] set at pulse={anchor}");
                        }
                    }
                    debug!(?event, pulse, "captured");
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("MIDI input disconnected; shutting down");
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
        info!("input loop stopped");
    })
}
