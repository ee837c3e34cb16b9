//! Pipeline controller and the state shared between its two contexts.
//!
//! The receive context turns serial bytes into queued frames (see
//! [`FrameReceiver`]). The render context calls [`PipelineController::tick`]
//! from its main loop: one frame is read, parsed, routed, dimmed and written
//! per call.
//!
//! # Usage
//!
//! ```ignore
//! static PIPELINE: Pipeline<{ 16 * 1024 }> = Pipeline::new();
//!
//! let mut controller: PipelineController<'_, _, _, _, 8> =
//!     PipelineController::new(&PIPELINE, channels, PrintObserver, &PipelineConfig::default());
//!
//! controller.begin(Instant::now(), |mut receiver| {
//!     spawn_core1(move || receiver.run(&mut uart, &mut PrintObserver));
//! });
//!
//! loop {
//!     controller.tick(Instant::now());
//! }
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_time::{Duration, Instant};

use crate::channel::{Channel, ChannelTable};
use crate::ddp::{BYTES_PER_PIXEL, ID_BROADCAST, MAX_PAYLOAD_SIZE, Packet};
use crate::frame_decoder::MAX_FRAME_SIZE;
use crate::limiter::{BrightnessLimiter, LimiterConfig};
use crate::observer::{DropReason, Observer};
use crate::queue::{FrameQueue, ReadError};
use crate::receiver::FrameReceiver;
use crate::stats::{Statistics, StatsSnapshot};
use crate::{LedOutput, Rgb};

/// Default interval between statistics reports
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between receive rate reports
pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of individually reported frames and drops
pub const DEFAULT_LOG_LIMIT: u32 = 5;

/// Configuration for the pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub limiter: LimiterConfig,
    /// Interval between statistics reports from the render context
    pub stats_interval: Duration,
    /// Interval between receive rate reports
    pub rate_interval: Duration,
    /// Number of accepted frames reported one by one after start
    pub ack_limit: u32,
    /// Number of drops each context reports one by one after start
    pub drop_log_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::DEFAULT,
            stats_interval: DEFAULT_STATS_INTERVAL,
            rate_interval: DEFAULT_RATE_INTERVAL,
            ack_limit: DEFAULT_LOG_LIMIT,
            drop_log_limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
}

/// Outcome of one render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Stopped, or nothing queued
    Idle,
    /// Packet written; `pixels` counts writes across all target channels
    Processed { pixels: usize, pushed: bool },
    Dropped(DropReason),
}

/// State shared by the receive and render contexts.
///
/// Construct it once (in a `static` or on the stack of the startup code) and
/// give both contexts a reference.
pub struct Pipeline<const QUEUE: usize> {
    pub(crate) queue: FrameQueue<QUEUE>,
    pub(crate) stats: Statistics,
    running: AtomicBool,
    epoch: AtomicU32,
}

impl<const QUEUE: usize> Pipeline<QUEUE> {
    pub const fn new() -> Self {
        Self {
            queue: FrameQueue::new(),
            stats: Statistics::new(),
            running: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
        }
    }

    pub const fn queue(&self) -> &FrameQueue<QUEUE> {
        &self.queue
    }

    pub const fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Counters together with the current queue usage
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.usage_percent())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if the run started as `epoch` is still going
    pub(crate) fn is_active(&self, epoch: u32) -> bool {
        self.is_running() && self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Reset the queue and counters and start a new run
    fn start(&self) -> u32 {
        self.queue.clear();
        self.stats.reset();
        let epoch = self.epoch.load(Ordering::Relaxed).wrapping_add(1);
        self.epoch.store(epoch, Ordering::Release);
        self.running.store(true, Ordering::Release);
        epoch
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl<const QUEUE: usize> Default for Pipeline<QUEUE> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline controller - owns the render side of the pipeline
pub struct PipelineController<'a, O, Obs, const QUEUE: usize, const CHANNELS: usize> {
    // Shared state and configuration
    shared: &'a Pipeline<QUEUE>,
    config: PipelineConfig,
    state: PipelineState,

    // Render side
    channels: ChannelTable<O, CHANNELS>,
    limiter: BrightnessLimiter,
    observer: Obs,
    next_stats: Instant,

    // Buffers
    frame: [u8; MAX_FRAME_SIZE],
    scratch: [u8; MAX_PAYLOAD_SIZE],
}

impl<'a, O, Obs, const QUEUE: usize, const CHANNELS: usize>
    PipelineController<'a, O, Obs, QUEUE, CHANNELS>
where
    O: LedOutput,
    Obs: Observer,
{
    /// Create a stopped controller
    pub fn new(
        shared: &'a Pipeline<QUEUE>,
        channels: ChannelTable<O, CHANNELS>,
        observer: Obs,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            shared,
            config: *config,
            state: PipelineState::Stopped,
            channels,
            limiter: BrightnessLimiter::new(&config.limiter),
            observer,
            next_stats: Instant::from_millis(0),
            frame: [0; MAX_FRAME_SIZE],
            scratch: [0; MAX_PAYLOAD_SIZE],
        }
    }

    /// Start the pipeline.
    ///
    /// Clears the queue, resets the counters and hands the receive half to
    /// `launch`, which is expected to run it on the other core. Does nothing
    /// and returns `false` if already running.
    pub fn begin<F>(&mut self, now: Instant, launch: F) -> bool
    where
        F: FnOnce(FrameReceiver<'a, QUEUE>),
    {
        if self.state == PipelineState::Running {
            return false;
        }

        let epoch = self.shared.start();
        self.state = PipelineState::Running;
        self.next_stats = now + self.config.stats_interval;
        launch(FrameReceiver::new(self.shared, epoch, &self.config, now));

        true
    }

    /// Stop the pipeline. The receiver exits at its next loop iteration.
    pub fn end(&mut self) {
        self.shared.stop();
        self.state = PipelineState::Stopped;
    }

    /// Process at most one queued frame.
    ///
    /// This is the render loop step. Returns immediately when nothing is
    /// queued.
    pub fn tick(&mut self, now: Instant) -> TickResult {
        if self.state != PipelineState::Running || !self.shared.queue.has_data() {
            return TickResult::Idle;
        }

        let result = match self.shared.queue.read(&mut self.frame) {
            Ok(len) => self.process_frame(len),
            Err(ReadError::Empty) => return TickResult::Idle,
            Err(ReadError::Corrupted) => self.drop_frame(DropReason::QueueCorrupted, 0),
        };

        self.report_stats(now);
        result
    }

    pub const fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.snapshot()
    }

    pub const fn channels(&self) -> &ChannelTable<O, CHANNELS> {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelTable<O, CHANNELS> {
        &mut self.channels
    }

    pub const fn observer(&self) -> &Obs {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut Obs {
        &mut self.observer
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse, route and render the frame in `self.frame[..len]`
    fn process_frame(&mut self, len: usize) -> TickResult {
        let packet = match Packet::parse(&self.frame[..len]) {
            Ok(packet) => packet,
            Err(err) => return self.drop_frame(DropReason::Malformed(err), len),
        };

        match render_packet(&mut self.channels, &self.limiter, &mut self.scratch, &packet) {
            Ok(pixels) => {
                let processed = self.shared.stats.record_processed();
                self.observer.packet_processed(&packet, pixels, processed);
                TickResult::Processed {
                    pixels,
                    pushed: packet.push(),
                }
            }
            Err(reason) => self.drop_frame(reason, len),
        }
    }

    fn drop_frame(&mut self, reason: DropReason, len: usize) -> TickResult {
        let dropped = self.shared.stats.record_render_drop();
        if dropped <= self.config.drop_log_limit {
            self.observer
                .packet_dropped(reason, &self.frame[..len], dropped);
        }
        TickResult::Dropped(reason)
    }

    fn report_stats(&mut self, now: Instant) {
        if now < self.next_stats {
            return;
        }
        self.next_stats = now + self.config.stats_interval;
        let snapshot = self.shared.snapshot();
        self.observer.stats(&snapshot);
    }
}

/// Write `packet` to the channel(s) it addresses.
///
/// Broadcast packets go to every channel and succeed if any channel took
/// them. Returns the number of pixels written.
fn render_packet<O: LedOutput, const N: usize>(
    channels: &mut ChannelTable<O, N>,
    limiter: &BrightnessLimiter,
    scratch: &mut [u8],
    packet: &Packet<'_>,
) -> Result<usize, DropReason> {
    let destination = packet.destination();
    if destination != ID_BROADCAST {
        let channel = channels
            .get_mut(destination)
            .ok_or(DropReason::UnknownDestination(destination))?;
        return render_channel(channel, limiter, scratch, packet);
    }

    let mut written = None;
    let mut last_error = DropReason::UnknownDestination(ID_BROADCAST);
    for channel in channels.iter_mut() {
        match render_channel(channel, limiter, scratch, packet) {
            Ok(pixels) => written = Some(written.unwrap_or(0) + pixels),
            Err(reason) => last_error = reason,
        }
    }

    written.ok_or(last_error)
}

/// Clamp, dim and write `packet` to one channel, flushing if requested.
fn render_channel<O: LedOutput>(
    channel: &mut Channel<O>,
    limiter: &BrightnessLimiter,
    scratch: &mut [u8],
    packet: &Packet<'_>,
) -> Result<usize, DropReason> {
    let pixel_count = channel.pixel_count();
    let start = packet.start_pixel();
    let out_of_range = DropReason::StartOutOfRange { start, pixel_count };
    let start = usize::try_from(start).map_err(|_| out_of_range)?;
    if start >= pixel_count {
        return Err(out_of_range);
    }

    let count = packet.pixel_count().min(pixel_count - start);
    let bytes = count * BYTES_PER_PIXEL;

    // The frame stays untouched so a broadcast dims each channel from the
    // original data
    let pixels = &mut scratch[..bytes];
    pixels.copy_from_slice(&packet.payload[..bytes]);
    limiter.limit(pixels, pixel_count);

    let output = channel.output_mut();
    for (i, rgb) in pixels.chunks_exact(BYTES_PER_PIXEL).enumerate() {
        output.set_pixel(start + i, Rgb::new(rgb[0], rgb[1], rgb[2]));
    }
    if packet.push() {
        output.flush();
    }

    Ok(count)
}
