//! Receive context: serial bytes to queued frames.

use embassy_time::{Duration, Instant};

use crate::ByteSource;
use crate::frame_decoder::{FrameDecoder, MAX_FRAME_SIZE};
use crate::observer::Observer;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Bytes pulled from the source per read call
const READ_CHUNK: usize = 64;

/// Receive half of the pipeline.
///
/// Handed out by [`PipelineController::begin`](crate::PipelineController::begin)
/// and meant to be moved onto the second core. It stops on its own once the
/// controller ends the run it was created for.
pub struct FrameReceiver<'a, const QUEUE: usize> {
    shared: &'a Pipeline<QUEUE>,
    epoch: u32,
    decoder: FrameDecoder<MAX_FRAME_SIZE>,
    ack_limit: u32,
    drop_log_limit: u32,
    rate_interval: Duration,
    last_report: Instant,
    last_count: u32,
}

impl<'a, const QUEUE: usize> FrameReceiver<'a, QUEUE> {
    pub(crate) fn new(
        shared: &'a Pipeline<QUEUE>,
        epoch: u32,
        config: &PipelineConfig,
        now: Instant,
    ) -> Self {
        Self {
            shared,
            epoch,
            decoder: FrameDecoder::new(),
            ack_limit: config.ack_limit,
            drop_log_limit: config.drop_log_limit,
            rate_interval: config.rate_interval,
            last_report: now,
            last_count: 0,
        }
    }

    /// Check if the run this receiver belongs to is still active
    pub fn is_active(&self) -> bool {
        self.shared.is_active(self.epoch)
    }

    /// Drain every byte `source` has available right now.
    ///
    /// Completed frames are queued; a full queue drops the frame. Only the
    /// first `drop_log_limit` drops of a run are reported. Returns the number
    /// of frames queued.
    pub fn poll<S, O>(&mut self, source: &mut S, observer: &mut O, now: Instant) -> usize
    where
        S: ByteSource + ?Sized,
        O: Observer + ?Sized,
    {
        let mut chunk = [0; READ_CHUNK];
        let mut accepted = 0;

        loop {
            let read = source.read(&mut chunk);
            if read == 0 {
                break;
            }
            for &byte in &chunk[..read] {
                if self.decoder.process_byte(byte) && self.enqueue(observer) {
                    accepted += 1;
                }
            }
        }

        self.report_rate(observer, now);
        accepted
    }

    /// Poll `source` until the pipeline is stopped.
    pub fn run<S, O>(&mut self, source: &mut S, observer: &mut O)
    where
        S: ByteSource + ?Sized,
        O: Observer + ?Sized,
    {
        while self.is_active() {
            self.poll(source, observer, Instant::now());
            core::hint::spin_loop();
        }
    }

    /// Copy the decoded frame into the queue
    fn enqueue<O: Observer + ?Sized>(&self, observer: &mut O) -> bool {
        let frame = self.decoder.frame();
        let stats = &self.shared.stats;

        if self.shared.queue.write(frame).is_ok() {
            let received = stats.record_received();
            if received <= self.ack_limit {
                observer.frame_accepted(frame.len(), received);
            }
            true
        } else {
            let dropped = stats.record_receive_drop();
            if dropped <= self.drop_log_limit {
                observer.frame_dropped(frame.len(), dropped);
            }
            false
        }
    }

    /// Report how many frames arrived since the last report
    fn report_rate<O: Observer + ?Sized>(&mut self, observer: &mut O, now: Instant) {
        if now < self.last_report + self.rate_interval {
            return;
        }

        let received = self.shared.stats.received();
        if received > self.last_count {
            observer.receive_rate(received - self.last_count, now - self.last_report);
            self.last_report = now;
            self.last_count = received;
        }
    }
}
