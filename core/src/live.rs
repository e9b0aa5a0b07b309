//! Streaming decode of captured audio
//!
//! [`LiveDecoder`] is the message-passing core: blocks go in through
//! [`LiveDecoder::consume`], detected symbols come out. It runs the same
//! window analysis and segmentation as the batch decoder over a rolling
//! buffer that never grows beyond one window.
//!
//! [`CaptureLoop`] wires a [`CaptureSource`] to a live decoder through a
//! bounded queue. Sources push blocks from their own thread; a full queue
//! refuses the block and counts an overrun instead of blocking the producer.

use crate::decoder::{DecodeResult, DecoderConfig, DetectedSymbol, Segmenter, WindowAnalyzer};
use crate::error::{Result, ToneWarpError};
use crate::symbols::SymbolTable;
use crate::waveform::Waveform;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the capture loop does after blocks were dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Discard the rolling buffer and pending run, keep decoding
    #[default]
    Resync,
    /// End the loop with [`LoopExit::Overrun`]
    Stop,
}

/// Capture loop parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    /// Blocks the queue holds before refusing new ones
    pub queue_capacity: usize,
    /// Samples per block for sources that choose their own block size
    pub block_size: usize,
    /// How long the loop waits for a block before re-checking the stop flag
    pub poll_interval_ms: u64,
    pub overrun_policy: OverrunPolicy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            block_size: 1024,
            poll_interval_ms: 50,
            overrun_policy: OverrunPolicy::Resync,
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ToneWarpError::InvalidConfig("queue capacity must be at least 1".into()));
        }
        if self.block_size == 0 {
            return Err(ToneWarpError::InvalidConfig("block size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ToneWarpError::InvalidConfig("poll interval must be positive".into()));
        }
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Incremental decoder over an unbounded sample stream
pub struct LiveDecoder {
    analyzer: WindowAnalyzer,
    segmenter: Segmenter,
    hop: usize,
    /// Samples not yet covered by a complete window, fewer than one window long
    buffer: Vec<f32>,
    /// Absolute stream position of `buffer[0]`
    buffer_start: usize,
    result: DecodeResult,
    stopped: bool,
}

impl LiveDecoder {
    pub fn new(config: &DecoderConfig, sample_rate: u32) -> Result<Self> {
        Self::with_table(config, SymbolTable::standard(), sample_rate)
    }

    pub fn with_table(config: &DecoderConfig, table: &'static SymbolTable, sample_rate: u32) -> Result<Self> {
        let analyzer = WindowAnalyzer::new(config, table, sample_rate)?;
        let window = analyzer.window_len();
        Ok(Self {
            analyzer,
            segmenter: Segmenter::new(config),
            hop: config.hop_samples(sample_rate),
            buffer: Vec::with_capacity(window * 2),
            buffer_start: 0,
            result: DecodeResult::default(),
            stopped: false,
        })
    }

    /// Feed one block; returns the symbols completed by it
    pub fn consume(&mut self, block: &[f32]) -> Result<Vec<DetectedSymbol>> {
        if self.stopped {
            return Err(ToneWarpError::CaptureStopped);
        }
        let emitted_before = self.result.symbols.len();
        let window = self.analyzer.window_len();
        self.buffer.extend_from_slice(block);

        let mut pos = 0;
        while self.buffer.len() - pos >= window {
            let verdict = self.analyzer.analyze(&self.buffer[pos..pos + window])?;
            self.result.record(&verdict);
            self.segmenter
                .push(self.buffer_start + pos, &verdict, &mut self.result.symbols);
            pos += self.hop;
        }
        self.buffer.drain(..pos);
        self.buffer_start += pos;

        Ok(self.result.symbols[emitted_before..].to_vec())
    }

    /// Flush the trailing window and pending run, then refuse further input
    pub fn stop(&mut self) -> Result<Vec<DetectedSymbol>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        let emitted_before = self.result.symbols.len();
        let window = self.analyzer.window_len();
        if !self.buffer.is_empty() && self.buffer.len() * 2 >= window {
            let verdict = self.analyzer.analyze(&self.buffer)?;
            self.result.record(&verdict);
            self.segmenter
                .push(self.buffer_start, &verdict, &mut self.result.symbols);
        }
        self.segmenter.finish(&mut self.result.symbols);
        self.buffer_start += self.buffer.len();
        self.buffer.clear();
        self.stopped = true;
        Ok(self.result.symbols[emitted_before..].to_vec())
    }

    /// Drop buffered samples and the pending run after a gap in the stream.
    /// Symbols already emitted are kept.
    pub fn reset_stream(&mut self) {
        self.buffer_start += self.buffer.len();
        self.buffer.clear();
        self.segmenter.reset();
    }

    pub fn result(&self) -> &DecodeResult {
        &self.result
    }

    pub fn into_result(self) -> DecodeResult {
        self.result
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Samples held back waiting for a complete window
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total samples accepted so far
    pub fn position(&self) -> usize {
        self.buffer_start + self.buffer.len()
    }
}

/// Cooperative cancellation flag shared with the capture loop
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Samples queued by a source, tagged with the blocks dropped just before them
struct Block {
    samples: Vec<f32>,
    dropped_before: usize,
}

/// Producer end of the capture queue
#[derive(Clone)]
pub struct BlockSink {
    tx: Sender<Block>,
    overruns: Arc<AtomicUsize>,
    /// Drops not yet attached to a queued block
    pending_gap: Arc<AtomicUsize>,
    capacity: usize,
}

impl BlockSink {
    fn new(tx: Sender<Block>, capacity: usize) -> Self {
        Self {
            tx,
            overruns: Arc::new(AtomicUsize::new(0)),
            pending_gap: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Queue a block without blocking. A full queue drops the block and
    /// counts an overrun; the gap is marked on the next block that fits.
    pub fn push(&self, block: Vec<f32>) -> Result<()> {
        match self.tx.try_send(self.tag(block)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(block)) => {
                self.untag(block);
                self.pending_gap.fetch_add(1, Ordering::SeqCst);
                self.overruns.fetch_add(1, Ordering::Relaxed);
                warn!("Capture queue full ({} blocks), block dropped", self.capacity);
                Err(ToneWarpError::CaptureOverrun {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(block)) => {
                self.untag(block);
                Err(ToneWarpError::CaptureStopped)
            }
        }
    }

    /// Wait up to `timeout` for queue space. On timeout the block is handed
    /// back and no overrun is counted.
    pub fn push_within(&self, block: Vec<f32>, timeout: Duration) -> Result<Option<Vec<f32>>> {
        match self.tx.send_timeout(self.tag(block), timeout) {
            Ok(()) => Ok(None),
            Err(SendTimeoutError::Timeout(block)) => Ok(Some(self.untag(block))),
            Err(SendTimeoutError::Disconnected(block)) => {
                self.untag(block);
                Err(ToneWarpError::CaptureStopped)
            }
        }
    }

    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn tag(&self, samples: Vec<f32>) -> Block {
        Block {
            samples,
            dropped_before: self.pending_gap.swap(0, Ordering::SeqCst),
        }
    }

    /// Put a refused block's gap back for the next attempt
    fn untag(&self, block: Block) -> Vec<f32> {
        if block.dropped_before > 0 {
            self.pending_gap.fetch_add(block.dropped_before, Ordering::SeqCst);
        }
        block.samples
    }
}

/// A device or stream that delivers mono blocks to a [`BlockSink`]
///
/// The source ends the stream by dropping every clone of the sink.
pub trait CaptureSource {
    fn sample_rate(&self) -> u32;

    /// Begin delivering blocks, typically from a worker thread
    fn start(&mut self, sink: BlockSink) -> Result<()>;

    /// Stop delivering and release the sink. Must be idempotent.
    fn stop(&mut self);
}

/// Stops the source on every exit path of the capture loop
struct SourceGuard<'a, S: CaptureSource + ?Sized>(&'a mut S);

impl<S: CaptureSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Notification passed to the capture loop callback
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Symbol(DetectedSymbol),
    Overrun { dropped_blocks: usize },
}

/// Why the capture loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    SourceEnded,
    Overrun,
}

/// Outcome of a capture session
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSummary {
    pub result: DecodeResult,
    pub exit: LoopExit,
    pub blocks: usize,
    pub samples: usize,
    pub overruns: usize,
}

impl LiveSummary {
    pub fn text(&self) -> String {
        self.result.text()
    }
}

/// Drives a capture source through a live decoder
pub struct CaptureLoop {
    decoder: DecoderConfig,
    live: LiveConfig,
    table: &'static SymbolTable,
}

impl CaptureLoop {
    pub fn new(decoder: DecoderConfig, live: LiveConfig) -> Result<Self> {
        Self::with_table(decoder, live, SymbolTable::standard())
    }

    pub fn with_table(decoder: DecoderConfig, live: LiveConfig, table: &'static SymbolTable) -> Result<Self> {
        decoder.validate(table)?;
        live.validate()?;
        Ok(Self { decoder, live, table })
    }

    /// Run until the source ends, `stop` is raised, or an overrun ends the
    /// session under [`OverrunPolicy::Stop`]. The pending run is flushed on
    /// every clean exit.
    ///
    /// Overruns are applied in stream order: blocks queued ahead of a drop
    /// are decoded first, then the policy runs before the first block after it.
    pub fn run<S, F>(&self, source: &mut S, stop: &StopHandle, mut on_event: F) -> Result<LiveSummary>
    where
        S: CaptureSource + ?Sized,
        F: FnMut(LiveEvent),
    {
        let mut decoder = LiveDecoder::with_table(&self.decoder, self.table, source.sample_rate())?;
        let (tx, rx): (Sender<Block>, Receiver<Block>) = bounded(self.live.queue_capacity);
        let sink = BlockSink::new(tx, self.live.queue_capacity);
        let overruns = sink.overruns.clone();
        let trailing_gap = sink.pending_gap.clone();

        let guard = SourceGuard(source);
        guard.0.start(sink)?;
        info!(
            "Capture started at {} Hz, queue {} blocks",
            guard.0.sample_rate(),
            self.live.queue_capacity
        );

        let mut blocks = 0;
        let mut samples = 0;
        let exit = loop {
            if stop.is_stopped() {
                break LoopExit::Cancelled;
            }

            match rx.recv_timeout(self.live.poll_interval()) {
                Ok(block) => {
                    if block.dropped_before > 0
                        && !self.handle_gap(block.dropped_before, &mut decoder, &mut on_event)
                    {
                        break LoopExit::Overrun;
                    }
                    blocks += 1;
                    samples += block.samples.len();
                    for symbol in decoder.consume(&block.samples)? {
                        on_event(LiveEvent::Symbol(symbol));
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // Drops after the last queued block have no block to ride on
                    let dropped = trailing_gap.swap(0, Ordering::SeqCst);
                    if dropped > 0 && !self.handle_gap(dropped, &mut decoder, &mut on_event) {
                        break LoopExit::Overrun;
                    }
                    break LoopExit::SourceEnded;
                }
            }
        };
        drop(guard);

        for symbol in decoder.stop()? {
            on_event(LiveEvent::Symbol(symbol));
        }
        let result = decoder.into_result();
        let overruns = overruns.load(Ordering::Relaxed);
        info!(
            "Capture ended ({:?}): {} blocks, {} symbols, {} overruns",
            exit,
            blocks,
            result.symbols.len(),
            overruns
        );
        Ok(LiveSummary {
            result,
            exit,
            blocks,
            samples,
            overruns,
        })
    }

    /// Apply the overrun policy at the point in the stream where blocks went
    /// missing. Returns false when the session must end.
    fn handle_gap<F>(&self, dropped: usize, decoder: &mut LiveDecoder, on_event: &mut F) -> bool
    where
        F: FnMut(LiveEvent),
    {
        on_event(LiveEvent::Overrun { dropped_blocks: dropped });
        match self.live.overrun_policy {
            OverrunPolicy::Resync => {
                warn!(
                    "Dropped {} blocks before sample {}, resynchronising",
                    dropped,
                    decoder.position()
                );
                decoder.reset_stream();
                true
            }
            OverrunPolicy::Stop => {
                warn!("Dropped {} blocks, stopping capture", dropped);
                false
            }
        }
    }
}

/// How a [`ReplaySource`] delivers its blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// One block per block duration; a full queue drops blocks like a device would
    RealTime,
    /// As fast as the consumer keeps up, never dropping
    Lossless,
}

/// Streams a recorded waveform as if it were a capture device
pub struct ReplaySource {
    samples: Arc<[f32]>,
    sample_rate: u32,
    block_size: usize,
    pacing: Pacing,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(waveform: &Waveform, block_size: usize, pacing: Pacing) -> Self {
        Self {
            samples: Arc::from(waveform.samples()),
            sample_rate: waveform.sample_rate(),
            block_size: block_size.max(1),
            pacing,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl CaptureSource for ReplaySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: BlockSink) -> Result<()> {
        if self.handle.is_some() {
            return Err(ToneWarpError::Capture("replay already started".into()));
        }
        let samples = self.samples.clone();
        let running = self.running.clone();
        let block_size = self.block_size;
        let pacing = self.pacing;
        let block_duration = Duration::from_secs_f64(block_size as f64 / self.sample_rate.max(1) as f64);

        running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("replay-source".into())
            .spawn(move || {
                for chunk in samples.chunks(block_size) {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    let delivered = match pacing {
                        Pacing::RealTime => {
                            let sent = sink.push(chunk.to_vec());
                            thread::sleep(block_duration);
                            !matches!(sent, Err(ToneWarpError::CaptureStopped))
                        }
                        Pacing::Lossless => deliver_lossless(&sink, chunk, &running),
                    };
                    if !delivered {
                        break;
                    }
                }
                running.store(false, Ordering::SeqCst);
                debug!("Replay finished");
            })
            .map_err(|e| ToneWarpError::Capture(e.to_string()))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Retry until the block is queued; false once the stream is stopped
fn deliver_lossless(sink: &BlockSink, chunk: &[f32], running: &AtomicBool) -> bool {
    let mut block = chunk.to_vec();
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        match sink.push_within(block, Duration::from_millis(20)) {
            Ok(None) => return true,
            Ok(Some(returned)) => block = returned,
            Err(_) => return false,
        }
    }
}
