//! Coarse progress reporting for long parses.
//!
//! The parser calls [`Progress::advance`] after every object it consumes. Events reach the
//! observer only when the fraction has moved by at least the configured step, and never go
//! backwards. With no observer attached, nothing is computed beyond a comparison.

use log::trace;

/// Receives the fraction of the input consumed so far, in `[0, 1]`.
pub trait ProgressObserver {
    fn progress(&mut self, fraction: f32);
}

impl<F: FnMut(f32)> ProgressObserver for F {
    fn progress(&mut self, fraction: f32) {
        self(fraction)
    }
}

/// Maps positions inside an inflated stream back onto the compressed span it came from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StreamSpan {
    /// Absolute offset of the compressed data in the input.
    pub start: usize,
    /// Length of the compressed data in the input.
    pub size: usize,
    /// Length of the inflated stream.
    pub inflated: usize,
}

impl StreamSpan {
    fn map(&self, pos: usize) -> usize {
        if self.inflated == 0 {
            return self.start + self.size;
        }
        let scaled = (self.size as u64 * pos.min(self.inflated) as u64) / self.inflated as u64;
        self.start + scaled as usize
    }
}

pub(crate) struct Progress<'o> {
    observer: Option<&'o mut dyn ProgressObserver>,
    total: usize,
    step: f32,
    last: f32,
}

impl<'o> Progress<'o> {
    pub fn new(observer: Option<&'o mut dyn ProgressObserver>, total: usize, step: f32) -> Self {
        Self {
            observer,
            total,
            step: step.max(0.0),
            last: 0.0,
        }
    }

    /// Report an absolute position in the input. `span` is set while parsing an inflated stream.
    pub fn advance(&mut self, pos: usize, span: Option<&StreamSpan>) {
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        if self.total == 0 {
            return;
        }
        let pos = match span {
            Some(span) => span.map(pos),
            None => pos,
        };
        let fraction = (pos as f32 / self.total as f32).clamp(0.0, 1.0);
        if fraction - self.last >= self.step && fraction > self.last {
            trace!("Parsing in progress: {:.1}%", fraction * 100.0);
            self.last = fraction;
            observer.progress(fraction);
        }
    }

    /// Report completion, if it hasn't been reported already.
    pub fn finish(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            if self.last < 1.0 {
                self.last = 1.0;
                observer.progress(1.0);
            }
        }
    }
}
