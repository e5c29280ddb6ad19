use crate::error::SinkError;
use crate::render::canvas::Frame;

/// Consumer of rendered frames, in strictly increasing index order.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flush and close the output once every frame has been written.
    fn finish(self: Box<Self>) -> Result<(), SinkError>;

    /// Tear down after a fatal error, removing partial output.
    fn abort(self: Box<Self>);
}

/// Tracks the next index a sink will accept.
#[derive(Debug, Default)]
pub struct FrameOrder {
    next: usize,
}

impl FrameOrder {
    pub fn accept(&mut self, index: usize) -> Result<(), SinkError> {
        if index != self.next {
            return Err(SinkError::OutOfOrder {
                expected: self.next,
                got: index,
            });
        }
        self.next += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.next
    }
}

/// Digits used when naming frame files: at least 5, more for long renders.
pub fn index_width(total_frames: usize) -> usize {
    total_frames.saturating_sub(1).to_string().len().max(5)
}
