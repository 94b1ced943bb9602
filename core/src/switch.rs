use crate::{Error, IoVec, Port, Result};
use std::sync::Arc;

/// Ties two ports together with two unidirectional frame copiers.
///
/// Each direction runs independently: a clean EOF on the reading side
/// half-closes the opposite write side, so a FIN in one direction never tears
/// down the reverse flow. The switch never fully closes the ports; its caller
/// does, once both copiers have finished.
pub struct Switch {
    left: Arc<dyn Port>,
    right: Arc<dyn Port>,
}

impl Switch {
    pub fn new(left: Arc<dyn Port>, right: Arc<dyn Port>) -> Self {
        Self { left, right }
    }

    /// Runs both copiers to completion.
    pub async fn run(self) {
        let forward = tokio::spawn(copy_frames(self.left.clone(), self.right.clone()));
        let backward = tokio::spawn(copy_frames(self.right, self.left));

        for (direction, copier) in [("forward", forward), ("backward", backward)] {
            match copier.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(direction, "copier stopped: {e}"),
                Err(e) => tracing::warn!(direction, "copier panicked: {e}"),
            }
        }
    }
}

/// Moves messages from `input` to `output` until EOF or failure.
async fn copy_frames(input: Arc<dyn Port>, output: Arc<dyn Port>) -> Result<()> {
    loop {
        let mut buf = IoVec::new();

        match input.unpack(&mut buf).await {
            Ok(()) => {}
            Err(Error::EndOfStream) => {
                let _ = output.close_write();
                return Ok(());
            }
            Err(e) => {
                let _ = input.close_read();
                return Err(e);
            }
        }

        if let Err(e) = output.pack(&mut buf).await {
            let _ = input.close_read();
            return Err(e);
        }
    }
}
