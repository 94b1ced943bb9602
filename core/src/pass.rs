use crate::{IoVec, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// One reversible in-place transform over an [`IoVec`].
///
/// Passes execute synchronously and must not suspend; compound effects are
/// built by composing passes in a [`PassManager`]. A pass is either stateless
/// or internally synchronized, because pipelines are long-lived and reused
/// across frames.
pub trait Pass: Send + Sync {
    fn run(&self, buf: &mut IoVec) -> Result<()>;
}

impl<P: Pass + ?Sized> Pass for Arc<P> {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        (**self).run(buf)
    }
}

/// A pass whose state requires exclusive access per invocation.
///
/// Wrap it in a [`SyncPass`] to share one instance between senders.
pub trait StatefulPass: Send {
    fn run(&mut self, buf: &mut IoVec) -> Result<()>;
}

/// Serializes a [`StatefulPass`] behind a mutex so a single instance can be
/// fed from multiple sessions.
pub struct SyncPass<P> {
    inner: Mutex<P>,
}

impl<P: StatefulPass> SyncPass<P> {
    pub fn new(pass: P) -> Self {
        Self {
            inner: Mutex::new(pass),
        }
    }
}

impl<P: StatefulPass> Pass for SyncPass<P> {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        self.inner.lock().run(buf)
    }
}

/// An ordered sequence of passes, executed front to back.
///
/// The first failure aborts the run and is propagated unchanged.
#[derive(Default, Clone)]
pub struct PassManager {
    passes: Vec<Arc<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Arc::new(pass));
        self
    }

    pub fn add_shared(mut self, pass: Arc<dyn Pass>) -> Self {
        self.passes.push(pass);
        self
    }
}

impl Pass for PassManager {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        for pass in &self.passes {
            pass.run(buf)?;
        }

        Ok(())
    }
}

/// Builds the two pipelines of a paired transform.
///
/// Pack-side passes run in insertion order; the unpack side runs the paired
/// inverses in reverse, so the composition undoes itself as long as each
/// registered pair does. This is the only place where the order inversion
/// happens.
#[derive(Default)]
pub struct PairedPassBuilder {
    pack: Vec<Arc<dyn Pass>>,
    unpack: Vec<Arc<dyn Pass>>,
}

impl PairedPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pack` together with the `unpack` pass that undoes it.
    pub fn add_paired(mut self, pack: impl Pass + 'static, unpack: impl Pass + 'static) -> Self {
        self.pack.push(Arc::new(pack));
        self.unpack.push(Arc::new(unpack));
        self
    }

    /// Returns `(pack, unpack)` pipelines; the unpack list is reversed.
    pub fn build(self) -> (PassManager, PassManager) {
        let pack = PassManager { passes: self.pack };
        let unpack = PassManager {
            passes: self.unpack.into_iter().rev().collect(),
        };

        (pack, unpack)
    }
}
