//! One-shot command execution for uploads and setup work.
//!
//! # Overview
//!
//! [`UploadContext`] owns a fence and one transient command pool per queue
//! kind. It never shares objects with the frame ring, so uploads can run
//! before the first frame or between frames without waiting on a frame slot.
//!
//! Work is described by a [`CommandRecorder`]. Closures implement it, so the
//! common case stays short:
//!
//! ```no_run
//! use renderer_rhi::device::QueueKind;
//! use renderer_rhi::upload::UploadContext;
//! use renderer_rhi::vk;
//!
//! # fn example(upload: &UploadContext, src: vk::Buffer, dst: vk::Buffer) -> renderer_rhi::RhiResult<()> {
//! upload.immediate_submit(QueueKind::Transfer, &|cmd: &renderer_rhi::command::CommandBuffer| {
//!     cmd.copy_buffer(src, dst, 1024);
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::{Device, QueueKind};
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// Records commands into a command buffer handed to it.
pub trait CommandRecorder<C = CommandBuffer> {
    /// Record commands. `cmd` is already in the recording state.
    fn record(&self, cmd: &C);
}

impl<C, F: Fn(&C)> CommandRecorder<C> for F {
    fn record(&self, cmd: &C) {
        self(cmd)
    }
}

struct QueueLane {
    pool: CommandPool,
    cmd: CommandBuffer,
}

impl QueueLane {
    fn new(device: &Arc<Device>, kind: QueueKind) -> RhiResult<Self> {
        let pool = CommandPool::new_transient(device.clone(), device.queue_family(kind))?;
        let cmd = CommandBuffer::new(device.clone(), &pool)?;
        Ok(Self { pool, cmd })
    }
}

/// Synchronous command submission outside the frame ring.
pub struct UploadContext {
    device: Arc<Device>,
    fence: Fence,
    graphics: QueueLane,
    transfer: QueueLane,
    submit_lock: Mutex<()>,
}

impl UploadContext {
    /// Creates the upload fence and pools.
    ///
    /// # Errors
    ///
    /// Returns an error if any object cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let fence = Fence::new(device.clone(), false)?;
        let graphics = QueueLane::new(&device, QueueKind::Graphics)?;
        let transfer = QueueLane::new(&device, QueueKind::Transfer)?;

        debug!(
            "Upload context created (transfer family {})",
            device.queue_family(QueueKind::Transfer)
        );

        Ok(Self {
            device,
            fence,
            graphics,
            transfer,
            submit_lock: Mutex::new(()),
        })
    }

    /// Records `recorder` into a fresh command buffer, submits it to the
    /// queue of `kind` and blocks until it completes.
    ///
    /// Layout transitions into shader stages must use
    /// [`QueueKind::Graphics`]; a dedicated transfer family cannot execute
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if recording, submission or the fence wait fails.
    pub fn immediate_submit(&self, kind: QueueKind, recorder: &dyn CommandRecorder) -> RhiResult<()> {
        let _guard = self
            .submit_lock
            .lock()
            .map_err(|_| RhiError::InvalidHandle("upload context mutex poisoned".into()))?;

        let lane = match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Transfer => &self.transfer,
        };

        lane.pool.reset()?;
        lane.cmd.begin()?;
        recorder.record(&lane.cmd);
        lane.cmd.end()?;

        let command_buffers = [lane.cmd.handle()];
        let submit_info = ash::vk::SubmitInfo::default().command_buffers(&command_buffers);

        // SAFETY: the command buffer was just recorded and the fence is
        // unsignaled; it is reset again below before the next use.
        unsafe {
            self.device.submit(kind, &[submit_info], self.fence.handle())?;
        }
        self.fence.wait(u64::MAX)?;
        self.fence.reset()?;

        debug!("Immediate submit on {:?} queue completed", kind);
        Ok(())
    }
}
