use std::sync::Arc;

use crate::{
    command_pool::{CommandAllocatorPool, CommandPoolConfig},
    descriptor::{DescriptorHeapManager, HeapConfig},
    device::PoolDevice,
    frame::FramePacer,
    pipeline::{BindingLayoutCompiler, LayoutLimits, PipelineCacheConfig, PipelineObjectCache},
    Result, TimelineValue,
};

#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    pub heap: HeapConfig,
    pub command_pool: CommandPoolConfig,
    pub layout_limits: LayoutLimits,
    pub pipeline_cache: PipelineCacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// `frame_index` is open for recording.
    Ready {
        frame_index: u32,
        completed: TimelineValue,
    },
    /// The next slot's previous frame is still executing. Nothing was changed.
    Busy {
        frame_index: u32,
        waiting_on: TimelineValue,
        completed: TimelineValue,
    },
}

/// Per-device owner of the pooling subsystem.
///
/// Holds the descriptor heaps, command block pool, pipeline cache and layout compiler
/// for one device and drives their shared per-frame lifecycle.
pub struct PoolSession<D: PoolDevice> {
    device: Arc<D>,
    heaps: DescriptorHeapManager,
    commands: CommandAllocatorPool<D>,
    pipelines: PipelineObjectCache<D>,
    compiler: BindingLayoutCompiler,
    pacer: FramePacer,
    /// Whether `end_frame` has been called for the current slot.
    frame_ended: bool,
}

impl<D: PoolDevice> PoolSession<D> {
    pub fn new(device: Arc<D>, config: PoolConfig) -> Result<Self> {
        let heaps = DescriptorHeapManager::new(config.heap)?;
        let pacer = FramePacer::new(heaps.frames_in_flight());
        tracing::info!(
            frames_in_flight = heaps.frames_in_flight(),
            pipeline_library = ?config.pipeline_cache.path,
            "pool session created"
        );
        Ok(Self {
            commands: CommandAllocatorPool::new(device.clone(), config.command_pool),
            pipelines: PipelineObjectCache::new(device.clone(), config.pipeline_cache),
            compiler: BindingLayoutCompiler::new(config.layout_limits),
            heaps,
            pacer,
            device,
            frame_ended: false,
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
    pub fn heaps(&self) -> &DescriptorHeapManager {
        &self.heaps
    }
    pub fn commands(&self) -> &CommandAllocatorPool<D> {
        &self.commands
    }
    pub fn pipelines(&self) -> &PipelineObjectCache<D> {
        &self.pipelines
    }
    pub fn compiler(&self) -> &BindingLayoutCompiler {
        &self.compiler
    }
    pub fn frame_index(&self) -> u32 {
        self.heaps.frame_index()
    }

    /// Polls the device timeline, reclaims completed command blocks and, if the previous
    /// frame was ended and the next slot is free, opens the next frame.
    ///
    /// Never blocks. On [`FrameStatus::Busy`] the caller may retry later or wait on the device.
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        let completed = self.device.completed_value()?;
        self.commands.tick(completed);
        if !self.frame_ended {
            return Ok(FrameStatus::Ready {
                frame_index: self.heaps.frame_index(),
                completed,
            });
        }
        let next = self.pacer.next_index(self.heaps.frame_index());
        if let Some(waiting_on) = self.pacer.pending(next, completed) {
            tracing::trace!(?waiting_on, ?completed, "next frame slot still in flight");
            return Ok(FrameStatus::Busy {
                frame_index: self.heaps.frame_index(),
                waiting_on,
                completed,
            });
        }
        let frame_index = self.heaps.advance_frame();
        self.pacer.clear(frame_index);
        self.frame_ended = false;
        Ok(FrameStatus::Ready {
            frame_index,
            completed,
        })
    }

    /// Marks the current frame as submitted. `signal` is the timeline value its last
    /// submission signals.
    pub fn end_frame(&mut self, signal: TimelineValue) {
        if self.frame_ended {
            tracing::warn!(frame_index = self.heaps.frame_index(), "end_frame called twice for one frame");
        }
        self.pacer.record(self.heaps.frame_index(), signal);
        self.frame_ended = true;
    }

    /// Blocks until the device is idle, then reclaims everything. Shutdown and resize only.
    pub fn wait_idle(&self) -> Result<TimelineValue> {
        self.device.wait_idle()?;
        let completed = self.device.completed_value()?;
        self.commands.tick(completed);
        Ok(completed)
    }

    /// Drains the device and persists the pipeline library.
    pub fn shutdown(&self) -> Result<()> {
        self.wait_idle()?;
        self.pipelines.save_to_disk();
        tracing::info!("pool session shut down");
        Ok(())
    }
}
