//! GPU timestamp and pipeline-statistics queries.
//!
//! Each frame slot owns one [`QueryPools`]. The pools are reset at the start
//! of the slot's command buffer and read back after the slot's fence has
//! signaled, so a read never waits on the GPU.
//!
//! Devices without timestamp support or the `pipelineStatisticsQuery`
//! feature get pools that silently record nothing.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;

/// Timestamps available per frame.
pub const TIMESTAMP_QUERY_COUNT: u32 = 32;

/// Counters read by the statistics query, in result order.
pub const STATISTICS_FLAGS: vk::QueryPipelineStatisticFlags = vk::QueryPipelineStatisticFlags::from_raw(
    vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES.as_raw()
        | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS.as_raw(),
);

/// Pipeline statistics of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatistics {
    pub input_assembly_vertices: u64,
    pub vertex_shader_invocations: u64,
    pub fragment_shader_invocations: u64,
}

impl From<[u64; 3]> for PipelineStatistics {
    fn from(counters: [u64; 3]) -> Self {
        Self {
            input_assembly_vertices: counters[0],
            vertex_shader_invocations: counters[1],
            fragment_shader_invocations: counters[2],
        }
    }
}

/// Converts raw timestamps into milliseconds elapsed since the first one.
pub fn timestamps_to_ms(ticks: &[u64], period_ns: f32) -> Vec<f64> {
    let Some(&first) = ticks.first() else {
        return Vec::new();
    };
    ticks
        .iter()
        .map(|&t| t.saturating_sub(first) as f64 * f64::from(period_ns) / 1_000_000.0)
        .collect()
}

/// Per-slot query pools.
pub struct QueryPools {
    device: Arc<Device>,
    timestamps: Option<vk::QueryPool>,
    statistics: Option<vk::QueryPool>,
    timestamp_period: f32,
    written: u32,
    statistics_recorded: bool,
}

impl QueryPools {
    /// Creates whichever pools the device supports.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let mut pools = Self {
            timestamps: None,
            statistics: None,
            timestamp_period: device.limits().timestamp_period,
            written: 0,
            statistics_recorded: false,
            device,
        };

        if pools.device.timestamps_supported() {
            let info = vk::QueryPoolCreateInfo::default()
                .query_type(vk::QueryType::TIMESTAMP)
                .query_count(TIMESTAMP_QUERY_COUNT);
            pools.timestamps = Some(unsafe { pools.device.handle().create_query_pool(&info, None)? });
        }

        if pools.device.pipeline_statistics_enabled() {
            let info = vk::QueryPoolCreateInfo::default()
                .query_type(vk::QueryType::PIPELINE_STATISTICS)
                .query_count(1)
                .pipeline_statistics(STATISTICS_FLAGS);
            pools.statistics = Some(unsafe { pools.device.handle().create_query_pool(&info, None)? });
        }

        debug!(
            "Created query pools (timestamps: {}, statistics: {})",
            pools.timestamps.is_some(),
            pools.statistics.is_some()
        );
        Ok(pools)
    }

    /// Resets both pools. Must be recorded outside a render pass.
    pub fn reset(&mut self, cmd: &CommandBuffer) {
        if let Some(pool) = self.timestamps {
            cmd.reset_query_pool(pool, 0, TIMESTAMP_QUERY_COUNT);
        }
        if let Some(pool) = self.statistics {
            cmd.reset_query_pool(pool, 0, 1);
        }
        self.written = 0;
        self.statistics_recorded = false;
    }

    /// Writes the next timestamp after `stage` and returns its index.
    ///
    /// Returns `None` when timestamps are unsupported or all
    /// [`TIMESTAMP_QUERY_COUNT`] have been used this frame.
    pub fn write_timestamp(
        &mut self,
        cmd: &CommandBuffer,
        stage: vk::PipelineStageFlags,
    ) -> Option<u32> {
        let pool = self.timestamps?;
        if self.written >= TIMESTAMP_QUERY_COUNT {
            warn!("Timestamp query budget exhausted for this frame");
            return None;
        }
        let index = self.written;
        cmd.write_timestamp(stage, pool, index);
        self.written += 1;
        Some(index)
    }

    /// Starts counting pipeline statistics.
    pub fn begin_statistics(&mut self, cmd: &CommandBuffer) {
        if let Some(pool) = self.statistics {
            cmd.begin_query(pool, 0);
            self.statistics_recorded = true;
        }
    }

    /// Stops counting pipeline statistics.
    pub fn end_statistics(&self, cmd: &CommandBuffer) {
        if let (Some(pool), true) = (self.statistics, self.statistics_recorded) {
            cmd.end_query(pool, 0);
        }
    }

    /// Reads the statistics of the last completed use of this slot.
    ///
    /// Returns `Ok(None)` if statistics are unsupported, were not recorded,
    /// or are not yet available.
    ///
    /// # Errors
    ///
    /// Returns an error if the query read fails.
    pub fn read_statistics(&self) -> RhiResult<Option<PipelineStatistics>> {
        let Some(pool) = self.statistics.filter(|_| self.statistics_recorded) else {
            return Ok(None);
        };
        let mut counters = [[0u64; 3]; 1];
        let result = unsafe {
            self.device.handle().get_query_pool_results(
                pool,
                0,
                &mut counters,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match result {
            Ok(()) => Ok(Some(PipelineStatistics::from(counters[0]))),
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the timestamps written during the last use of this slot, in
    /// milliseconds relative to the first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query read fails.
    pub fn read_timestamps_ms(&self) -> RhiResult<Vec<f64>> {
        let Some(pool) = self.timestamps.filter(|_| self.written > 0) else {
            return Ok(Vec::new());
        };
        let mut ticks = vec![0u64; self.written as usize];
        let result = unsafe {
            self.device.handle().get_query_pool_results(
                pool,
                0,
                &mut ticks,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match result {
            Ok(()) => Ok(timestamps_to_ms(&ticks, self.timestamp_period)),
            Err(vk::Result::NOT_READY) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for QueryPools {
    fn drop(&mut self) {
        for pool in [self.timestamps.take(), self.statistics.take()]
            .into_iter()
            .flatten()
        {
            unsafe {
                self.device.handle().destroy_query_pool(pool, None);
            }
        }
        debug!("Destroyed query pools");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_from_counters() {
        let stats = PipelineStatistics::from([6, 6, 1024]);
        assert_eq!(stats.input_assembly_vertices, 6);
        assert_eq!(stats.vertex_shader_invocations, 6);
        assert_eq!(stats.fragment_shader_invocations, 1024);
    }

    #[test]
    fn test_statistics_flags_count() {
        assert_eq!(STATISTICS_FLAGS.as_raw().count_ones(), 3);
    }

    #[test]
    fn test_timestamps_to_ms() {
        let ms = timestamps_to_ms(&[1_000, 2_000_000, 4_000_000], 1.0);
        assert_eq!(ms.len(), 3);
        assert_eq!(ms[0], 0.0);
        assert!((ms[1] - 1.999).abs() < 1e-9);
        assert!((ms[2] - 3.999).abs() < 1e-9);
    }

    #[test]
    fn test_timestamps_to_ms_empty() {
        assert!(timestamps_to_ms(&[], 1.0).is_empty());
    }
}
