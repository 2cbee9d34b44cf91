//! Per-pass timing: GPU timestamp queries when the device has them, CPU
//! encode time otherwise.

use web_time::Instant;

use crate::gpu::backend::PassTimings;

/// Passes that are timed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimedPass {
    Shadow,
    Geometry,
    Lighting,
}

impl TimedPass {
    const fn index(self) -> usize {
        match self {
            Self::Shadow => 0,
            Self::Geometry => 1,
            Self::Lighting => 2,
        }
    }
}

const PASSES: usize = 3;
/// Resolve destinations must sit on 256-byte boundaries.
const RESOLVE_STRIDE: u64 = wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT;

struct Queries {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    period_ns: f32,
}

pub(super) struct PassTimer {
    queries: Option<Queries>,
    written: [bool; PASSES],
    cpu_ns: [u64; PASSES],
}

impl PassTimer {
    pub(super) fn new(device: &wgpu::Device, queue: &wgpu::Queue, timestamps: bool) -> Self {
        let size = RESOLVE_STRIDE * PASSES as u64;
        let queries = timestamps.then(|| Queries {
            set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("pass timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count: (PASSES * 2) as u32,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("timestamp resolve"),
                size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("timestamp readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            period_ns: queue.get_timestamp_period(),
        });
        Self {
            queries,
            written: [false; PASSES],
            cpu_ns: [0; PASSES],
        }
    }

    pub(super) fn reset(&mut self) {
        self.written = [false; PASSES];
        self.cpu_ns = [0; PASSES];
    }

    /// Timestamp writes for the next render pass of `pass`.
    ///
    /// The first pass of a kind writes the begin stamp; every pass writes
    /// the end stamp, so several shadow faces add up to one span.
    pub(super) fn writes(&mut self, pass: TimedPass) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        let i = pass.index();
        let first = !self.written[i];
        self.written[i] = true;
        let queries = self.queries.as_ref()?;
        let begin = (i * 2) as u32;
        Some(wgpu::RenderPassTimestampWrites {
            query_set: &queries.set,
            beginning_of_pass_write_index: first.then_some(begin),
            end_of_pass_write_index: Some(begin + 1),
        })
    }

    pub(super) fn add_cpu(&mut self, pass: TimedPass, started: Instant) {
        self.cpu_ns[pass.index()] += started.elapsed().as_nanos() as u64;
    }

    /// Copy this frame's stamps somewhere mappable.
    pub(super) fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(queries) = &self.queries else {
            return;
        };
        for (i, _) in self.written.iter().enumerate().filter(|(_, w)| **w) {
            let first = (i * 2) as u32;
            encoder.resolve_query_set(
                &queries.set,
                first..first + 2,
                &queries.resolve,
                i as u64 * RESOLVE_STRIDE,
            );
        }
        encoder.copy_buffer_to_buffer(
            &queries.resolve,
            0,
            &queries.readback,
            0,
            RESOLVE_STRIDE * PASSES as u64,
        );
    }

    /// Read back the resolved stamps (blocks until the frame completes).
    /// Falls back to CPU encode time if there are no queries or the
    /// readback fails.
    pub(super) fn read(&self, device: &wgpu::Device) -> PassTimings {
        let cpu = timings(self.cpu_ns);
        let Some(queries) = &self.queries else {
            return cpu;
        };

        let slice = queries.readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        if let Err(e) = device.poll(wgpu::PollType::Wait) {
            log::warn!("timestamp readback poll failed: {e}");
            return cpu;
        }
        if !matches!(receiver.recv(), Ok(Ok(()))) {
            log::warn!("timestamp readback could not be mapped");
            return cpu;
        }

        let mut ns = [0_u64; PASSES];
        {
            let data = slice.get_mapped_range();
            for (i, span) in ns.iter_mut().enumerate() {
                if !self.written[i] {
                    continue;
                }
                let at = i * RESOLVE_STRIDE as usize;
                let stamp = |offset: usize| {
                    data.get(at + offset..at + offset + 8)
                        .map_or(0, bytemuck::pod_read_unaligned::<u64>)
                };
                let ticks = stamp(8).saturating_sub(stamp(0));
                *span = (ticks as f64 * f64::from(queries.period_ns)) as u64;
            }
        }
        queries.readback.unmap();
        timings(ns)
    }
}

const fn timings(ns: [u64; PASSES]) -> PassTimings {
    PassTimings {
        shadow_ns: ns[0],
        geometry_ns: ns[1],
        lighting_ns: ns[2],
    }
}
