// SPDX-License-Identifier: CEPL-1.0
//! Steady-state frame loop. The state machine lives in [`FrameSynchronizer`]
//! and talks to the GPU only through [`FrameBackend`].

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::swapchain::Swapchain;

pub const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    WaitingOnFence,
    ImageAcquired,
    Submitted,
    Presented,
}

/// The four GPU-facing steps of one iteration, keyed by frame slot.
pub trait FrameBackend {
    /// Block until the slot's fence is signaled, then reset it.
    fn wait_and_reset_fence(&mut self, slot: usize) -> RenderResult<()>;
    /// Next presentable image; signals the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32>;
    /// Waits image-available, signals render-finished, arms the slot fence.
    fn submit(&mut self, slot: usize, commands: vk::CommandBuffer) -> RenderResult<()>;
    /// Waits render-finished.
    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub image_index: u32,
}

#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: [SlotState; FRAMES_IN_FLIGHT],
    current: usize,
    frames: u64,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self {
            slots: [SlotState::WaitingOnFence; FRAMES_IN_FLIGHT],
            current: 0,
            frames: 0,
        }
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots[slot]
    }

    /// Slots whose last submission may still be executing.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotState::Submitted | SlotState::Presented))
            .count()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    /// One full wait → acquire → submit → present iteration. `commands` is
    /// indexed by swapchain image, not by slot.
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        commands: &[vk::CommandBuffer],
    ) -> RenderResult<FrameReport> {
        let slot = self.current;

        self.slots[slot] = SlotState::WaitingOnFence;
        backend.wait_and_reset_fence(slot)?;

        let image_index = backend.acquire_image(slot)?;
        let cmd = *commands
            .get(image_index as usize)
            .ok_or(RenderError::ImageIndexOutOfRange {
                index: image_index,
                count: commands.len(),
            })?;
        self.slots[slot] = SlotState::ImageAcquired;

        backend.submit(slot, cmd)?;
        self.slots[slot] = SlotState::Submitted;

        backend.present(slot, image_index)?;
        self.slots[slot] = SlotState::Presented;

        trace!(slot, image_index, "frame presented");
        self.current = (slot + 1) % FRAMES_IN_FLIGHT;
        self.frames += 1;
        Ok(FrameReport { slot, image_index })
    }
}

/// Per-slot semaphores and fences. Fences start signaled so the first wait
/// on each slot returns immediately.
pub struct FrameSyncObjects {
    device: ash::Device,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    in_flight: Vec<vk::Fence>,
}

impl FrameSyncObjects {
    pub unsafe fn new(device: &ash::Device, slots: usize) -> RenderResult<Self> {
        let mut out = Self {
            device: device.clone(),
            image_available: Vec::with_capacity(slots),
            render_finished: Vec::with_capacity(slots),
            in_flight: Vec::with_capacity(slots),
        };

        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..slots {
            let ia = device
                .create_semaphore(&sem_ci, None)
                .creation("create_semaphore")?;
            out.image_available.push(ia);
            let rf = device
                .create_semaphore(&sem_ci, None)
                .creation("create_semaphore")?;
            out.render_finished.push(rf);
            let fence = device
                .create_fence(&fence_ci, None)
                .creation("create_fence")?;
            out.in_flight.push(fence);
        }
        debug!("created sync objects for {slots} frame slots");
        Ok(out)
    }
}

impl Drop for FrameSyncObjects {
    fn drop(&mut self) {
        unsafe {
            for &f in &self.in_flight {
                self.device.destroy_fence(f, None);
            }
            for &s in self.render_finished.iter().chain(&self.image_available) {
                self.device.destroy_semaphore(s, None);
            }
        }
    }
}

/// The Vulkan side of the loop. Borrows everything; owns nothing.
pub struct VkFrameBackend<'a> {
    pub device: &'a Device,
    pub swapchain: &'a Swapchain,
    pub sync: &'a FrameSyncObjects,
}

impl FrameBackend for VkFrameBackend<'_> {
    fn wait_and_reset_fence(&mut self, slot: usize) -> RenderResult<()> {
        let fence = [self.sync.in_flight[slot]];
        unsafe {
            let d = self.device.raw();
            d.wait_for_fences(&fence, true, u64::MAX)
                .sync("wait_for_fences")?;
            d.reset_fences(&fence).sync("reset_fences")
        }
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.raw(),
                u64::MAX,
                self.sync.image_available[slot],
                vk::Fence::null(),
            )
        }
        .acquire("acquire_next_image")?;
        if suboptimal {
            return Err(RenderError::Acquire {
                stage: "acquire_next_image",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }
        Ok(index)
    }

    fn submit(&mut self, slot: usize, commands: vk::CommandBuffer) -> RenderResult<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync.image_available[slot],
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &commands,
            signal_semaphore_count: 1,
            p_signal_semaphores: &self.sync.render_finished[slot],
            ..Default::default()
        };
        unsafe {
            self.device.raw().queue_submit(
                self.device.queue(),
                std::slice::from_ref(&submit),
                self.sync.in_flight[slot],
            )
        }
        .sync("queue_submit")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let swapchain = self.swapchain.raw();
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync.render_finished[slot],
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let suboptimal = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.queue(), &present)
        }
        .acquire("queue_present")?;
        if suboptimal {
            return Err(RenderError::Acquire {
                stage: "queue_present",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Fence {
        Signaled,
        Armed,
        Reset,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Submit(usize, u64),
        Present(usize, u32),
    }

    /// Fences start signaled; a wait on an armed fence completes the GPU work.
    struct MockGpu {
        fences: [Fence; FRAMES_IN_FLIGHT],
        images: Vec<u32>,
        next_image: usize,
        calls: Vec<Call>,
        max_armed: usize,
        fail_acquire: Option<vk::Result>,
    }

    impl MockGpu {
        fn new(images: Vec<u32>) -> Self {
            Self {
                fences: [Fence::Signaled; FRAMES_IN_FLIGHT],
                images,
                next_image: 0,
                calls: Vec::new(),
                max_armed: 0,
                fail_acquire: None,
            }
        }

        fn round_robin(count: u32) -> Self {
            Self::new((0..count).collect())
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for MockGpu {
        fn wait_and_reset_fence(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Wait(slot));
            // A reset fence with no pending submit would block forever.
            assert_ne!(self.fences[slot], Fence::Reset, "wait on unarmed fence");
            self.fences[slot] = Fence::Reset;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
            self.calls.push(Call::Acquire(slot));
            if let Some(result) = self.fail_acquire {
                return Err(RenderError::Acquire {
                    stage: "acquire_next_image",
                    result,
                });
            }
            let index = self.images[self.next_image % self.images.len()];
            self.next_image += 1;
            Ok(index)
        }

        fn submit(&mut self, slot: usize, commands: vk::CommandBuffer) -> RenderResult<()> {
            self.calls.push(Call::Submit(slot, commands.as_raw()));
            self.fences[slot] = Fence::Armed;
            let armed = self.fences.iter().filter(|f| **f == Fence::Armed).count();
            self.max_armed = self.max_armed.max(armed);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(())
        }
    }

    fn command_buffers(n: u64) -> Vec<vk::CommandBuffer> {
        (0..n).map(|i| vk::CommandBuffer::from_raw(0x100 + i)).collect()
    }

    #[test]
    fn hundred_frames_cycle_slots_and_respect_fences() {
        let mut gpu = MockGpu::round_robin(3);
        let mut sync = FrameSynchronizer::new();
        let cmds = command_buffers(3);

        let mut slots = Vec::new();
        for _ in 0..100 {
            slots.push(sync.draw_frame(&mut gpu, &cmds).unwrap().slot);
        }

        let expected: Vec<usize> = (0..100).map(|i| i % 2).collect();
        assert_eq!(slots, expected);
        assert_eq!(sync.frames_drawn(), 100);
        assert!(gpu.max_armed <= FRAMES_IN_FLIGHT);
        assert_eq!(gpu.count(|c| matches!(c, Call::Wait(_))), 100);
        assert_eq!(gpu.count(|c| matches!(c, Call::Present(..))), 100);
    }

    #[test]
    fn submits_buffer_for_acquired_image_not_slot() {
        // three images handed out out of order
        let mut gpu = MockGpu::new(vec![2, 0, 1, 1, 2]);
        let mut sync = FrameSynchronizer::new();
        let cmds = command_buffers(3);

        for _ in 0..5 {
            sync.draw_frame(&mut gpu, &cmds).unwrap();
        }

        let submitted: Vec<(usize, u64)> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(slot, raw) => Some((*slot, *raw)),
                _ => None,
            })
            .collect();
        assert_eq!(
            submitted,
            [
                (0, 0x102),
                (1, 0x100),
                (0, 0x101),
                (1, 0x101),
                (0, 0x102)
            ]
        );

        let presented: Vec<u32> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Present(_, i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(presented, [2, 0, 1, 1, 2]);
    }

    #[test]
    fn iteration_order_is_wait_acquire_submit_present() {
        let mut gpu = MockGpu::round_robin(2);
        let mut sync = FrameSynchronizer::new();
        sync.draw_frame(&mut gpu, &command_buffers(2)).unwrap();
        assert_eq!(
            gpu.calls,
            [
                Call::Wait(0),
                Call::Acquire(0),
                Call::Submit(0, 0x100),
                Call::Present(0, 0)
            ]
        );
    }

    #[test]
    fn out_of_range_image_is_fatal_before_submit() {
        let mut gpu = MockGpu::new(vec![3]);
        let mut sync = FrameSynchronizer::new();
        let err = sync.draw_frame(&mut gpu, &command_buffers(3)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ImageIndexOutOfRange { index: 3, count: 3 }
        ));
        assert_eq!(gpu.count(|c| matches!(c, Call::Submit(..))), 0);
        assert_eq!(sync.frames_drawn(), 0);
    }

    #[test]
    fn acquire_failure_propagates() {
        let mut gpu = MockGpu::round_robin(2);
        gpu.fail_acquire = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let mut sync = FrameSynchronizer::new();
        let err = sync.draw_frame(&mut gpu, &command_buffers(2)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Acquire {
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
                ..
            }
        ));
        assert_eq!(gpu.count(|c| matches!(c, Call::Submit(..))), 0);
        assert_eq!(sync.slot_state(0), SlotState::WaitingOnFence);
    }

    #[test]
    fn slot_states_track_progress() {
        let mut gpu = MockGpu::round_robin(2);
        let mut sync = FrameSynchronizer::new();
        let cmds = command_buffers(2);
        assert_eq!(sync.in_flight(), 0);

        sync.draw_frame(&mut gpu, &cmds).unwrap();
        assert_eq!(sync.slot_state(0), SlotState::Presented);
        assert_eq!(sync.slot_state(1), SlotState::WaitingOnFence);
        assert_eq!(sync.in_flight(), 1);

        sync.draw_frame(&mut gpu, &cmds).unwrap();
        assert_eq!(sync.in_flight(), 2);
        assert_eq!(sync.current_slot(), 0);
    }
}
