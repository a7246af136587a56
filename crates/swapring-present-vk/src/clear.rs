// SPDX-License-Identifier: CEPL-1.0
//! Minimal renderer: clears the acquired image to a solid color.

use anyhow::{Context, Result};
use ash::vk;
use swapring_present::AcquiredImage;
use tracing::warn;

use crate::{color_subresource, VkBackend};

// Per swapchain image; an index is only re-acquired after its previous
// present, so its semaphore and fence are free to reuse then.
struct FrameSync {
    cmd: vk::CommandBuffer,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

pub struct ClearPass {
    pool: vk::CommandPool,
    frames: Vec<FrameSync>,
    clear: vk::ClearColorValue,
}

impl ClearPass {
    pub fn new(backend: &VkBackend) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: backend.queue_family(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = unsafe { backend.device().create_command_pool(&pool_info, None) }
            .context("create_command_pool(clear)")?;
        Ok(Self {
            pool,
            frames: Vec::new(),
            clear: vk::ClearColorValue {
                float32: [0.02, 0.02, 0.04, 1.0],
            },
        })
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = vk::ClearColorValue { float32: rgba };
    }

    fn ensure_frames(&mut self, backend: &VkBackend, count: usize) -> Result<()> {
        let d = backend.device();
        while self.frames.len() < count {
            let alloc_info = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: self.pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let fence_ci = vk::FenceCreateInfo {
                s_type: vk::StructureType::FENCE_CREATE_INFO,
                flags: vk::FenceCreateFlags::SIGNALED,
                ..Default::default()
            };
            unsafe {
                let cmd = d.allocate_command_buffers(&alloc_info)?[0];
                let render_finished = d.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
                let in_flight = d.create_fence(&fence_ci, None)?;
                self.frames.push(FrameSync {
                    cmd,
                    render_finished,
                    in_flight,
                });
            }
        }
        Ok(())
    }

    /// Record and submit the clear for `img`. The returned semaphore is
    /// signaled when the image is ready to present.
    pub fn draw(
        &mut self,
        backend: &VkBackend,
        img: &AcquiredImage<VkBackend>,
    ) -> Result<vk::Semaphore> {
        self.ensure_frames(backend, img.index as usize + 1)?;
        let d = backend.device();
        let f = &self.frames[img.index as usize];

        unsafe {
            d.wait_for_fences(&[f.in_flight], true, u64::MAX)
                .context("wait_for_fences(clear)")?;
            d.reset_fences(&[f.in_flight])?;

            d.reset_command_buffer(f.cmd, vk::CommandBufferResetFlags::empty())?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(f.cmd, &begin)?;

            // previous contents are discarded, so start from UNDEFINED
            let to_dst = vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: img.image,
                subresource_range: color_subresource(),
                ..Default::default()
            };
            d.cmd_pipeline_barrier(
                f.cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&to_dst),
            );

            d.cmd_clear_color_image(
                f.cmd,
                img.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &self.clear,
                &[color_subresource()],
            );

            let to_present = vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags::empty(),
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: img.image,
                subresource_range: color_subresource(),
                ..Default::default()
            };
            d.cmd_pipeline_barrier(
                f.cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&to_present),
            );
            d.end_command_buffer(f.cmd)?;

            // wait on acquire at the stage that first touches the image
            let wait_stages = [vk::PipelineStageFlags::TRANSFER];
            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                wait_semaphore_count: 1,
                p_wait_semaphores: &img.wait_semaphore,
                p_wait_dst_stage_mask: wait_stages.as_ptr(),
                command_buffer_count: 1,
                p_command_buffers: &f.cmd,
                signal_semaphore_count: 1,
                p_signal_semaphores: &f.render_finished,
                ..Default::default()
            };
            d.queue_submit(backend.queue(), std::slice::from_ref(&submit), f.in_flight)
                .context("queue_submit(clear)")?;
        }

        Ok(f.render_finished)
    }

    /// Must run before the backend (and its device) is dropped.
    pub fn destroy(&mut self, backend: &VkBackend) {
        let d = backend.device();
        unsafe {
            if !self.frames.is_empty() {
                let fences: Vec<_> = self.frames.iter().map(|f| f.in_flight).collect();
                if let Err(e) = d.wait_for_fences(&fences, true, u64::MAX) {
                    warn!("clear: frames did not finish before teardown: {e}");
                }
            }
            for f in self.frames.drain(..) {
                d.destroy_fence(f.in_flight, None);
                d.destroy_semaphore(f.render_finished, None);
            }
            d.destroy_command_pool(self.pool, None);
        }
        self.pool = vk::CommandPool::null();
    }
}
