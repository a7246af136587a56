// SPDX-License-Identifier: CEPL-1.0
//! Scriptable in-memory backend for tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::backend::{AcquireStatus, BackendResult, PresentBackend, PresentStatus};
use crate::error::BackendError;
use crate::negotiate::Configuration;
use crate::types::{
    ColorFormat, ColorSpace, Extent2D, PresentMode, QueueFamilyInfo, QueueFlags,
    SurfaceCapabilities, SurfaceFormat,
};

pub type Handle = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateSwapchain {
        id: Handle,
        predecessor: Option<Handle>,
    },
    DestroySwapchain(Handle),
    CreateView(Handle),
    DestroyView(Handle),
    Transition(Vec<Handle>),
    CreateSemaphore(Handle),
    DestroySemaphore(Handle),
    Acquire {
        swapchain: Handle,
        signal: Handle,
    },
    Present {
        swapchain: Handle,
        index: u32,
        wait: Vec<Handle>,
    },
    WaitIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockAcquire {
    Next,
    Suboptimal,
    Timeout,
    OutOfDate,
    Fail,
    /// Report this index whether or not the swapchain has it.
    Index(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockPresent {
    Ok,
    Suboptimal,
    OutOfDate,
    Fail,
}

#[derive(Clone, Debug)]
pub struct MockSurface {
    pub families: Vec<QueueFamilyInfo>,
    pub caps: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub modes: Vec<PresentMode>,
}

impl Default for MockSurface {
    fn default() -> Self {
        Self {
            families: vec![QueueFamilyInfo {
                index: 0,
                flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                supports_present: true,
            }],
            caps: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: Extent2D::new(800, 600),
                ..SurfaceCapabilities::default()
            },
            formats: vec![SurfaceFormat::new(
                ColorFormat::B8G8R8A8Srgb,
                ColorSpace::SrgbNonlinear,
            )],
            modes: vec![PresentMode::Fifo],
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub surface: MockSurface,
    pub calls: Vec<Call>,
    pub configs: Vec<Configuration>,

    pub image_count_override: Option<u32>,
    pub fail_capability_query: bool,
    /// Number of upcoming `create_swapchain` calls that fail.
    pub fail_create_swapchain: u32,
    pub fail_view_at: Option<u32>,
    pub fail_transition: bool,
    pub fail_wait_idle: bool,

    pub acquire_script: VecDeque<MockAcquire>,
    pub present_script: VecDeque<MockPresent>,

    next_id: Handle,
    cursor: u32,
    images: HashMap<Handle, Vec<Handle>>,
    view_owner: HashMap<Handle, Handle>,
    live_swapchains: BTreeSet<Handle>,
    live_views: BTreeSet<Handle>,
    live_semaphores: BTreeSet<Handle>,
}

impl MockState {
    fn id(&mut self) -> Handle {
        self.next_id += 1;
        self.next_id
    }

    fn query(&self, call: &'static str) -> BackendResult<()> {
        if self.fail_capability_query {
            Err(BackendError::new(call, "ERROR_SURFACE_LOST_KHR"))
        } else {
            Ok(())
        }
    }

    pub fn swapchains_created(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::CreateSwapchain { .. }))
            .count()
    }

    pub fn assert_no_live_objects(&self) {
        assert!(self.live_swapchains.is_empty(), "leaked swapchains: {:?}", self.live_swapchains);
        assert!(self.live_views.is_empty(), "leaked views: {:?}", self.live_views);
        assert!(
            self.live_semaphores.is_empty(),
            "leaked semaphores: {:?}",
            self.live_semaphores
        );
    }
}

/// Cheap to clone; clones share the same state so a test can keep a handle
/// after moving the backend into an engine.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new(surface: MockSurface) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                surface,
                ..MockState::default()
            })),
        }
    }

    pub fn state(&self) -> &Rc<RefCell<MockState>> {
        &self.state
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn script_acquire(&self, steps: impl IntoIterator<Item = MockAcquire>) {
        self.state.borrow_mut().acquire_script.extend(steps);
    }

    pub fn script_present(&self, steps: impl IntoIterator<Item = MockPresent>) {
        self.state.borrow_mut().present_script.extend(steps);
    }

    pub fn assert_no_live_objects(&self) {
        self.state.borrow().assert_no_live_objects();
    }
}

impl PresentBackend for MockBackend {
    type Image = Handle;
    type View = Handle;
    type Swapchain = Handle;
    type Semaphore = Handle;

    fn queue_families(&self) -> BackendResult<Vec<QueueFamilyInfo>> {
        let st = self.state.borrow();
        st.query("get_queue_family_properties")?;
        Ok(st.surface.families.clone())
    }

    fn surface_capabilities(&self) -> BackendResult<SurfaceCapabilities> {
        let st = self.state.borrow();
        st.query("get_surface_capabilities")?;
        Ok(st.surface.caps)
    }

    fn surface_formats(&self) -> BackendResult<Vec<SurfaceFormat>> {
        let st = self.state.borrow();
        st.query("get_surface_formats")?;
        Ok(st.surface.formats.clone())
    }

    fn present_modes(&self) -> BackendResult<Vec<PresentMode>> {
        let st = self.state.borrow();
        st.query("get_surface_present_modes")?;
        Ok(st.surface.modes.clone())
    }

    fn create_swapchain(
        &mut self,
        config: &Configuration,
        predecessor: Option<Handle>,
    ) -> BackendResult<Handle> {
        let mut st = self.state.borrow_mut();
        if let Some(p) = predecessor {
            assert!(st.live_swapchains.contains(&p), "predecessor {p} is not live");
        }
        if st.fail_create_swapchain > 0 {
            st.fail_create_swapchain -= 1;
            return Err(BackendError::new("create_swapchain", "ERROR_OUT_OF_DEVICE_MEMORY"));
        }

        let id = st.id();
        let count = st.image_count_override.unwrap_or(config.image_count);
        let images: Vec<Handle> = (0..count).map(|_| st.id()).collect();
        st.images.insert(id, images);
        st.live_swapchains.insert(id);
        st.configs.push(config.clone());
        st.cursor = 0;
        st.calls.push(Call::CreateSwapchain { id, predecessor });
        Ok(id)
    }

    fn swapchain_images(&mut self, swapchain: Handle) -> BackendResult<Vec<Handle>> {
        let st = self.state.borrow();
        st.images
            .get(&swapchain)
            .cloned()
            .ok_or_else(|| BackendError::new("get_swapchain_images", "unknown swapchain"))
    }

    fn destroy_swapchain(&mut self, swapchain: Handle) {
        let mut st = self.state.borrow_mut();
        assert!(st.live_swapchains.remove(&swapchain), "double destroy of swapchain {swapchain}");
        let orphaned: Vec<Handle> = st
            .view_owner
            .iter()
            .filter(|(v, owner)| **owner == swapchain && st.live_views.contains(*v))
            .map(|(v, _)| *v)
            .collect();
        assert!(orphaned.is_empty(), "swapchain {swapchain} destroyed before views {orphaned:?}");
        st.calls.push(Call::DestroySwapchain(swapchain));
    }

    fn create_view(&mut self, image: Handle, _format: ColorFormat) -> BackendResult<Handle> {
        let mut st = self.state.borrow_mut();
        let (owner, position) = st
            .images
            .iter()
            .find_map(|(sc, imgs)| imgs.iter().position(|i| *i == image).map(|p| (*sc, p)))
            .ok_or_else(|| BackendError::new("create_image_view", "unknown image"))?;
        if st.fail_view_at == Some(position as u32) {
            return Err(BackendError::new("create_image_view", "ERROR_OUT_OF_HOST_MEMORY"));
        }
        let id = st.id();
        st.live_views.insert(id);
        st.view_owner.insert(id, owner);
        st.calls.push(Call::CreateView(id));
        Ok(id)
    }

    fn destroy_view(&mut self, view: Handle) {
        let mut st = self.state.borrow_mut();
        assert!(st.live_views.remove(&view), "double destroy of view {view}");
        st.calls.push(Call::DestroyView(view));
    }

    fn transition_to_present(&mut self, images: &[Handle]) -> BackendResult<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::Transition(images.to_vec()));
        if st.fail_transition {
            return Err(BackendError::new("queue_submit", "ERROR_DEVICE_LOST"));
        }
        Ok(())
    }

    fn create_semaphore(&mut self) -> BackendResult<Handle> {
        let mut st = self.state.borrow_mut();
        let id = st.id();
        st.live_semaphores.insert(id);
        st.calls.push(Call::CreateSemaphore(id));
        Ok(id)
    }

    fn destroy_semaphore(&mut self, semaphore: Handle) {
        let mut st = self.state.borrow_mut();
        assert!(
            st.live_semaphores.remove(&semaphore),
            "double destroy of semaphore {semaphore}"
        );
        st.calls.push(Call::DestroySemaphore(semaphore));
    }

    fn acquire_next_image(
        &mut self,
        swapchain: Handle,
        _timeout: Option<Duration>,
        signal: Handle,
    ) -> BackendResult<AcquireStatus> {
        let mut st = self.state.borrow_mut();
        assert!(st.live_swapchains.contains(&swapchain), "acquire on dead swapchain");
        assert!(st.live_semaphores.contains(&signal), "acquire with dead semaphore");
        st.calls.push(Call::Acquire { swapchain, signal });

        let step = st.acquire_script.pop_front().unwrap_or(MockAcquire::Next);
        let suboptimal = match step {
            MockAcquire::Next => false,
            MockAcquire::Suboptimal => true,
            MockAcquire::Timeout => return Ok(AcquireStatus::Timeout),
            MockAcquire::OutOfDate => return Ok(AcquireStatus::OutOfDate),
            MockAcquire::Fail => {
                return Err(BackendError::new("acquire_next_image", "ERROR_DEVICE_LOST"))
            }
            MockAcquire::Index(index) => {
                return Ok(AcquireStatus::Acquired {
                    index,
                    suboptimal: false,
                })
            }
        };
        let count = st.images.get(&swapchain).map_or(1, |i| i.len().max(1) as u32);
        let index = st.cursor % count;
        st.cursor += 1;
        Ok(AcquireStatus::Acquired { index, suboptimal })
    }

    fn queue_present(
        &mut self,
        swapchain: Handle,
        index: u32,
        wait: &[Handle],
    ) -> BackendResult<PresentStatus> {
        let mut st = self.state.borrow_mut();
        assert!(st.live_swapchains.contains(&swapchain), "present on dead swapchain");
        st.calls.push(Call::Present {
            swapchain,
            index,
            wait: wait.to_vec(),
        });
        match st.present_script.pop_front().unwrap_or(MockPresent::Ok) {
            MockPresent::Ok => Ok(PresentStatus::Presented),
            MockPresent::Suboptimal => Ok(PresentStatus::Suboptimal),
            MockPresent::OutOfDate => Ok(PresentStatus::OutOfDate),
            MockPresent::Fail => Err(BackendError::new("queue_present", "ERROR_DEVICE_LOST")),
        }
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::WaitIdle);
        if st.fail_wait_idle {
            return Err(BackendError::new("device_wait_idle", "ERROR_DEVICE_LOST"));
        }
        Ok(())
    }
}
