// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use swapring_core::init_tracing;
use swapring_present::{Acquire, ColorEncoding, EngineSettings, Extent2D, PresentEngine};
use swapring_present_vk::{ClearPass, VkBackend};
use tracing::{error, info, warn};

use swapring_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with [render] and [present] tables
    #[arg(long, default_value = "swapring.toml")]
    config: PathBuf,
    /// Write linear (UNORM) values instead of sRGB-encoded ones
    #[arg(long)]
    linear: bool,
    /// Never tear: prefer MAILBOX, then FIFO
    #[arg(long)]
    vsync: bool,
    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
struct RenderCfg {
    clear_color: [f32; 4],
    animate: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            animate: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AppCfg {
    render: RenderCfg,
    present: EngineSettings,
}

fn load_cfg(path: &Path) -> AppCfg {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            info!("no {} found, using defaults", path.display());
            return AppCfg::default();
        }
    };
    match toml::from_str::<AppCfg>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn animated(base: [f32; 4], t: Duration) -> [f32; 4] {
    let s = t.as_secs_f32();
    let wave = |phase: f32| 0.5 + 0.5 * (s * 0.8 + phase).sin();
    [
        base[0] * 0.5 + 0.5 * wave(0.0),
        base[1] * 0.5 + 0.5 * wave(2.1),
        base[2] * 0.5 + 0.5 * wave(4.2),
        base[3],
    ]
}

// The clear pass borrows the engine's device; it is torn down in Drop before
// the engine releases the ring and the backend destroys the device.
struct Gpu {
    clear: ClearPass,
    engine: PresentEngine<VkBackend>,
}

impl Gpu {
    fn new(window: &Window, settings: EngineSettings, clear_color: [f32; 4]) -> Result<Self> {
        let size = window.inner_size();
        let backend = VkBackend::new(window, window).context("vulkan init")?;
        let engine = PresentEngine::with_extent(
            backend,
            settings,
            Some(Extent2D::new(size.width, size.height)),
        )?;
        let mut clear = ClearPass::new(engine.backend())?;
        clear.set_clear_color(clear_color);
        Ok(Self { clear, engine })
    }

    /// Returns true when a frame reached the display.
    fn frame(&mut self) -> Result<bool> {
        let timeout = self.engine.default_timeout();
        let img = match self.engine.acquire(timeout) {
            Ok(Acquire::Ready(img)) => img,
            Ok(Acquire::TimedOut) | Ok(Acquire::Suspended) => return Ok(false),
            Err(e) if e.is_frame_scoped() => {
                error!("frame dropped: {e}");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let done = match self.clear.draw(self.engine.backend(), &img) {
            Ok(sem) => sem,
            Err(e) => {
                // hand the image back untouched so the cycle stays usable
                self.engine.present(&[img.wait_semaphore])?;
                return Err(e);
            }
        };

        match self.engine.present(&[done]) {
            Ok(report) => Ok(report.presented),
            Err(e) if e.is_frame_scoped() => {
                error!("frame dropped: {e}");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        use swapring_present::PresentBackend;
        if let Err(e) = self.engine.backend_mut().wait_idle() {
            warn!("device did not drain: {e}");
        }
        self.clear.destroy(self.engine.backend());
    }
}

struct App {
    cfg: AppCfg,
    frame_limit: Option<u64>,

    window: Option<Window>,
    gpu: Option<Gpu>,

    exiting: bool,
    started: Instant,
    frames: u32,
    presented: u64,
    last_fps_instant: Instant,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(Window::default_attributes().with_title("swapring"))
            .context("create_window")?;
        let gpu = Gpu::new(&window, self.cfg.present.clone(), self.cfg.render.clear_color)?;
        if let Some(c) = gpu.engine.configuration() {
            info!(
                "present = {:?}, {:?}, {} images at {}",
                c.present_mode,
                c.color_format,
                gpu.engine.ring().map_or(0, |r| r.image_count()),
                c.extent
            );
        }
        self.window = Some(window);
        self.gpu = Some(gpu);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.gpu = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("init failed: {e:#}");
                self.shutdown(event_loop);
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                info!("Resized → {}x{}", new_size.width, new_size.height);
                if let Some(gpu) = &mut self.gpu {
                    gpu.engine.notify_resize(new_size.width, new_size.height);
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(gpu) = &mut self.gpu else {
                    return;
                };

                if self.cfg.render.animate {
                    gpu.clear
                        .set_clear_color(animated(self.cfg.render.clear_color, self.started.elapsed()));
                }

                match gpu.frame() {
                    Ok(true) => {
                        // count only frames that were actually presented
                        self.frames = self.frames.saturating_add(1);
                        self.presented += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!("render error: {e:#}");
                        self.shutdown(event_loop);
                        return;
                    }
                }

                if self.frame_limit.is_some_and(|n| self.presented >= n) {
                    info!("presented {} frames, exiting", self.presented);
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        let suspended = self.gpu.as_ref().is_some_and(|g| g.engine.is_suspended());
        if suspended {
            // window-size=0 → sleep until the next resize
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // presentation paces the loop: block until events, then redraw once
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            let rebuilt = self.gpu.as_ref().map_or(0, |g| g.engine.recreation_count());
            info!("fps ~ {} (ring rebuilt {} times)", self.frames, rebuilt);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if args.linear {
        cfg.present.color = ColorEncoding::Linear;
    }
    if args.vsync {
        cfg.present.present_priority = EngineSettings::vsync_priority();
    }
    info!(
        "color = {:?}, present priority = {:?}",
        cfg.present.color, cfg.present.present_priority
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        frame_limit: args.frames,
        window: None,
        gpu: None,
        exiting: false,
        started: Instant::now(),
        frames: 0,
        presented: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
