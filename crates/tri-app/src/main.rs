// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tri_core::init_tracing;
use tri_render::{RenderSize, Renderer, ShaderBinary};
use tri_render_vk::{DiagnosticSink, FileSink, TracingSink, VkRenderer, VkSettings};

use tri_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::AppCfg;

const DEFAULT_VERTEX: &str = "shader-bin/vs.spv";
const DEFAULT_FRAGMENT: &str = "shader-bin/fs.spv";

#[cfg(feature = "builtin-shaders")]
const BUILTIN: Option<(&[u8], &[u8])> = Some((
    include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv")) as &[u8],
    include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv")) as &[u8],
));
#[cfg(not(feature = "builtin-shaders"))]
const BUILTIN: Option<(&[u8], &[u8])> = None;

#[derive(Parser, Debug)]
#[command(author, version, about = "Draws one triangle with Vulkan", long_about = None)]
struct Args {
    /// TOML config; a missing file means defaults
    #[arg(long, default_value = "tri.toml")]
    config: PathBuf,
    /// Compiled vertex shader (SPIR-V), overrides the config
    #[arg(long)]
    vertex_shader: Option<PathBuf>,
    /// Compiled fragment shader (SPIR-V), overrides the config
    #[arg(long)]
    fragment_shader: Option<PathBuf>,
    /// Quit after this many presented frames
    #[arg(long)]
    max_frames: Option<u64>,
}

/// CLI path, then config path, then the embedded blob, then the default path.
fn resolve_shader(
    cli: Option<&Path>,
    cfg: Option<&Path>,
    builtin: Option<(&str, &[u8])>,
    fallback: &str,
) -> Result<ShaderBinary> {
    if let Some(path) = cli.or(cfg) {
        return Ok(ShaderBinary::from_file(path)?);
    }
    if let Some((label, bytes)) = builtin {
        return Ok(ShaderBinary::from_bytes(label, bytes));
    }
    Ok(ShaderBinary::from_file(fallback)?)
}

fn diagnostics_sink(cfg: &config::DiagnosticsCfg) -> Result<Option<Box<dyn DiagnosticSink>>> {
    if !cfg.messenger {
        return Ok(None);
    }
    let sink: Box<dyn DiagnosticSink> = match &cfg.log_file {
        Some(path) => Box::new(
            FileSink::create(path)
                .with_context(|| format!("open diagnostics log {}", path.display()))?,
        ),
        None => Box::new(TracingSink),
    };
    Ok(Some(sink))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Idle,
    Drew,
    Exit,
}

/// Quit is checked before any drawing, so a close that arrives ahead of the
/// first redraw never reaches the renderer.
fn on_window_event<R: Renderer>(
    exiting: bool,
    renderer: Option<&mut R>,
    max_frames: Option<u64>,
    event: &WindowEvent,
) -> Result<Flow> {
    if tri_platform::is_quit_event(event) {
        info!("quit requested");
        return Ok(Flow::Exit);
    }
    if exiting || !matches!(event, WindowEvent::RedrawRequested) {
        return Ok(Flow::Idle);
    }
    let Some(renderer) = renderer else {
        return Ok(Flow::Idle);
    };

    renderer.render()?;
    if max_frames.is_some_and(|max| renderer.frames_rendered() >= max) {
        info!("frame limit reached");
        return Ok(Flow::Exit);
    }
    Ok(Flow::Drew)
}

fn fatal_line(e: &anyhow::Error) -> String {
    format!("error: {e:#}")
}

struct App {
    cfg: AppCfg,
    // Consumed when the renderer is built.
    shaders: Option<(ShaderBinary, ShaderBinary)>,
    max_frames: Option<u64>,

    // Renderer first so it drops before the window it presents to.
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    exiting: bool,
    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = tri_platform::create_window(event_loop, &self.cfg.window.desc())?;
        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let (vertex_shader, fragment_shader) = self
            .shaders
            .take()
            .context("renderer already initialised")?;
        let settings = VkSettings {
            app_name: self.cfg.window.title.clone(),
            clear_color: self.cfg.render.clear_color,
            present_mode: self.cfg.render.present_mode.into(),
            validation: self.cfg.diagnostics.validation,
            diagnostics: diagnostics_sink(&self.cfg.diagnostics)?,
            vertex_shader,
            fragment_shader,
        };

        let renderer = VkRenderer::new(&window, &window, render_size, settings)?;
        info!(
            "{} (validation={}): present mode {:?}, {} swapchain images",
            renderer.adapter().name,
            renderer.validation_enabled(),
            renderer.surface_config().present_mode,
            renderer.image_count()
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Idle wait and teardown happen in the renderer's `Drop`.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    /// Reported once, by `main`.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.failure = Some(e);
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exiting {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
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

        match on_window_event(self.exiting, self.renderer.as_mut(), self.max_frames, &event) {
            Ok(Flow::Idle) => {}
            Ok(Flow::Drew) => self.frames = self.frames.saturating_add(1),
            Ok(Flow::Exit) => self.shutdown(event_loop),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        // Uncapped: keep drawing, presentation paces us.
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = AppCfg::load(&args.config)?;
    init_tracing(&cfg.diagnostics.log_filter);

    // Shader blobs are read before any GPU object exists.
    let vertex = resolve_shader(
        args.vertex_shader.as_deref(),
        cfg.shaders.vertex.as_deref(),
        BUILTIN.map(|(vs, _)| ("builtin tri.vert", vs)),
        DEFAULT_VERTEX,
    )?;
    let fragment = resolve_shader(
        args.fragment_shader.as_deref(),
        cfg.shaders.fragment.as_deref(),
        BUILTIN.map(|(_, fs)| ("builtin tri.frag", fs)),
        DEFAULT_FRAGMENT,
    )?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        shaders: Some((vertex, fragment)),
        max_frames: args.max_frames,
        renderer: None,
        window: None,
        exiting: false,
        failure: None,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", fatal_line(&e));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tri_platform::winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};

    const BLOB: &[u8] = &[9, 9, 9, 9];

    #[derive(Default)]
    struct CountingRenderer {
        renders: u64,
        fail: bool,
    }

    impl Renderer for CountingRenderer {
        type Settings = ();

        fn new(
            _: &dyn HasWindowHandle,
            _: &dyn HasDisplayHandle,
            _: RenderSize,
            _: (),
        ) -> Result<Self> {
            Ok(Self::default())
        }

        fn render(&mut self) -> Result<()> {
            if self.fail {
                anyhow::bail!("queue_present did not succeed");
            }
            self.renders += 1;
            Ok(())
        }

        fn frames_rendered(&self) -> u64 {
            self.renders
        }
    }

    /// Feeds events the way `App::window_event` does, latching `exiting`.
    fn drive(
        renderer: &mut CountingRenderer,
        max_frames: Option<u64>,
        events: &[WindowEvent],
    ) -> Result<Vec<Flow>> {
        let mut exiting = false;
        let mut flows = Vec::new();
        for event in events {
            let flow = on_window_event(exiting, Some(&mut *renderer), max_frames, event)?;
            exiting |= flow == Flow::Exit;
            flows.push(flow);
        }
        Ok(flows)
    }

    #[test]
    fn close_before_first_redraw_never_renders() {
        let mut r = CountingRenderer::default();
        let flows = drive(
            &mut r,
            None,
            &[
                WindowEvent::CloseRequested,
                WindowEvent::RedrawRequested,
                WindowEvent::RedrawRequested,
            ],
        )
        .unwrap();
        assert_eq!(flows, [Flow::Exit, Flow::Idle, Flow::Idle]);
        assert_eq!(r.renders, 0);
    }

    #[test]
    fn redraws_render_until_quit() {
        let mut r = CountingRenderer::default();
        let flows = drive(
            &mut r,
            None,
            &[
                WindowEvent::RedrawRequested,
                WindowEvent::Focused(false),
                WindowEvent::RedrawRequested,
                WindowEvent::Destroyed,
                WindowEvent::RedrawRequested,
            ],
        )
        .unwrap();
        assert_eq!(
            flows,
            [Flow::Drew, Flow::Idle, Flow::Drew, Flow::Exit, Flow::Idle]
        );
        assert_eq!(r.renders, 2);
    }

    #[test]
    fn no_renderer_yet_is_idle() {
        let flow = on_window_event::<CountingRenderer>(
            false,
            None,
            None,
            &WindowEvent::RedrawRequested,
        )
        .unwrap();
        assert_eq!(flow, Flow::Idle);
    }

    #[test]
    fn frame_limit_exits_after_last_frame() {
        let mut r = CountingRenderer::default();
        let flows = drive(
            &mut r,
            Some(2),
            &[
                WindowEvent::RedrawRequested,
                WindowEvent::RedrawRequested,
                WindowEvent::RedrawRequested,
            ],
        ).unwrap();
        assert_eq!(flows, [Flow::Drew, Flow::Exit, Flow::Idle]);
        assert_eq!(r.renders, 2);
    }

    #[test]
    fn render_failure_propagates() {
        let mut r = CountingRenderer {
            fail: true,
            ..Default::default()
        };
        let err = drive(&mut r, None, &[WindowEvent::RedrawRequested]).unwrap_err();
        assert!(err.to_string().contains("queue_present"));
    }

    #[test]
    fn fatal_error_is_one_line_with_the_stage() {
        let e = anyhow::anyhow!("create_swapchain failed: ERROR_SURFACE_LOST_KHR")
            .context("vulkan bootstrap");
        let line = fatal_line(&e);
        assert_eq!(
            line,
            "error: vulkan bootstrap: create_swapchain failed: ERROR_SURFACE_LOST_KHR"
        );
        assert!(!line.contains('\n'));
    }

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tri-app-{}-{name}", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn cli_path_wins_over_config_and_builtin() {
        let cli = temp_file("cli.spv", &[1, 2, 3, 4]);
        let cfg = temp_file("cfg.spv", &[5, 6, 7, 8]);
        let s = resolve_shader(
            Some(cli.as_path()),
            Some(cfg.as_path()),
            Some(("builtin", BLOB)),
            "unused",
        )
        .unwrap();
        assert_eq!(s.bytes(), [1, 2, 3, 4]);
        fs::remove_file(cli).unwrap();
        fs::remove_file(cfg).unwrap();
    }

    #[test]
    fn builtin_used_when_no_path_configured() {
        let s = resolve_shader(None, None, Some(("builtin", BLOB)), "unused").unwrap();
        assert_eq!(s.label(), "builtin");
        assert_eq!(s.bytes(), [9, 9, 9, 9]);
    }

    #[test]
    fn missing_default_shader_is_fatal() {
        let err = resolve_shader(None, None, None, "definitely/not/here.spv").unwrap_err();
        assert!(format!("{err:#}").contains("definitely/not/here.spv"));
    }

    #[test]
    fn messenger_off_means_no_sink() {
        let cfg = config::DiagnosticsCfg {
            messenger: false,
            ..Default::default()
        };
        assert!(diagnostics_sink(&cfg).unwrap().is_none());
    }

    #[test]
    fn args_parse_overrides() {
        let args = Args::try_parse_from([
            "tri-app",
            "--config",
            "other.toml",
            "--vertex-shader",
            "a.spv",
            "--max-frames",
            "10",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert_eq!(args.vertex_shader, Some(PathBuf::from("a.spv")));
        assert!(args.fragment_shader.is_none());
        assert_eq!(args.max_frames, Some(10));
    }
}
