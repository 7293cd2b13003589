//! Per-frame driver: pulls the latest camera frame, keeps the lens mesh current and draws
//! it through the shader pipeline. Owns every GPU object through its `ShaderPipeline`.

use std::sync::Arc;

use gravlens_renderer::{
    GpuDevice, LensConfig, LensMeshModel, Mesh, PipelineError, ShaderPipeline, ShaderProgram, ShaderSources,
};
use lens_api::{ConfigError, FramePlanes, ScreenSpec};
use thiserror::Error;

use crate::frame_slot::FrameSlot;
use crate::lens_input::LensInput;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("render loop is not initialized")]
    NotInitialized,
    #[error("rendering context lost: {0}")]
    ContextLost(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Ready,
    Rendering,
    Suspended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not initialized or suspended; nothing was attempted.
    Idle,
    /// No new camera frame since the last tick.
    NoFrame,
    /// The frame failed validation and was discarded.
    FrameDropped,
    Drawn,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub draws: u64,
    pub no_frame: u64,
    pub dropped: u64,
    pub mesh_rebuilds: u64,
    pub context_losses: u64,
}

pub struct RenderLoop<D: GpuDevice> {
    model: LensMeshModel,
    mesh_factor: u32,
    pipeline: ShaderPipeline<D>,
    program: Option<ShaderProgram<D>>,
    sources: Option<ShaderSources>,
    slot: Option<Arc<FrameSlot>>,
    lens: Arc<LensInput>,
    screen: (u32, u32),
    spec: Option<ScreenSpec>,
    mesh: Option<Arc<Mesh>>,
    mesh_revision: u64,
    state: LoopState,
    stats: LoopStats,
}

impl<D: GpuDevice> RenderLoop<D> {
    pub fn new(
        device: D,
        config: &LensConfig,
        lens: Arc<LensInput>,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<Self, RenderError> {
        ScreenSpec::new(screen_width, screen_height, config.mesh_factor, screen_width, screen_height)?;
        Ok(Self {
            model: LensMeshModel::from_config(config),
            mesh_factor: config.mesh_factor,
            pipeline: ShaderPipeline::new(device),
            program: None,
            sources: None,
            slot: None,
            lens,
            screen: (screen_width, screen_height),
            spec: None,
            mesh: None,
            mesh_revision: 0,
            state: LoopState::Uninitialized,
            stats: LoopStats::default(),
        })
    }

    pub fn state(&self) -> LoopState { self.state }
    pub fn stats(&self) -> LoopStats { self.stats }
    pub fn screen_size(&self) -> (u32, u32) { self.screen }
    pub fn lens(&self) -> &Arc<LensInput> { &self.lens }
    pub fn pipeline(&self) -> &ShaderPipeline<D> { &self.pipeline }
    pub fn pipeline_mut(&mut self) -> &mut ShaderPipeline<D> { &mut self.pipeline }
    /// Mesh used by the last draw, if still valid.
    pub fn mesh(&self) -> Option<&Arc<Mesh>> { self.mesh.as_ref() }

    pub fn attach_source(&mut self, slot: Arc<FrameSlot>) {
        self.slot = Some(slot);
        self.update_ready();
    }

    /// Compile and activate the lens program. On failure the loop stays uninitialized.
    pub fn initialize(&mut self, sources: ShaderSources) -> Result<(), RenderError> {
        if let Some(old) = self.program.take() {
            self.pipeline.release_program(old);
        }
        let mut program = self.pipeline.compile(&sources.vertex, &sources.fragment)?;
        if let Err(err) = self.pipeline.activate(&mut program) {
            log::error!("lens program activation failed: {err}");
            self.pipeline.release_program(program);
            return Err(err.into());
        }
        self.program = Some(program);
        self.sources = Some(sources);
        self.update_ready();
        Ok(())
    }

    pub fn suspend(&mut self) {
        if matches!(self.state, LoopState::Ready | LoopState::Rendering) {
            self.transition(LoopState::Suspended);
        }
    }

    pub fn resume(&mut self) {
        if self.state == LoopState::Suspended {
            self.transition(LoopState::Ready);
        }
    }

    /// Release the program and every GPU object. `initialize` must be called again.
    pub fn shutdown(&mut self) {
        if let Some(program) = self.program.take() {
            self.pipeline.release_program(program);
        }
        self.pipeline.release_all();
        self.sources = None;
        self.spec = None;
        self.mesh = None;
        self.transition(LoopState::Uninitialized);
    }

    /// Screen rotated or resized. The mesh is rebuilt on the next draw.
    pub fn resize_screen(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        ScreenSpec::new(width, height, self.mesh_factor, width, height)?;
        if self.screen != (width, height) {
            log::debug!("screen resized to {width}x{height}");
            self.screen = (width, height);
            self.spec = None;
            self.mesh = None;
        }
        Ok(())
    }

    /// Swap in a new device (after the old one was lost) and recompile from the stored sources.
    pub fn reinitialize_with(&mut self, device: D) -> Result<(), RenderError> {
        if let Some(program) = self.program.take() {
            self.pipeline.release_program(program);
        }
        drop(self.pipeline.replace_device(device));
        self.mesh = None;
        if self.state != LoopState::Suspended {
            self.state = LoopState::Uninitialized;
        }
        let sources = self.sources.clone().ok_or(RenderError::NotInitialized)?;
        self.initialize(sources)
    }

    /// Draw the newest frame, if there is one.
    pub fn tick(&mut self) -> Result<TickOutcome, RenderError> {
        self.stats.ticks += 1;
        if matches!(self.state, LoopState::Uninitialized | LoopState::Suspended) {
            return Ok(TickOutcome::Idle);
        }
        let Some(slot) = self.slot.clone() else {
            return Ok(TickOutcome::Idle);
        };
        let Some(frame) = slot.take_latest() else {
            self.stats.no_frame += 1;
            return Ok(TickOutcome::NoFrame);
        };
        let result = self.draw_frame(&frame);
        slot.recycle(frame);

        match result {
            Ok(()) => {
                self.stats.draws += 1;
                if self.state == LoopState::Ready {
                    self.transition(LoopState::Rendering);
                }
                Ok(TickOutcome::Drawn)
            }
            Err(RenderError::Pipeline(PipelineError::FrameFormat(err))) => {
                log::warn!("dropping frame: {err}");
                self.stats.dropped += 1;
                Ok(TickOutcome::FrameDropped)
            }
            Err(RenderError::Pipeline(PipelineError::ContextLost(reason))) => {
                log::error!("rendering context lost: {reason}");
                self.stats.context_losses += 1;
                if let Err(err) = self.recover() {
                    log::error!("re-initialization after context loss failed: {err}");
                }
                Err(RenderError::ContextLost(reason))
            }
            Err(err) => {
                log::error!("draw failed: {err}");
                Err(err)
            }
        }
    }

    fn draw_frame(&mut self, frame: &FramePlanes) -> Result<(), RenderError> {
        frame.validate().map_err(PipelineError::from)?;
        let mesh = self.current_mesh(frame.size())?;
        let program = self.program.as_ref().ok_or(RenderError::NotInitialized)?;
        self.pipeline.draw(program, &mesh, frame)?;
        Ok(())
    }

    fn current_mesh(&mut self, texture_size: (u32, u32)) -> Result<Arc<Mesh>, RenderError> {
        let rebuild_spec = match &self.spec {
            None => Some("screen"),
            Some(spec) if spec.texture_size() != texture_size => Some("texture size"),
            Some(_) => None,
        };
        let (lens, revision) = self.lens.snapshot();
        let reason = match rebuild_spec {
            Some(reason) => {
                let (w, h) = self.screen;
                self.spec = Some(ScreenSpec::new(w, h, self.mesh_factor, texture_size.0, texture_size.1)?);
                Some(reason)
            }
            None if self.mesh_revision != revision => Some("lens"),
            None if self.mesh.is_none() => Some("reset"),
            None => None,
        };
        if let (None, Some(mesh)) = (reason, &self.mesh) {
            return Ok(Arc::clone(mesh));
        }

        let spec = self.spec.ok_or(RenderError::NotInitialized)?;
        let mesh = Arc::new(self.model.compute_mesh(&spec, &lens));
        log::debug!(
            "mesh rebuilt ({}): {}x{} vertices",
            reason.unwrap_or_default(),
            mesh.cols(),
            mesh.rows()
        );
        self.stats.mesh_rebuilds += 1;
        self.mesh_revision = revision;
        self.mesh = Some(Arc::clone(&mesh));
        Ok(mesh)
    }

    fn recover(&mut self) -> Result<(), RenderError> {
        if let Some(program) = self.program.take() {
            self.pipeline.release_program(program);
        }
        self.pipeline.release_all();
        self.mesh = None;
        let suspended = self.state == LoopState::Suspended;
        self.state = LoopState::Uninitialized;
        let sources = self.sources.clone().ok_or(RenderError::NotInitialized)?;
        self.initialize(sources)?;
        if suspended {
            self.state = LoopState::Suspended;
        }
        Ok(())
    }

    fn update_ready(&mut self) {
        if self.state == LoopState::Uninitialized && self.program.is_some() && self.slot.is_some() {
            self.transition(LoopState::Ready);
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            log::info!("render loop: {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }
}
