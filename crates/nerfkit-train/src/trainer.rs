use std::path::{Path, PathBuf};

use nerfkit_field::field::DEFAULT_CHUNK_SIZE;
use nerfkit_field::{write_mesh, AxisOrder, FieldExtractor, GridBounds};
use nerfkit_rays::pixels::{composite_background, gather_pixels};
use nerfkit_rays::{generate_rays, CameraPose, ImageSize, PinholeIntrinsics, RayBatch};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::checkpoint::{CheckpointManager, UseCheckpoint};
use crate::config::{BestMode, TrainerConfig};
use crate::context::{TrainingContext, TrainingStats};
use crate::data::{batch_layout, Frame};
use crate::error::TrainError;
use crate::metrics::{psnr, psnr_from_mse, LossBreakdown, PsnrMeter};
use crate::model::{RadianceModel, RenderOutput};
use crate::options::{RenderOptions, WHITE};
use crate::reduce::{Reducer, SingleProcess};

/// Dynamic range of the rendered colors.
const DATA_RANGE: f64 = 1.0;

/// A full checkpoint, with optimizer state, is written every this many epochs.
const FULL_CHECKPOINT_INTERVAL: usize = 10;

/// A dense rendering of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// The image size.
    pub size: ImageSize,
    /// Row-major colors.
    pub rgb: Vec<[f32; 3]>,
    /// Row-major depths.
    pub depth: Vec<f32>,
    /// Row-major normals mapped to `[0, 1]`, all ones if the model renders no normals.
    pub normal: Vec<[f32; 3]>,
    /// PSNR against the frame composited over white.
    pub psnr: f64,
}

/// A rendering of a novel view, without ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    /// The image size.
    pub size: ImageSize,
    /// Row-major colors.
    pub rgb: Vec<[f32; 3]>,
    /// Row-major depths.
    pub depth: Vec<f32>,
}

/// Averages of an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    /// The average criterion loss.
    pub loss: f64,
    /// The PSNR of the squared error pooled over the whole pass.
    pub psnr: f64,
}

/// Options of [`Trainer::save_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshExportOptions {
    /// Samples per axis.
    pub resolution: usize,
    /// Half extent of the sampled cube `[-bound, bound]^3`.
    pub bound: f64,
    /// The iso value.
    pub threshold: f32,
    /// Negate the density before extraction, for signed distance models.
    pub use_sdf: bool,
    /// Axis order of the written vertices.
    pub axis_order: AxisOrder,
    /// Samples per axis in one density query.
    pub chunk_size: usize,
}

impl Default for MeshExportOptions {
    fn default() -> Self {
        Self {
            resolution: 256,
            bound: 1.0,
            threshold: 0.0,
            use_sdf: false,
            axis_order: AxisOrder::Zxy,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Drives a [`RadianceModel`] through training, evaluation, checkpointing and mesh export.
///
/// A loader is a slice of batches; the frames of one batch share their image size.
pub struct Trainer<M, R = SingleProcess> {
    config: TrainerConfig,
    model: M,
    reducer: R,
    ctx: TrainingContext,
    checkpoints: CheckpointManager,
    rng: StdRng,
}

impl<M: RadianceModel> Trainer<M, SingleProcess> {
    /// Create a single process trainer and restore the configured checkpoint.
    pub fn new(config: TrainerConfig, model: M) -> Result<Self, TrainError> {
        Self::with_reducer(config, model, SingleProcess)
    }
}

impl<M: RadianceModel, R: Reducer> Trainer<M, R> {
    /// Create a trainer and restore the configured checkpoint.
    ///
    /// Creates the workspace and its checkpoint directory.
    pub fn with_reducer(config: TrainerConfig, model: M, reducer: R) -> Result<Self, TrainError> {
        config.validate()?;
        std::fs::create_dir_all(&config.workspace)?;
        let checkpoints = CheckpointManager::new(
            config.checkpoint_dir(),
            config.name.clone(),
            config.max_keep_ckpt,
        )?;

        if config.best_mode != config.best_mode() {
            log::debug!("selecting by loss, best mode forced to min");
        }
        if reducer.is_main() {
            log::info!(
                "trainer: {} | {} | rank {}/{}",
                config.name,
                config.workspace.display(),
                reducer.rank(),
                reducer.world_size()
            );
        }

        let rng = StdRng::seed_from_u64(config.seed);
        let mut trainer = Self {
            config,
            model,
            reducer,
            ctx: TrainingContext::default(),
            checkpoints,
            rng,
        };
        trainer.restore()?;

        Ok(trainer)
    }

    fn restore(&mut self) -> Result<(), TrainError> {
        match self.config.use_checkpoint.clone() {
            UseCheckpoint::Scratch => {
                log::info!("training from scratch ...");
            }
            UseCheckpoint::Latest => {
                log::info!("loading latest checkpoint ...");
                self.load_checkpoint(None)?;
            }
            UseCheckpoint::Best => {
                let best = self.checkpoints.best_path();
                if best.exists() {
                    log::info!("loading best checkpoint ...");
                    self.load_checkpoint(Some(&best))?;
                } else {
                    log::info!("{} not found, loading latest ...", best.display());
                    self.load_checkpoint(None)?;
                }
            }
            UseCheckpoint::Path(path) => {
                log::info!("loading {} ...", path.display());
                self.load_checkpoint(Some(&path))?;
            }
        }
        Ok(())
    }

    /// The configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The model, mutably.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Consume the trainer and return the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// The training counters.
    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }

    /// The running statistics.
    pub fn stats(&self) -> &TrainingStats {
        &self.ctx.stats
    }

    /// The checkpoint manager.
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Train from the current epoch up to and including `max_epochs`.
    ///
    /// Evaluates and saves the best checkpoint every `eval_interval` epochs, and writes a
    /// full checkpoint every 10 epochs.
    pub fn train(
        &mut self,
        train_loader: &[Vec<Frame>],
        valid_loader: &[Vec<Frame>],
        max_epochs: usize,
    ) -> Result<(), TrainError> {
        for epoch in self.ctx.epoch..=max_epochs {
            self.ctx.epoch = epoch;

            self.train_one_epoch(train_loader)?;

            if epoch % self.config.eval_interval == 0 {
                self.evaluate_one_epoch(valid_loader)?;
                self.save_checkpoint(false, true)?;
            }

            if epoch % FULL_CHECKPOINT_INTERVAL == 0 {
                self.save_checkpoint(true, false)?;
            }
        }
        Ok(())
    }

    /// Run one training epoch and return its average loss.
    pub fn train_one_epoch(&mut self, loader: &[Vec<Frame>]) -> Result<f64, TrainError> {
        if loader.is_empty() {
            return Err(TrainError::InvalidData("empty training loader".to_string()));
        }
        if self.reducer.is_main() {
            log::info!(
                "==> start training epoch {}, lr={:.6} ...",
                self.ctx.epoch,
                self.model.learning_rate()
            );
        }

        let mut total_loss = 0.0;
        self.ctx.local_step = 0;

        for batch in loader {
            self.ctx.local_step += 1;
            self.ctx.global_step += 1;

            let (loss, psnr) = self.train_step(batch)?;
            total_loss += loss.total;

            if self.reducer.is_main() {
                log::debug!(
                    "step {}: psnr={psnr:.4}, loss={:.4} ({:.4})",
                    self.ctx.global_step,
                    loss.total,
                    total_loss / self.ctx.local_step as f64
                );
            }
        }

        let average_loss = total_loss / self.ctx.local_step as f64;
        self.ctx.stats.loss.push(average_loss);
        self.model.end_epoch(self.ctx.epoch);

        if self.reducer.is_main() {
            log::info!(
                "==> finished epoch {}, loss={average_loss:.4}",
                self.ctx.epoch
            );
        }
        Ok(average_loss)
    }

    /// Train for a fixed number of steps, cycling through `loader` as often as needed.
    ///
    /// Advances `global_step` but records no epoch statistics. Calls the model's
    /// [`RadianceModel::end_epoch`] hook once at the end, so schedulers advance per call.
    ///
    /// # Returns
    ///
    /// The average total loss over the steps.
    pub fn train_steps(&mut self, loader: &[Vec<Frame>], steps: usize) -> Result<f64, TrainError> {
        if loader.is_empty() {
            return Err(TrainError::InvalidData("empty training loader".to_string()));
        }
        if steps == 0 {
            return Err(TrainError::InvalidData("steps must be > 0".to_string()));
        }

        let mut total_loss = 0.0;
        for batch in loader.iter().cycle().take(steps) {
            self.ctx.global_step += 1;
            let (loss, _) = self.train_step(batch)?;
            total_loss += loss.total;
        }

        let average_loss = total_loss / steps as f64;
        self.model.end_epoch(self.ctx.epoch);
        log::debug!(
            "trained {steps} steps up to step {}, loss={average_loss:.4}, lr={:.6}",
            self.ctx.global_step,
            self.model.learning_rate()
        );

        Ok(average_loss)
    }

    fn train_step(&mut self, batch: &[Frame]) -> Result<(LossBreakdown, f64), TrainError> {
        let (size, channels) = batch_layout(batch)?;
        let (poses, intrinsics): (Vec<_>, Vec<_>) =
            batch.iter().map(|f| (f.pose, f.intrinsics)).unzip();

        let rays = generate_rays(
            &poses,
            &intrinsics,
            size,
            self.config.num_rays,
            &mut self.rng,
        )?;

        let background = if self.config.white_background {
            WHITE
        } else {
            [self.rng.random(), self.rng.random(), self.rng.random()]
        };
        let target = ground_truth(batch, &rays, size, channels, background)?;

        let options = RenderOptions::training(self.ctx.epoch, background);
        let output = self.model.render(&rays, &options)?;
        check_output(&output, target.len())?;

        let loss = LossBreakdown::new(
            self.config.criterion.evaluate(&output.rgb, &target)?,
            output.gradient_error.unwrap_or(0.0),
            output.curvature_error.unwrap_or(0.0),
        );
        let psnr = psnr(&output.rgb, &target, DATA_RANGE)?;

        self.model.backward_step(&loss)?;

        Ok((loss, psnr))
    }

    /// Run one evaluation pass and record its result.
    ///
    /// The recorded model selection score is the average loss, or the average PSNR when
    /// `use_loss_as_metric` is off, negated in `max` mode so that lower is always better.
    pub fn evaluate_one_epoch(&mut self, loader: &[Vec<Frame>]) -> Result<EvalSummary, TrainError> {
        if loader.is_empty() {
            return Err(TrainError::InvalidData(
                "empty validation loader".to_string(),
            ));
        }
        if self.reducer.is_main() {
            log::info!("++> evaluate at epoch {} ...", self.ctx.epoch);
        }

        let mut total_loss = 0.0;
        let mut meter = PsnrMeter::new();
        self.ctx.local_step = 0;

        for batch in loader {
            self.ctx.local_step += 1;

            let (output, target, _) = self.render_dense(batch)?;
            let loss = self.config.criterion.evaluate(&output.rgb, &target)?;
            meter.update(&output.rgb, &target)?;

            total_loss += self.reducer.all_reduce_mean(loss);
        }

        let pooled_mse = self.reducer.all_reduce_mean(meter.mse().unwrap_or(0.0));
        let summary = EvalSummary {
            loss: total_loss / self.ctx.local_step as f64,
            psnr: psnr_from_mse(pooled_mse, DATA_RANGE),
        };
        self.ctx.stats.valid_loss.push(summary.loss);

        if self.reducer.is_main() {
            let result = if self.config.use_loss_as_metric {
                summary.loss
            } else {
                match self.config.best_mode() {
                    BestMode::Min => summary.psnr,
                    BestMode::Max => -summary.psnr,
                }
            };
            self.ctx.stats.results.push(result);

            log::info!(
                "psnr={:.4}, loss={:.4}",
                summary.psnr,
                summary.loss
            );
            log::info!("++> evaluate epoch {} finished", self.ctx.epoch);
        }

        Ok(summary)
    }

    /// Evaluate on `loader` outside the training loop.
    pub fn evaluate(&mut self, loader: &[Vec<Frame>]) -> Result<EvalSummary, TrainError> {
        self.evaluate_one_epoch(loader)
    }

    /// Render every frame of `loader` densely.
    pub fn test(&mut self, loader: &[Vec<Frame>]) -> Result<Vec<Prediction>, TrainError> {
        let mut predictions = Vec::new();
        for batch in loader {
            let (output, target, size) = self.render_dense(batch)?;
            predictions.extend(split_predictions(output, &target, size, batch.len())?);
        }
        if self.reducer.is_main() {
            log::info!("==> finished test, {} frames", predictions.len());
        }
        Ok(predictions)
    }

    /// Render a novel view at an arbitrary size, without ground truth.
    ///
    /// Uses the evaluation render options of the current epoch. `background` of `None`
    /// lets the model pick its own background.
    pub fn render_view(
        &mut self,
        pose: &CameraPose,
        intrinsics: &PinholeIntrinsics,
        size: ImageSize,
        background: Option<[f32; 3]>,
    ) -> Result<RenderedView, TrainError> {
        let rays = generate_rays(&[*pose], &[*intrinsics], size, -1, &mut self.rng)?;

        let options = RenderOptions::evaluation(self.ctx.epoch, background);
        let output = self.model.render(&rays, &options)?;
        check_output(&output, size.num_pixels())?;

        Ok(RenderedView {
            size,
            rgb: output.rgb,
            depth: output.depth,
        })
    }

    fn render_dense(
        &mut self,
        batch: &[Frame],
    ) -> Result<(RenderOutput, Vec<[f32; 3]>, ImageSize), TrainError> {
        let (size, channels) = batch_layout(batch)?;
        let (poses, intrinsics): (Vec<_>, Vec<_>) =
            batch.iter().map(|f| (f.pose, f.intrinsics)).unzip();

        let rays = generate_rays(&poses, &intrinsics, size, -1, &mut self.rng)?;
        let target = ground_truth(batch, &rays, size, channels, WHITE)?;

        let options = RenderOptions::evaluation(self.ctx.epoch, Some(WHITE));
        let output = self.model.render(&rays, &options)?;
        check_output(&output, target.len())?;

        Ok((output, target, size))
    }

    /// Save a checkpoint of the model and the training state from the main process.
    ///
    /// See [`CheckpointManager::save`].
    pub fn save_checkpoint(&mut self, full: bool, best: bool) -> Result<Option<PathBuf>, TrainError> {
        if !self.reducer.is_main() {
            return Ok(None);
        }
        self.checkpoints.save(&mut self.ctx, &self.model, full, best)
    }

    /// Restore a checkpoint, the latest epoch checkpoint when `path` is `None`.
    ///
    /// Returns `false` when there is no checkpoint to restore. The optimizer state is
    /// optional: failing to restore it only logs a warning.
    pub fn load_checkpoint(&mut self, path: Option<&Path>) -> Result<bool, TrainError> {
        let Some(checkpoint) = self.checkpoints.load(path)? else {
            return Ok(false);
        };

        self.model.load_state(&checkpoint.model)?;
        log::info!("loaded model");

        if let Some(optimizer) = &checkpoint.optimizer {
            match self.model.load_optimizer_state(optimizer) {
                Ok(()) => log::info!("loaded optimizer"),
                Err(e) => log::warn!("failed to load optimizer, use default: {e}"),
            }
        }

        self.ctx.epoch = checkpoint.epoch;
        self.ctx.global_step = checkpoint.global_step;
        self.ctx.stats = checkpoint.stats;

        Ok(true)
    }

    /// Extract the model surface and write it as OBJ or PLY, by extension.
    ///
    /// Defaults to `<workspace>/meshes/<name>_<epoch>.obj`. Only the main process writes;
    /// other ranks return `None`.
    pub fn save_mesh(
        &self,
        path: Option<&Path>,
        options: &MeshExportOptions,
    ) -> Result<Option<PathBuf>, TrainError>
    where
        M: Sync,
    {
        if !self.reducer.is_main() {
            return Ok(None);
        }

        let path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            self.config
                .workspace
                .join("meshes")
                .join(format!("{}_{}.obj", self.config.name, self.ctx.epoch))
        });
        log::info!("==> saving mesh to {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let model = &self.model;
        let query = |points: &[[f64; 3]]| model.density(points);

        let bounds = GridBounds::cube(options.bound)?;
        let mut mesh = FieldExtractor::new(options.chunk_size)?.extract_geometry(
            &bounds,
            options.resolution,
            options.threshold,
            &query,
            options.use_sdf,
        )?;
        mesh.swizzle_axes(options.axis_order);

        write_mesh(&path, &mesh)?;
        log::info!(
            "==> finished saving mesh, {} vertices and {} triangles",
            mesh.len(),
            mesh.num_triangles()
        );

        Ok(Some(path))
    }
}

/// Gather the target colors of every ray, composited over `background`.
fn ground_truth(
    batch: &[Frame],
    rays: &[RayBatch],
    size: ImageSize,
    channels: usize,
    background: [f32; 3],
) -> Result<Vec<[f32; 3]>, TrainError> {
    let mut target = Vec::with_capacity(rays.iter().map(RayBatch::len).sum());
    for (frame, batch_rays) in batch.iter().zip(rays) {
        let pixels = gather_pixels(&frame.image, size, channels, &batch_rays.select_indices)?;
        target.extend(composite_background(&pixels, channels, background)?);
    }
    Ok(target)
}

fn check_output(output: &RenderOutput, num_rays: usize) -> Result<(), TrainError> {
    let normal_len = output.normal.as_ref().map_or(num_rays, Vec::len);
    if output.rgb.len() != num_rays || output.depth.len() != num_rays || normal_len != num_rays
    {
        return Err(TrainError::InvalidData(format!(
            "model rendered {} colors, {} depths and {normal_len} normals for {num_rays} rays",
            output.rgb.len(),
            output.depth.len()
        )));
    }
    Ok(())
}

/// Split a dense rendering of `num_frames` frames into per-frame predictions.
fn split_predictions(
    output: RenderOutput,
    target: &[[f32; 3]],
    size: ImageSize,
    num_frames: usize,
) -> Result<Vec<Prediction>, TrainError> {
    let n = size.num_pixels();
    check_output(&output, n * num_frames)?;

    let normal = match output.normal {
        Some(normal) => normal
            .into_iter()
            .map(|v| v.map(|c| (c + 1.0) / 2.0))
            .collect(),
        None => vec![[1.0; 3]; n * num_frames],
    };

    (0..num_frames)
        .map(|i| {
            let range = i * n..(i + 1) * n;
            Ok(Prediction {
                size,
                rgb: output.rgb[range.clone()].to_vec(),
                depth: output.depth[range.clone()].to_vec(),
                normal: normal[range.clone()].to_vec(),
                psnr: psnr(&output.rgb[range.clone()], &target[range], DATA_RANGE)?,
            })
        })
        .collect()
}
