use approx::assert_relative_eq;
use nerfkit_field::io::read_obj;
use nerfkit_rays::{CameraPose, ImageSize, PinholeIntrinsics, RayBatch};
use nerfkit_train::{
    psnr_from_mse, BestMode, CheckpointManager, Frame, LossBreakdown, MeshExportOptions,
    ModelError, ParameterState, RadianceModel, Reducer, RenderOptions, RenderOutput, TrainError,
    Trainer, TrainerConfig, TrainingContext, UseCheckpoint,
};

/// Renders a constant gray and moves it towards `target` on every step.
#[derive(Debug, Clone)]
struct GrayModel {
    color: f32,
    target: f32,
    radius: f32,
    steps: usize,
    epochs_ended: usize,
    fail_render: bool,
    last_options: Option<RenderOptions>,
}

impl GrayModel {
    fn new(target: f32) -> Self {
        Self {
            color: 0.0,
            target,
            radius: 0.5,
            steps: 0,
            epochs_ended: 0,
            fail_render: false,
            last_options: None,
        }
    }
}

impl RadianceModel for GrayModel {
    fn render(
        &mut self,
        rays: &[RayBatch],
        options: &RenderOptions,
    ) -> Result<RenderOutput, ModelError> {
        if self.fail_render {
            return Err(ModelError::Render("out of memory".to_string()));
        }
        self.last_options = Some(*options);
        let n = rays.iter().map(RayBatch::len).sum();
        Ok(RenderOutput {
            rgb: vec![[self.color; 3]; n],
            depth: vec![1.0; n],
            normal: None,
            gradient_error: Some(0.5),
            curvature_error: None,
        })
    }

    fn density(&self, points: &[[f64; 3]]) -> Result<Vec<f32>, ModelError> {
        Ok(points
            .iter()
            .map(|p| self.radius - (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt() as f32)
            .collect())
    }

    fn backward_step(&mut self, loss: &LossBreakdown) -> Result<(), ModelError> {
        assert!(loss.total >= loss.criterion);
        self.color += (self.target - self.color) * 0.5;
        self.steps += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        0.5
    }

    fn end_epoch(&mut self, _epoch: usize) {
        self.epochs_ended += 1;
    }

    fn state(&self) -> ParameterState {
        let mut state = ParameterState::new();
        state.insert("color", vec![self.color]);
        state.insert("radius", vec![self.radius]);
        state
    }

    fn load_state(&mut self, state: &ParameterState) -> Result<(), ModelError> {
        let get = |name: &str| {
            state
                .get(name)
                .and_then(|v| v.first().copied())
                .ok_or_else(|| ModelError::State(format!("missing {name}")))
        };
        self.color = get("color")?;
        self.radius = get("radius")?;
        Ok(())
    }

    fn optimizer_state(&self) -> Option<ParameterState> {
        let mut state = ParameterState::new();
        state.insert("steps", vec![self.steps as f32]);
        Some(state)
    }
}

/// A worker process of a data-parallel run.
struct Worker;

impl Reducer for Worker {
    fn rank(&self) -> usize {
        1
    }

    fn world_size(&self) -> usize {
        2
    }

    fn all_reduce_mean(&self, value: f64) -> f64 {
        value
    }
}

fn frame(angle: f64, channels: usize) -> Frame {
    gray_frame(angle, channels, 0.5)
}

fn gray_frame(angle: f64, channels: usize, value: f32) -> Frame {
    let size = ImageSize {
        width: 8,
        height: 6,
    };
    let (s, c) = angle.sin_cos();
    let pose = CameraPose::from_rotation_translation(
        &[[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
        &[2.0 * s, 0.0, 2.0 * c],
    )
    .unwrap();
    let intrinsics = PinholeIntrinsics::new(8.0, 8.0, 4.0, 3.0).unwrap();
    let pixel = [value, value, value, 1.0];
    let image = (0..size.num_pixels())
        .flat_map(|_| pixel[..channels].to_vec())
        .collect();
    Frame::new(image, size, channels, pose, intrinsics).unwrap()
}

fn loader(channels: usize) -> Vec<Vec<Frame>> {
    vec![
        vec![frame(0.0, channels), frame(0.5, channels)],
        vec![frame(1.0, channels), frame(1.5, channels)],
    ]
}

fn config(workspace: &std::path::Path) -> TrainerConfig {
    TrainerConfig {
        name: "gray".to_string(),
        workspace: workspace.to_path_buf(),
        num_rays: 16,
        use_checkpoint: UseCheckpoint::Scratch,
        ..Default::default()
    }
}

#[test]
fn train_records_stats_and_best_checkpoint() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;

    trainer.train(&loader(3), &loader(3), 3)?;

    let stats = trainer.stats();
    assert_eq!(stats.loss.len(), 3);
    assert_eq!(stats.valid_loss.len(), 3);
    assert_eq!(stats.results, stats.valid_loss);
    assert!(stats.loss[2] < stats.loss[0]);
    assert_eq!(stats.best_result, stats.results.last().copied());
    assert!(stats.checkpoints.is_empty());

    assert_eq!(trainer.context().epoch, 3);
    assert_eq!(trainer.context().global_step, 6);
    assert_eq!(trainer.model().steps, 6);
    assert_eq!(trainer.model().epochs_ended, 3);
    assert_relative_eq!(trainer.model().color, 0.5, epsilon = 1e-2);

    assert!(trainer.checkpoints().best_path().exists());
    assert_eq!(trainer.checkpoints().latest()?, None);
    Ok(())
}

#[test]
fn eval_uses_staged_white_rendering() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;

    trainer.train_one_epoch(&loader(3))?;
    let options = trainer.model().last_options.expect("rendered");
    assert!(options.perturb && !options.staged);
    assert_relative_eq!(options.cos_anneal_ratio, 1.0 / 200.0);

    let summary = trainer.evaluate(&loader(4))?;
    let options = trainer.model().last_options.expect("rendered");
    assert!(!options.perturb && options.staged);
    assert_eq!(options.background, Some([1.0; 3]));
    assert_relative_eq!(options.normal_epsilon_ratio, -0.49);
    assert!(summary.loss >= 0.0);
    assert!(summary.psnr > 0.0);
    Ok(())
}

#[test]
fn psnr_metric_in_max_mode_is_negated() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let config = TrainerConfig {
        use_loss_as_metric: false,
        best_mode: BestMode::Max,
        ..config(dir.path())
    };
    let mut trainer = Trainer::new(config, GrayModel::new(0.45))?;

    let summary = trainer.evaluate(&loader(3))?;
    assert_eq!(trainer.stats().results, vec![-summary.psnr]);
    Ok(())
}

#[test]
fn random_background_with_alpha_frames() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let config = TrainerConfig {
        white_background: false,
        num_rays: -1,
        ..config(dir.path())
    };
    let mut trainer = Trainer::new(config, GrayModel::new(0.5))?;
    let loss = trainer.train_one_epoch(&loader(4))?;
    assert!(loss.is_finite());

    let background = trainer
        .model()
        .last_options
        .and_then(|o| o.background)
        .expect("background");
    assert!(background.iter().all(|c| (0.0..1.0).contains(c)));
    Ok(())
}

#[test]
fn resume_from_best_checkpoint() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;
    trainer.train(&loader(3), &loader(3), 2)?;
    let trained = trainer.into_model();

    let config = TrainerConfig {
        use_checkpoint: UseCheckpoint::Best,
        ..config(dir.path())
    };
    let resumed = Trainer::new(config, GrayModel::new(0.5))?;
    assert_eq!(resumed.model().color, trained.color);
    assert_eq!(resumed.context().epoch, 2);
    assert_eq!(resumed.context().global_step, 4);
    assert_eq!(resumed.stats().results.len(), 2);
    Ok(())
}

#[test]
fn latest_without_checkpoints_starts_fresh() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let config = TrainerConfig {
        use_checkpoint: UseCheckpoint::Latest,
        ..config(dir.path())
    };
    let mut trainer = Trainer::new(config, GrayModel::new(0.5))?;
    assert_eq!(trainer.context(), &TrainingContext::default());
    assert!(!trainer.load_checkpoint(None)?);

    let missing = dir.path().join("missing.ckpt");
    let config = TrainerConfig {
        use_checkpoint: UseCheckpoint::Path(missing),
        ..trainer.config().clone()
    };
    assert!(matches!(
        Trainer::new(config, GrayModel::new(0.5)),
        Err(TrainError::Io(_))
    ));
    Ok(())
}

#[test]
fn full_checkpoint_restores_latest() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.25))?;
    let path = trainer.save_checkpoint(true, false)?.expect("written");
    assert_eq!(path, trainer.checkpoints().epoch_path(1));

    let config = TrainerConfig {
        use_checkpoint: UseCheckpoint::Latest,
        ..config(dir.path())
    };
    let mut model = GrayModel::new(0.25);
    model.color = 0.9;
    let resumed = Trainer::new(config, model)?;
    assert_eq!(resumed.model().color, 0.0);
    assert_eq!(resumed.stats().checkpoints, vec![path]);
    Ok(())
}

#[test]
fn checkpoint_retention_keeps_newest() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let manager = CheckpointManager::new(dir.path(), "gray", 2)?;
    let model = GrayModel::new(0.5);
    let mut ctx = TrainingContext::default();

    for epoch in 1..=5 {
        ctx.epoch = epoch;
        manager.save(&mut ctx, &model, false, false)?;
    }

    let mut files = std::fs::read_dir(dir.path())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    files.sort();
    assert_eq!(files, vec!["gray_ep0004.ckpt", "gray_ep0005.ckpt"]);
    assert_eq!(
        ctx.stats.checkpoints,
        vec![manager.epoch_path(4), manager.epoch_path(5)]
    );

    // saving the same epoch again does not evict its own file
    manager.save(&mut ctx, &model, false, false)?;
    assert!(manager.epoch_path(4).exists());
    assert!(manager.epoch_path(5).exists());
    Ok(())
}

#[test]
fn best_checkpoint_only_on_improvement() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let manager = CheckpointManager::new(dir.path(), "gray", 2)?;
    let mut model = GrayModel::new(0.5);
    let mut ctx = TrainingContext::default();

    assert_eq!(manager.save(&mut ctx, &model, false, true)?, None);

    ctx.stats.results.push(0.5);
    assert_eq!(
        manager.save(&mut ctx, &model, false, true)?,
        Some(manager.best_path())
    );
    assert_eq!(ctx.stats.best_result, Some(0.5));

    model.color = 0.7;
    ctx.stats.results.push(0.6);
    assert_eq!(manager.save(&mut ctx, &model, false, true)?, None);
    let stored = manager.load(Some(&manager.best_path()))?.expect("best");
    assert_eq!(stored.model.get("color"), Some(&[0.0f32][..]));

    ctx.stats.results.push(0.2);
    manager.save(&mut ctx, &model, false, true)?;
    let stored = manager.load(Some(&manager.best_path()))?.expect("best");
    assert_eq!(stored.model.get("color"), Some(&[0.7f32][..]));
    assert_eq!(stored.stats.best_result, Some(0.2));
    Ok(())
}

#[test]
fn save_mesh_writes_sphere() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;

    let options = MeshExportOptions {
        resolution: 24,
        ..Default::default()
    };
    let path = trainer.save_mesh(None, &options)?.expect("written");
    assert_eq!(path, dir.path().join("meshes").join("gray_1.obj"));

    let mesh = read_obj(&path)?;
    assert!(!mesh.is_empty());
    assert!(mesh.is_closed());
    for v in &mesh.vertices {
        let r = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((r - 0.5).abs() < 2.0 / 23.0);
    }

    let ply = dir.path().join("sphere.ply");
    assert_eq!(trainer.save_mesh(Some(&ply), &options)?, Some(ply.clone()));
    assert!(ply.exists());
    Ok(())
}

#[test]
fn worker_rank_writes_nothing() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::with_reducer(config(dir.path()), GrayModel::new(0.5), Worker)?;
    trainer.train(&loader(3), &loader(3), 2)?;

    assert!(trainer.stats().results.is_empty());
    assert!(!trainer.checkpoints().best_path().exists());
    assert_eq!(trainer.save_checkpoint(true, false)?, None);
    assert_eq!(
        trainer.save_mesh(None, &MeshExportOptions::default())?,
        None
    );
    Ok(())
}

#[test]
fn test_renders_every_frame() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;
    trainer.model_mut().color = 0.5;

    let predictions = trainer.test(&loader(3))?;
    assert_eq!(predictions.len(), 4);
    for p in &predictions {
        assert_eq!(p.rgb.len(), 48);
        assert_eq!(p.normal, vec![[1.0; 3]; 48]);
        assert_eq!(p.psnr, f64::INFINITY);
    }
    Ok(())
}

#[test]
fn model_errors_propagate() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut model = GrayModel::new(0.5);
    model.fail_render = true;
    let mut trainer = Trainer::new(config(dir.path()), model)?;

    assert!(matches!(
        trainer.train_one_epoch(&loader(3)),
        Err(TrainError::Model(ModelError::Render(_)))
    ));
    assert!(matches!(
        trainer.train_one_epoch(&[]),
        Err(TrainError::InvalidData(_))
    ));
    Ok(())
}

#[test]
fn eval_psnr_pools_errors_across_batches() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let config = TrainerConfig {
        use_loss_as_metric: false,
        best_mode: BestMode::Max,
        ..config(dir.path())
    };
    let mut trainer = Trainer::new(config, GrayModel::new(0.5))?;
    trainer.model_mut().color = 0.5;

    // the first batch is rendered exactly, the second one is off by 0.25
    let loader = vec![
        vec![gray_frame(0.0, 3, 0.5), gray_frame(0.5, 3, 0.5)],
        vec![gray_frame(1.0, 3, 0.75), gray_frame(1.5, 3, 0.75)],
    ];
    let summary = trainer.evaluate(&loader)?;

    assert!(summary.psnr.is_finite());
    assert_relative_eq!(summary.psnr, psnr_from_mse(0.0625 / 2.0, 1.0), epsilon = 1e-4);
    assert_eq!(trainer.stats().results, vec![-summary.psnr]);
    Ok(())
}

#[test]
fn train_steps_cycles_the_loader() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;

    let loss = trainer.train_steps(&loader(3), 5)?;
    assert!(loss.is_finite() && loss > 0.0);
    assert_eq!(trainer.context().global_step, 5);
    assert_eq!(trainer.context().epoch, 1);
    assert_eq!(trainer.model().steps, 5);
    assert_eq!(trainer.model().epochs_ended, 1);
    assert!(trainer.stats().loss.is_empty());

    let later = trainer.train_steps(&loader(3), 3)?;
    assert!(later < loss);
    assert_eq!(trainer.context().global_step, 8);

    assert!(matches!(
        trainer.train_steps(&loader(3), 0),
        Err(TrainError::InvalidData(_))
    ));
    assert!(matches!(
        trainer.train_steps(&[], 4),
        Err(TrainError::InvalidData(_))
    ));
    Ok(())
}

#[test]
fn render_view_needs_no_ground_truth() -> Result<(), TrainError> {
    let dir = tempfile::tempdir()?;
    let mut trainer = Trainer::new(config(dir.path()), GrayModel::new(0.5))?;
    trainer.model_mut().color = 0.25;

    let size = ImageSize {
        width: 5,
        height: 3,
    };
    let intrinsics = PinholeIntrinsics::new(4.0, 4.0, 2.5, 1.5)?;
    let view = trainer.render_view(&CameraPose::identity(), &intrinsics, size, Some([0.0; 3]))?;

    assert_eq!(view.size, size);
    assert_eq!(view.rgb, vec![[0.25; 3]; 15]);
    assert_eq!(view.depth.len(), 15);

    let options = trainer.model().last_options.expect("rendered");
    assert!(!options.perturb && options.staged);
    assert_eq!(options.background, Some([0.0; 3]));

    trainer.render_view(&CameraPose::identity(), &intrinsics, size, None)?;
    assert_eq!(trainer.model().last_options.and_then(|o| o.background), None);
    Ok(())
}
