/// The white background, used for evaluation and for training with `white_background`.
pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Per-call options passed to [`crate::RadianceModel::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// The background color, `None` lets the model pick.
    pub background: Option<[f32; 3]>,
    /// Jitter the samples along each ray.
    pub perturb: bool,
    /// Render in memory-bounded stages, used for dense full-image rendering.
    pub staged: bool,
    /// Annealing ratio of the SDF-to-density cosine term.
    pub cos_anneal_ratio: f64,
    /// Annealing ratio of the finite-difference epsilon used for normals.
    pub normal_epsilon_ratio: f64,
}

impl RenderOptions {
    /// Options for a training step at `epoch`.
    ///
    /// `cos_anneal_ratio = min(epoch / 200, 1)` and `normal_epsilon_ratio = min(epoch / 200, 0.95)`.
    pub fn training(epoch: usize, background: [f32; 3]) -> Self {
        let t = epoch as f64 / 200.0;
        Self {
            background: Some(background),
            perturb: true,
            staged: false,
            cos_anneal_ratio: t.min(1.0),
            normal_epsilon_ratio: t.min(0.95),
        }
    }

    /// Options for evaluation and test rendering at `epoch`.
    ///
    /// `cos_anneal_ratio = min(epoch / 100, 1)` and
    /// `normal_epsilon_ratio = min((epoch - 50) / 100, 0.99)`, negative for early epochs.
    pub fn evaluation(epoch: usize, background: Option<[f32; 3]>) -> Self {
        let epoch = epoch as f64;
        Self {
            background,
            perturb: false,
            staged: true,
            cos_anneal_ratio: (epoch / 100.0).min(1.0),
            normal_epsilon_ratio: ((epoch - 50.0) / 100.0).min(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_training_schedule() {
        let o = RenderOptions::training(50, WHITE);
        assert!(o.perturb && !o.staged);
        assert_eq!(o.background, Some(WHITE));
        assert_relative_eq!(o.cos_anneal_ratio, 0.25);
        assert_relative_eq!(o.normal_epsilon_ratio, 0.25);

        let o = RenderOptions::training(195, WHITE);
        assert_relative_eq!(o.cos_anneal_ratio, 0.975);
        assert_relative_eq!(o.normal_epsilon_ratio, 0.95);

        let o = RenderOptions::training(400, WHITE);
        assert_relative_eq!(o.cos_anneal_ratio, 1.0);
        assert_relative_eq!(o.normal_epsilon_ratio, 0.95);
    }

    #[test]
    fn test_evaluation_schedule() {
        let o = RenderOptions::evaluation(10, None);
        assert!(!o.perturb && o.staged);
        assert_relative_eq!(o.cos_anneal_ratio, 0.1);
        assert_relative_eq!(o.normal_epsilon_ratio, -0.4);

        let o = RenderOptions::evaluation(300, Some(WHITE));
        assert_relative_eq!(o.cos_anneal_ratio, 1.0);
        assert_relative_eq!(o.normal_epsilon_ratio, 0.99);
    }
}
