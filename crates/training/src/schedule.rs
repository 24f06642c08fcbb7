//! Step learning-rate schedule.

use models::ArchKind;

/// `base_lr * gamma^k` where `k` is the number of milestones `<= epoch`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiStepLr {
    base_lr: f64,
    milestones: Vec<usize>,
    gamma: f64,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, mut milestones: Vec<usize>, gamma: f64) -> Self {
        milestones.sort_unstable();
        Self {
            base_lr,
            milestones,
            gamma,
        }
    }

    /// Milestones at 40% and 80% of the run, truncated toward zero.
    pub fn for_epochs(base_lr: f64, epochs: usize, gamma: f64) -> Self {
        let at = |frac: f64| (epochs as f64 * frac) as usize;
        Self::new(base_lr, vec![at(0.4), at(0.8)], gamma)
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    pub fn lr_at(&self, epoch: usize) -> f64 {
        let passed = self.milestones.iter().filter(|&&m| m <= epoch).count();
        self.base_lr * self.gamma.powi(passed as i32)
    }

    /// Learning rate actually used for `epoch`, including the deep-net warmup
    /// (a tenth of the scheduled rate for epoch 0).
    pub fn lr_for(&self, epoch: usize, arch: ArchKind) -> f64 {
        let lr = self.lr_at(epoch);
        if epoch == 0 && arch.needs_warmup() {
            lr * 0.1
        } else {
            lr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn milestones_follow_run_length() {
        let s = MultiStepLr::for_epochs(0.1, 100, 0.1);
        assert_eq!(s.milestones(), &[40, 80]);
        assert!(close(s.lr_at(0), 0.1));
        assert!(close(s.lr_at(39), 0.1));
        assert!(close(s.lr_at(40), 0.01));
        assert!(close(s.lr_at(80), 0.001));
        assert_eq!(MultiStepLr::for_epochs(0.1, 7, 0.1).milestones(), &[2, 5]);
    }

    #[test]
    fn resumed_runs_pick_up_the_decayed_rate() {
        let s = MultiStepLr::for_epochs(0.1, 10, 0.5);
        assert!(close(s.lr_for(9, ArchKind::Resnet32), 0.025));
    }

    #[test]
    fn deep_nets_warm_up_on_the_first_epoch_only() {
        let s = MultiStepLr::for_epochs(0.1, 100, 0.1);
        assert!(close(s.lr_for(0, ArchKind::Resnet110), 0.01));
        assert!(close(s.lr_for(1, ArchKind::Resnet110), 0.1));
        assert!(close(s.lr_for(0, ArchKind::Resnet1202), 0.01));
        assert!(close(s.lr_for(0, ArchKind::Resnet56), 0.1));
    }
}
