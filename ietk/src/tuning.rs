//! Cross-validation and derivative-free hyperparameter search.

/// Computes the F-beta score.
///
/// A zero precision or recall yields zero.
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    let b2 = beta * beta;
    let denom = b2 * precision + recall;
    if precision <= 0.0 || recall <= 0.0 || denom <= 0.0 {
        0.0
    } else {
        (1.0 + b2) * precision * recall / denom
    }
}

/// Precision and recall counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Counts {
    pub correct: usize,
    pub predicted: usize,
    pub gold: usize,
}

impl Counts {
    pub fn precision(&self) -> f64 {
        if self.predicted == 0 {
            0.0
        } else {
            self.correct as f64 / self.predicted as f64
        }
    }

    pub fn recall(&self) -> f64 {
        if self.gold == 0 {
            0.0
        } else {
            self.correct as f64 / self.gold as f64
        }
    }

    pub fn f_beta(&self, beta: f64) -> f64 {
        f_beta(self.precision(), self.recall(), beta)
    }

    pub fn f1(&self) -> f64 {
        self.f_beta(1.0)
    }
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Self) {
        self.correct += other.correct;
        self.predicted += other.predicted;
        self.gold += other.gold;
    }
}

/// Assigns each sample to one of `folds` folds so that every label is spread evenly.
pub fn stratified_folds(labels: &[u32], folds: usize) -> Vec<usize> {
    let folds = folds.max(1);
    let mut next: hashbrown::HashMap<u32, usize> = hashbrown::HashMap::new();
    labels
        .iter()
        .map(|l| {
            let n = next.entry(*l).or_insert(0);
            let fold = *n % folds;
            *n += 1;
            fold
        })
        .collect()
}

/// Maximizes `f` over `[lo, hi]` in log space by golden-section search.
///
/// Returns the best argument and its value.
pub fn golden_section_log<F>(mut f: F, lo: f64, hi: f64, max_evals: usize) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
{
    const INV_PHI: f64 = 0.618_033_988_749_894_9;
    let (mut a, mut b) = (lo.ln(), hi.ln());
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c.exp());
    let mut fd = f(d.exp());
    let mut best = if fd > fc { (d, fd) } else { (c, fc) };
    for _ in 2..max_evals {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c.exp());
            if fc > best.1 {
                best = (c, fc);
            }
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d.exp());
            if fd > best.1 {
                best = (d, fd);
            }
        }
    }
    (best.0.exp(), best.1)
}

/// Maximizes `f` inside a 2-D box by a compass search with a shrinking step.
///
/// Starts at `start` with steps of `radius` times the box width and stops after `max_evals`
/// evaluations or when the step becomes negligible. Returns the best point and its value.
pub fn find_max_box<F>(
    mut f: F,
    start: [f64; 2],
    lo: [f64; 2],
    hi: [f64; 2],
    radius: f64,
    max_evals: usize,
) -> ([f64; 2], f64)
where
    F: FnMut([f64; 2]) -> f64,
{
    let clamp = |p: [f64; 2]| [p[0].clamp(lo[0], hi[0]), p[1].clamp(lo[1], hi[1])];
    let mut best = clamp(start);
    let mut best_value = f(best);
    let mut evals = 1;
    let mut step = [(hi[0] - lo[0]) * radius, (hi[1] - lo[1]) * radius];
    let min_step = [(hi[0] - lo[0]) * 1e-3, (hi[1] - lo[1]) * 1e-3];
    let dirs = [[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]];
    while evals < max_evals && (step[0] > min_step[0] || step[1] > min_step[1]) {
        let mut improved = false;
        for dir in dirs {
            if evals >= max_evals {
                break;
            }
            let p = clamp([best[0] + dir[0] * step[0], best[1] + dir[1] * step[1]]);
            if p == best {
                continue;
            }
            let v = f(p);
            evals += 1;
            if v > best_value {
                best = p;
                best_value = v;
                improved = true;
                break;
            }
        }
        if !improved {
            step = [step[0] * 0.5, step[1] * 0.5];
        }
    }
    (best, best_value)
}
