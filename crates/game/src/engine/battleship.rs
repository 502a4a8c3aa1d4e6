use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingMode {
    Hunt,
    Target,
}

/// Hunt/target state carried across the host's shots within one game instance.
///
/// Cells are row-major indices into a `size`x`size` grid. Callers report every
/// result through [`record`](Self::record) and ask for the next cell with
/// [`next_shot`](Self::next_shot).
#[derive(Debug, Clone)]
pub struct TargetingMemory {
    size: usize,
    mode: TargetingMode,
    stack: Vec<usize>,
}

impl TargetingMemory {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            mode: TargetingMode::Hunt,
            stack: Vec::new(),
        }
    }

    pub fn mode(&self) -> TargetingMode {
        self.mode
    }

    pub fn pending(&self) -> &[usize] {
        &self.stack
    }

    pub fn reset(&mut self) {
        self.mode = TargetingMode::Hunt;
        self.stack.clear();
    }

    /// Picks the next cell to fire at. `tried[i]` marks cells already shot.
    pub fn next_shot<R: Rng + ?Sized>(&mut self, tried: &[bool], rng: &mut R) -> Option<usize> {
        let is_open = |index: usize| !tried.get(index).copied().unwrap_or(true);

        if self.mode == TargetingMode::Target {
            while let Some(index) = self.stack.pop() {
                if is_open(index) {
                    return Some(index);
                }
            }
            log::debug!("[battleship] target stack empty, back to hunting");
            self.mode = TargetingMode::Hunt;
        }

        let cells = self.size * self.size;
        let parity: Vec<usize> = (0..cells)
            .filter(|&i| is_open(i) && (i / self.size + i % self.size) % 2 == 0)
            .collect();
        let candidates = if parity.is_empty() {
            (0..cells).filter(|&i| is_open(i)).collect()
        } else {
            parity
        };

        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.random_range(0..candidates.len())])
    }

    pub fn record(&mut self, index: usize, hit: bool) {
        if !hit {
            return;
        }
        self.mode = TargetingMode::Target;
        let neighbors = self.neighbors(index);
        self.stack.extend(neighbors);
    }

    fn neighbors(&self, index: usize) -> Vec<usize> {
        let (row, col) = (index / self.size, index % self.size);
        let mut out = Vec::with_capacity(4);
        if col > 0 {
            out.push(index - 1);
        }
        if row + 1 < self.size {
            out.push(index + self.size);
        }
        if col + 1 < self.size {
            out.push(index + 1);
        }
        if row > 0 {
            out.push(index - self.size);
        }
        out
    }
}
