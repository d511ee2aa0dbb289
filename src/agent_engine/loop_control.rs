/// Step ceiling for one turn. A step is one model invocation plus the tool
/// call it issued.
#[derive(Debug, Clone)]
pub struct LoopController {
    max_steps: u32,
    taken: u32,
}

impl LoopController {
    pub fn new(max_steps: u32) -> Self {
        Self {
            max_steps,
            taken: 0,
        }
    }

    /// Claims the next step, or `None` once the ceiling is reached.
    pub fn next_step(&mut self) -> Option<u32> {
        if self.taken >= self.max_steps {
            return None;
        }
        self.taken += 1;
        Some(self.taken)
    }

    pub fn steps_taken(&self) -> u32 {
        self.taken
    }

    pub fn ceiling_reached(&self) -> bool {
        self.taken >= self.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_exactly_max_steps() {
        let mut ctrl = LoopController::new(3);
        let steps: Vec<u32> = std::iter::from_fn(|| ctrl.next_step()).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert!(ctrl.ceiling_reached());
        assert_eq!(ctrl.next_step(), None);
        assert_eq!(ctrl.steps_taken(), 3);
    }

    #[test]
    fn zero_ceiling_allows_nothing() {
        assert_eq!(LoopController::new(0).next_step(), None);
    }
}
