use crate::floating_type_mod::FT;

/**
 * Simulation time and the size of the current time step.
 */
#[derive(Debug, Clone, Copy)]
pub struct TimeManager {
    time: FT,
    time_step_size: FT,
}

impl TimeManager {
    pub fn new(time_step_size: FT) -> TimeManager {
        assert!(time_step_size > 0.);
        TimeManager {
            time: 0.,
            time_step_size,
        }
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn time_step_size(&self) -> FT {
        self.time_step_size
    }

    pub fn set_time_step_size(&mut self, time_step_size: FT) {
        assert!(time_step_size > 0.);
        self.time_step_size = time_step_size;
    }

    pub fn advance(&mut self) {
        self.time += self.time_step_size;
    }
}

#[test]
fn advance_accumulates_time_steps() {
    let mut tm = TimeManager::new(0.5);
    tm.advance();
    tm.set_time_step_size(0.25);
    tm.advance();
    assert_eq!(tm.time(), 0.75);
}
